//! Network layer types filled in by the decoders
//!
//! Only what the ingestion core itself needs:
//! - Layer 3: IPv4, IPv6 (Layer3)
//! - Layer 4: UDP (UdpInfo)
//!
//! Payloads are never copied into these structs; they carry offsets into
//! the owning packet's buffer instead.

use std::net::{Ipv4Addr, Ipv6Addr};
use serde::{Deserialize, Serialize};

// ============================================================================
// Layer 3 - Network
// ============================================================================

/// Layer 3 protocol variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer3 {
    Ipv4(Ipv4Info),
    Ipv6(Ipv6Info),
}

impl Layer3 {
    /// Get next protocol number
    pub fn protocol(&self) -> u8 {
        match self {
            Layer3::Ipv4(info) => info.protocol,
            Layer3::Ipv6(info) => info.next_header,
        }
    }

    /// Offset of the layer 4 header inside the packet buffer
    pub fn payload_offset(&self) -> usize {
        match self {
            Layer3::Ipv4(info) => usize::from(info.header_length) * 4,
            Layer3::Ipv6(_) => super::IPV6_HEADER_LEN,
        }
    }
}

/// IPv4 header information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Info {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub protocol: u8,
    pub ttl: u8,
    pub header_length: u8,   // in 32-bit words
    pub total_length: u16,
}

impl Default for Ipv4Info {
    fn default() -> Self {
        Self {
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            protocol: 0,
            ttl: 64,
            header_length: 5,
            total_length: 0,
        }
    }
}

/// IPv6 fixed header information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Info {
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
    pub next_header: u8,
    pub hop_limit: u8,
    pub payload_length: u16,
    pub flow_label: u32,
}

impl Default for Ipv6Info {
    fn default() -> Self {
        Self {
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
            next_header: 0,
            hop_limit: 64,
            payload_length: 0,
            flow_label: 0,
        }
    }
}

// ============================================================================
// Layer 4 - Transport
// ============================================================================

/// UDP header information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpInfo {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    /// Offset of the UDP payload inside the packet buffer
    pub payload_offset: usize,
    /// Payload length as bounded by both the UDP and IP headers
    pub payload_len: usize,
}

impl UdpInfo {
    /// Check if either port matches
    pub fn has_port(&self, port: u16) -> bool {
        self.src_port == port || self.dst_port == port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer3_payload_offset() {
        let v4 = Layer3::Ipv4(Ipv4Info { header_length: 6, ..Default::default() });
        assert_eq!(v4.payload_offset(), 24);

        let v6 = Layer3::Ipv6(Ipv6Info::default());
        assert_eq!(v6.payload_offset(), 40);
    }

    #[test]
    fn test_udp_has_port() {
        let udp = UdpInfo { src_port: 3544, dst_port: 5000, ..Default::default() };
        assert!(udp.has_port(3544));
        assert!(udp.has_port(5000));
        assert!(!udp.has_port(53));
    }
}
