//! Packet decoding
//!
//! Dispatch is a closed match over [`PacketProto`]; each protocol has one
//! decode function. Tunnel decapsulation feeds derived packets back through
//! [`decode_packet`], so a tunnel inside a tunnel is unwrapped transitively
//! up to `decode.max_tunnel_depth`.
//!
//! ```text
//! decode_packet ─▶ ipv4 / ipv6 ─▶ udp ─▶ teredo ─▶ decode_tunnel ─┐
//!       ▲                                                         │
//!       └─────────────────────── derived packet ──────────────────┘
//! ```
//!
//! Malformed input is never an error here: it bumps `invalid` and the
//! packet continues down the pipeline undecoded.

pub mod ipv4;
pub mod ipv6;
pub mod teredo;
pub mod tunnel;
pub mod udp;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use crate::config::DecodeConfig;
use crate::core::{Packet, PacketIds, PacketProto};
use crate::queue::PacketQueue;

pub use teredo::decode_teredo;
pub use tunnel::{decode_tunnel, TunnelVerdict};

/// Decode counters shared by all decode threads.
///
/// Relaxed atomics: the values are telemetry, not control state.
#[derive(Debug, Default)]
pub struct DecodeStats {
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub ipv4: AtomicU64,
    pub ipv6: AtomicU64,
    pub udp: AtomicU64,
    pub teredo: AtomicU64,
    pub tunnel_depth_exceeded: AtomicU64,
    pub tunnel_alloc_failed: AtomicU64,
    pub invalid: AtomicU64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DecodeStatsSnapshot {
        DecodeStatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            ipv4: self.ipv4.load(Ordering::Relaxed),
            ipv6: self.ipv6.load(Ordering::Relaxed),
            udp: self.udp.load(Ordering::Relaxed),
            teredo: self.teredo.load(Ordering::Relaxed),
            tunnel_depth_exceeded: self.tunnel_depth_exceeded.load(Ordering::Relaxed),
            tunnel_alloc_failed: self.tunnel_alloc_failed.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DecodeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStatsSnapshot {
    pub packets: u64,
    pub bytes: u64,
    pub ipv4: u64,
    pub ipv6: u64,
    pub udp: u64,
    pub teredo: u64,
    pub tunnel_depth_exceeded: u64,
    pub tunnel_alloc_failed: u64,
    pub invalid: u64,
}

/// Per-thread decode context
#[derive(Debug)]
pub struct DecodeThreadVars {
    config: DecodeConfig,
    stats: Arc<DecodeStats>,
    ids: Arc<PacketIds>,
    /// Derived packets produced while decoding the current packet
    post_queue: PacketQueue,
}

impl DecodeThreadVars {
    pub fn new(config: DecodeConfig, stats: Arc<DecodeStats>, ids: Arc<PacketIds>) -> Self {
        Self {
            config,
            stats,
            ids,
            post_queue: PacketQueue::new(),
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<DecodeStats> {
        &self.stats
    }

    pub(crate) fn next_packet_id(&self) -> u64 {
        self.ids.next_id()
    }

    pub(crate) fn publish(&self, packet: Packet) {
        self.post_queue.enqueue(packet);
    }

    /// Number of derived packets waiting to be forwarded
    pub fn pending(&self) -> usize {
        self.post_queue.len()
    }

    /// Take every derived packet produced so far, innermost first
    pub fn take_pending(&self) -> Vec<Packet> {
        std::iter::from_fn(|| self.post_queue.try_dequeue()).collect()
    }
}

/// Decode `packet` according to its declared protocol
pub fn decode_packet(tv: &DecodeThreadVars, packet: &mut Packet) {
    DecodeStats::incr(&tv.stats.packets);
    tv.stats.bytes.fetch_add(packet.len() as u64, Ordering::Relaxed);

    match packet.proto() {
        PacketProto::Ipv4 => ipv4::decode_ipv4(tv, packet),
        PacketProto::Ipv6 => ipv6::decode_ipv6(tv, packet),
        PacketProto::Raw => match ipv6::ip_version(packet.data()) {
            Some(4) => {
                packet.set_proto(PacketProto::Ipv4);
                ipv4::decode_ipv4(tv, packet)
            }
            Some(6) => {
                packet.set_proto(PacketProto::Ipv6);
                ipv6::decode_ipv6(tv, packet)
            }
            _ => {
                trace!(packet = packet.id(), "unknown network layer");
                DecodeStats::incr(&tv.stats.invalid);
            }
        },
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Packet builders shared by the decoder tests

    use super::*;

    pub fn make_tv(config: DecodeConfig) -> DecodeThreadVars {
        DecodeThreadVars::new(config, DecodeStats::shared(), PacketIds::shared())
    }

    /// IPv6 header followed by `payload`, payload length field = payload.len()
    pub fn ipv6_packet(next_header: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 40];
        buf[0] = 0x60;
        buf[4..6].copy_from_slice(&(payload.len() as u16).to_be_bytes());
        buf[6] = next_header;
        buf[7] = 64;
        buf[8..24].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        buf[24..40].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        buf.extend_from_slice(payload);
        buf
    }

    /// IPv4 header (no options) followed by `payload`
    pub fn ipv4_packet(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let total = 20 + payload.len();
        let mut buf = vec![0u8; 20];
        buf[0] = 0x45;
        buf[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        buf[8] = 64;
        buf[9] = protocol;
        buf[12..16].copy_from_slice(&[192, 0, 2, 1]);
        buf[16..20].copy_from_slice(&[198, 51, 100, 7]);
        buf.extend_from_slice(payload);
        buf
    }

    /// UDP header followed by `payload`
    pub fn udp_datagram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(&src_port.to_be_bytes());
        buf.extend_from_slice(&dst_port.to_be_bytes());
        buf.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(payload);
        buf
    }

    /// Teredo origin indication: marker + 6 bytes of port/address
    pub fn origin_indication() -> [u8; 8] {
        [0x00, 0x00, 0x0d, 0x96, 0x3f, 0x57, 0xfe, 0xfd]
    }

    /// IPv4/UDP packet on the Teredo port carrying `teredo_payload`
    pub fn teredo_over_ipv4(teredo_payload: &[u8]) -> Vec<u8> {
        ipv4_packet(17, &udp_datagram(3544, 40000, teredo_payload))
    }
}
