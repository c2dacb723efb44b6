//! IPv4 header decoding

use etherparse::{IpNumber, Ipv4HeaderSlice};
use tracing::trace;

use crate::core::{Ipv4Info, Layer3, Packet};

use super::{udp, DecodeStats, DecodeThreadVars};

/// Parse an IPv4 header without options interpretation.
///
/// The total length must cover the header and fit inside `data`; anything
/// past it (link-layer padding) is ignored.
pub fn parse_ipv4(data: &[u8]) -> Option<Ipv4Info> {
    let header = Ipv4HeaderSlice::from_slice(data).ok()?;

    let total = usize::from(header.total_len());
    if total < header.slice().len() || total > data.len() {
        return None;
    }

    Some(Ipv4Info {
        src_addr: header.source_addr(),
        dst_addr: header.destination_addr(),
        protocol: header.protocol().0,
        ttl: header.ttl(),
        header_length: header.ihl(),
        total_length: header.total_len(),
    })
}

pub fn decode_ipv4(tv: &DecodeThreadVars, packet: &mut Packet) {
    let Some(info) = parse_ipv4(packet.data()) else {
        trace!(packet = packet.id(), len = packet.len(), "invalid IPv4 header");
        DecodeStats::incr(&tv.stats().invalid);
        return;
    };
    DecodeStats::incr(&tv.stats().ipv4);

    let total = usize::from(info.total_length);
    let layer3 = Layer3::Ipv4(info);
    let offset = layer3.payload_offset();
    let protocol = layer3.protocol();
    packet.layer3 = Some(layer3);

    if protocol == IpNumber::UDP.0 {
        udp::decode_udp(tv, packet, offset, total - offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecodeConfig;
    use crate::core::PacketProto;
    use crate::decode::testutil::*;

    #[test]
    fn test_parse_ipv4() {
        use std::net::Ipv4Addr;

        let data = ipv4_packet(6, &[0u8; 10]);
        let info = parse_ipv4(&data).unwrap();
        assert_eq!(info.src_addr, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(info.dst_addr, Ipv4Addr::new(198, 51, 100, 7));
        assert_eq!(info.protocol, 6);
        assert_eq!(info.total_length, 30);
    }

    #[test]
    fn test_reject_short_and_bad_lengths() {
        assert!(parse_ipv4(&[0x45; 19]).is_none());

        let mut data = ipv4_packet(17, &[0u8; 8]);
        data[0] = 0x44; // IHL below minimum
        assert!(parse_ipv4(&data).is_none());

        let mut data = ipv4_packet(17, &[0u8; 8]);
        data[2..4].copy_from_slice(&100u16.to_be_bytes()); // longer than buffer
        assert!(parse_ipv4(&data).is_none());

        let mut data = ipv4_packet(17, &[0u8; 8]);
        data[0] = 0x65; // wrong version
        assert!(parse_ipv4(&data).is_none());
    }

    #[test]
    fn test_decode_sets_layer3() {
        let tv = make_tv(DecodeConfig::default());
        let mut p = Packet::root(1, ipv4_packet(1, &[8, 0, 0, 0]), PacketProto::Ipv4);
        decode_ipv4(&tv, &mut p);

        let l3 = p.layer3.as_ref().unwrap();
        assert_eq!(l3.protocol(), 1);
        assert_eq!(l3.payload_offset(), 20);
        assert!(p.udp.is_none());
    }

    #[test]
    fn test_trailing_ethernet_padding_ignored() {
        let tv = make_tv(DecodeConfig::default());
        let mut data = ipv4_packet(17, &udp_datagram(53, 53, &[1, 2, 3, 4]));
        data.extend_from_slice(&[0u8; 6]);
        let mut p = Packet::root(1, data, PacketProto::Ipv4);
        decode_ipv4(&tv, &mut p);

        assert_eq!(p.udp_payload(), Some(&[1u8, 2, 3, 4][..]));
    }
}
