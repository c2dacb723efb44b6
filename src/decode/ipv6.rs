//! IPv6 fixed header decoding
//!
//! Extension headers are not walked; only a UDP next header is followed.

use etherparse::{IpNumber, Ipv6HeaderSlice};
use tracing::trace;

use crate::core::{Ipv6Info, Layer3, Packet, IPV6_HEADER_LEN};

use super::{udp, DecodeStats, DecodeThreadVars};

/// Version nibble of a raw IP header
#[inline]
pub fn ip_version(data: &[u8]) -> Option<u8> {
    data.first().map(|b| b >> 4)
}

/// Payload length field of a raw IPv6 header
#[inline]
pub fn ipv6_payload_len(data: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(4)?, *data.get(5)?]))
}

/// Parse the fixed IPv6 header; the declared payload must fit inside `data`
pub fn parse_ipv6(data: &[u8]) -> Option<Ipv6Info> {
    let header = Ipv6HeaderSlice::from_slice(data).ok()?;

    let payload_length = header.payload_length();
    if IPV6_HEADER_LEN + usize::from(payload_length) > data.len() {
        return None;
    }

    Some(Ipv6Info {
        src_addr: header.source_addr(),
        dst_addr: header.destination_addr(),
        next_header: header.next_header().0,
        hop_limit: header.hop_limit(),
        payload_length,
        flow_label: header.flow_label().value(),
    })
}

pub fn decode_ipv6(tv: &DecodeThreadVars, packet: &mut Packet) {
    let Some(info) = parse_ipv6(packet.data()) else {
        trace!(packet = packet.id(), len = packet.len(), "invalid IPv6 header");
        DecodeStats::incr(&tv.stats().invalid);
        return;
    };
    DecodeStats::incr(&tv.stats().ipv6);

    let payload_len = usize::from(info.payload_length);
    let layer3 = Layer3::Ipv6(info);
    let offset = layer3.payload_offset();
    let next_header = layer3.protocol();
    packet.layer3 = Some(layer3);

    if next_header == IpNumber::UDP.0 {
        udp::decode_udp(tv, packet, offset, payload_len);
    }
}
