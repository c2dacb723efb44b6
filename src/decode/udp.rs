//! UDP decoding and tunnel hand-off

use etherparse::UdpHeaderSlice;
use tracing::trace;

use crate::core::{Packet, UdpInfo, UDP_HEADER_LEN};

use super::{teredo, DecodeStats, DecodeThreadVars};

/// Decode the UDP header at `offset`, with `avail` bytes of IP payload.
///
/// On success the UDP payload is offered to the Teredo decoder; if it is not
/// a tunnel the packet stays an ordinary UDP packet.
pub fn decode_udp(tv: &DecodeThreadVars, packet: &mut Packet, offset: usize, avail: usize) {
    let Some(ip_payload) = packet.data().get(offset..offset + avail) else {
        DecodeStats::incr(&tv.stats().invalid);
        return;
    };
    let Ok(header) = UdpHeaderSlice::from_slice(ip_payload) else {
        trace!(packet = packet.id(), "truncated UDP header");
        DecodeStats::incr(&tv.stats().invalid);
        return;
    };

    let length = header.length();
    let udp_len = usize::from(length);
    if udp_len < UDP_HEADER_LEN || udp_len > ip_payload.len() {
        trace!(packet = packet.id(), udp_len, avail, "bad UDP length");
        DecodeStats::incr(&tv.stats().invalid);
        return;
    }

    let info = UdpInfo {
        src_port: header.source_port(),
        dst_port: header.destination_port(),
        length,
        payload_offset: offset + UDP_HEADER_LEN,
        payload_len: udp_len - UDP_HEADER_LEN,
    };
    DecodeStats::incr(&tv.stats().udp);

    let try_teredo = teredo_candidate(tv, &info);
    packet.udp = Some(info);

    if try_teredo {
        let packet: &Packet = packet;
        if let Some(payload) = packet.udp_payload() {
            teredo::decode_teredo(tv, packet, payload);
        }
    }
}

fn teredo_candidate(tv: &DecodeThreadVars, udp: &UdpInfo) -> bool {
    let teredo = &tv.config().teredo;
    teredo.enabled && (teredo.ports.is_empty() || teredo.ports.iter().any(|p| udp.has_port(*p)))
}
