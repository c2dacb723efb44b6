//! Teredo (IPv6 over UDP/IPv4, RFC 4380) detection
//!
//! A Teredo payload is an IPv6 packet, optionally preceded by an origin
//! indication (8 bytes, marker `0x00 0x00`). Anything else that starts with
//! a zero byte is an authentication header or unknown and is not decoded.

use tracing::trace;

use crate::core::{Packet, PacketProto, TunnelKind, IPV6_HEADER_LEN};

use super::ipv6::{ip_version, ipv6_payload_len};
use super::{decode_tunnel, DecodeStats, DecodeThreadVars, TunnelVerdict};

const ORIGIN_INDICATION_LEN: usize = 8;

const TEREDO_ORIGIN_INDICATION: u8 = 0x00;
const TEREDO_AUTHENTICATION: u8 = 0x01;

/// Offset of the inner IPv6 header, or `None` if `buf` is not Teredo.
fn inner_offset(buf: &[u8]) -> Option<usize> {
    let len = buf.len();
    if len < IPV6_HEADER_LEN {
        return None;
    }

    let mut off = 0;
    while buf.get(off) == Some(&0x00) {
        match buf.get(off + 1).copied()? {
            TEREDO_ORIGIN_INDICATION => {
                if len >= off + ORIGIN_INDICATION_LEN + IPV6_HEADER_LEN {
                    off += ORIGIN_INDICATION_LEN;
                } else {
                    return None;
                }
            }
            TEREDO_AUTHENTICATION => return None,
            _ => return None,
        }
    }

    let start = &buf[off..];
    if ip_version(start) != Some(6) {
        return None;
    }
    let plen = usize::from(ipv6_payload_len(start)?);
    if IPV6_HEADER_LEN + plen + off != len {
        return None;
    }

    Some(off)
}

/// Try to decode `buf` (a UDP payload of `parent`) as a Teredo packet
pub fn decode_teredo(tv: &DecodeThreadVars, parent: &Packet, buf: &[u8]) -> TunnelVerdict {
    let Some(off) = inner_offset(buf) else {
        trace!(packet = parent.id(), len = buf.len(), "not a teredo payload");
        return TunnelVerdict::NotTunnel;
    };

    let verdict = decode_tunnel(tv, parent, &buf[off..], PacketProto::Ipv6, TunnelKind::Teredo);
    if verdict.is_produced() {
        DecodeStats::incr(&tv.stats().teredo);
    }
    verdict
}
