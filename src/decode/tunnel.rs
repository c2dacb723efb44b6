//! Generic tunnel decapsulation
//!
//! A tunnel decoder that has found a valid inner packet hands the inner bytes
//! to [`decode_tunnel`]. The inner packet becomes a derived packet linked to
//! the root, is decoded in turn, and is queued on the decode thread's post
//! queue so the stage can forward it ahead of its parent.

use tracing::{debug, trace, warn};

use crate::core::{Packet, PacketProto, TunnelKind};

use super::{decode_packet, DecodeStats, DecodeThreadVars};

/// Outcome of a tunnel decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelVerdict {
    /// Not a tunnel (or not one we could take); the parent is unaffected
    NotTunnel,
    /// A derived packet with this id was decoded and queued
    Produced { id: u64 },
}

impl TunnelVerdict {
    pub fn is_produced(&self) -> bool {
        matches!(self, TunnelVerdict::Produced { .. })
    }
}

/// Turn `buf`, found inside `parent`, into a derived packet of `proto`.
pub fn decode_tunnel(
    tv: &DecodeThreadVars,
    parent: &Packet,
    buf: &[u8],
    proto: PacketProto,
    kind: TunnelKind,
) -> TunnelVerdict {
    let depth = u16::from(parent.depth()) + 1;
    if depth > u16::from(tv.config().max_tunnel_depth) {
        debug!(
            root = parent.root_id(),
            depth,
            max = tv.config().max_tunnel_depth,
            "tunnel nesting limit reached"
        );
        DecodeStats::incr(&tv.stats().tunnel_depth_exceeded);
        return TunnelVerdict::NotTunnel;
    }

    let id = tv.next_packet_id();
    let mut derived = match Packet::derive(parent, id, buf, proto, kind) {
        Ok(p) => p,
        Err(e) => {
            warn!(root = parent.root_id(), len = buf.len(), "cannot allocate derived packet: {}", e);
            DecodeStats::incr(&tv.stats().tunnel_alloc_failed);
            return TunnelVerdict::NotTunnel;
        }
    };

    trace!(
        id,
        parent = parent.id(),
        root = parent.root_id(),
        depth = derived.depth(),
        ?kind,
        "derived packet"
    );

    decode_packet(tv, &mut derived);
    tv.publish(derived);

    TunnelVerdict::Produced { id }
}
