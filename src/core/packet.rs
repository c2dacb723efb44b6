//! Packet representation passed between pipeline stages
//!
//! A `Packet` is move-only: handing it to a queue transfers ownership to the
//! receiving stage. Root packets come from capture; derived (pseudo) packets
//! are synthesized by tunnel decapsulation and keep their root alive until
//! they are finished or dropped.

use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use super::layers::{Layer3, UdpInfo};
use super::lifecycle::{ChildHold, RootHold, RootState};

/// Network-layer protocol a packet buffer starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketProto {
    Ipv4,
    Ipv6,
    /// Not yet known; the decoder sniffs the version nibble
    Raw,
}

impl std::fmt::Display for PacketProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketProto::Ipv4 => write!(f, "IPv4"),
            PacketProto::Ipv6 => write!(f, "IPv6"),
            PacketProto::Raw => write!(f, "raw"),
        }
    }
}

/// Envelope a derived packet was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    Teredo,
}

/// Process-wide packet id allocator
#[derive(Debug, Default)]
pub struct PacketIds {
    next: AtomicU64,
}

impl PacketIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug)]
enum Lineage {
    Root(RootHold),
    Derived(ChildHold),
}

/// A packet moving through the pipeline
#[derive(Debug)]
pub struct Packet {
    /// Capture time since the Unix epoch, when the source reports one.
    /// Derived packets carry their parent's.
    pub timestamp: Option<Duration>,
    /// Unique packet id
    id: u64,
    /// Raw bytes starting at the network layer
    data: Vec<u8>,
    /// Declared protocol of `data`
    proto: PacketProto,
    /// Tunnel nesting depth (0 for roots)
    depth: u8,
    /// Envelope this packet came out of, if derived
    tunnel: Option<TunnelKind>,
    lineage: Lineage,

    /// IP layer, once decoded
    pub layer3: Option<Layer3>,
    /// UDP layer, once decoded
    pub udp: Option<UdpInfo>,
}

impl Packet {
    /// Create a root packet
    pub fn root(id: u64, data: Vec<u8>, proto: PacketProto) -> Self {
        Self::root_with_release(id, data, proto, None)
    }

    /// Create a root packet that reports its release on `release_tx`
    pub fn root_with_release(
        id: u64,
        data: Vec<u8>,
        proto: PacketProto,
        release_tx: Option<Sender<u64>>,
    ) -> Self {
        let state = Arc::new(RootState::new(id, release_tx));
        Self {
            timestamp: None,
            id,
            data,
            proto,
            depth: 0,
            tunnel: None,
            lineage: Lineage::Root(RootHold::new(state)),
            layer3: None,
            udp: None,
        }
    }

    /// Create a derived packet from `bytes` found inside `parent`.
    ///
    /// The new packet is linked to the parent's root (the parent itself when
    /// it is a root) and the root's outstanding count is incremented.
    /// Fails only if the buffer copy cannot be allocated, in which case the
    /// root is left untouched.
    pub fn derive(
        parent: &Packet,
        id: u64,
        bytes: &[u8],
        proto: PacketProto,
        tunnel: TunnelKind,
    ) -> Result<Self, TryReserveError> {
        let mut data = Vec::new();
        reserve(&mut data, bytes.len())?;
        data.extend_from_slice(bytes);

        Ok(Self {
            timestamp: parent.timestamp,
            id,
            data,
            proto,
            depth: parent.depth.saturating_add(1),
            tunnel: Some(tunnel),
            lineage: Lineage::Derived(ChildHold::acquire(parent.root_state())),
            layer3: None,
            udp: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn proto(&self) -> PacketProto {
        self.proto
    }

    /// Set once the decoder has identified a raw buffer
    pub(crate) fn set_proto(&mut self, proto: PacketProto) {
        self.proto = proto;
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn tunnel(&self) -> Option<TunnelKind> {
        self.tunnel
    }

    pub fn is_root(&self) -> bool {
        matches!(self.lineage, Lineage::Root(_))
    }

    pub fn is_derived(&self) -> bool {
        !self.is_root()
    }

    /// Accounting state of this packet's root
    pub fn root_state(&self) -> &Arc<RootState> {
        match &self.lineage {
            Lineage::Root(hold) => hold.state(),
            Lineage::Derived(hold) => hold.root(),
        }
    }

    /// Id of the root packet (own id for roots)
    pub fn root_id(&self) -> u64 {
        self.root_state().id()
    }

    /// UDP payload bytes, once decoded
    pub fn udp_payload(&self) -> Option<&[u8]> {
        let udp = self.udp.as_ref()?;
        self.data.get(udp.payload_offset..udp.payload_offset + udp.payload_len)
    }

    /// Terminal state transition.
    ///
    /// A derived packet releases its hold on the root; a root packet is marked
    /// processed. Dropping a packet has the same effect, so a packet lost on
    /// an error path never leaks its root.
    pub fn finish(self) {
        drop(self);
    }
}

fn reserve(data: &mut Vec<u8>, len: usize) -> Result<(), TryReserveError> {
    let len = if forced_alloc_failure() { usize::MAX } else { len };
    data.try_reserve_exact(len)
}

#[cfg(not(test))]
#[inline(always)]
fn forced_alloc_failure() -> bool {
    false
}

#[cfg(test)]
fn forced_alloc_failure() -> bool {
    alloc_failure::active()
}
