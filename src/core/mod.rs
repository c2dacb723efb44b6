//! Core shared types for packet ingestion
//!
//! - `Packet`: move-only packet with root/derived lineage
//! - `lifecycle`: outstanding-children accounting for root packets
//! - `layers`: decoded network layer summaries

pub mod layers;
pub mod lifecycle;
pub mod packet;

pub use layers::{Layer3, Ipv4Info, Ipv6Info, UdpInfo};
pub use lifecycle::{ChildHold, RootHold, RootState};
pub use packet::{Packet, PacketIds, PacketProto, TunnelKind};

/// Fixed IPv6 header length
pub const IPV6_HEADER_LEN: usize = 40;

/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;
