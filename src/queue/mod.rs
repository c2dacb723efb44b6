//! Named inter-stage queues
//!
//! ```text
//! ┌──────────┐  "decode-in"  ┌──────────┐  "release-in"  ┌──────────┐
//! │ capture  │──────────────▶│  decode  │───────────────▶│ release  │
//! └──────────┘               └──────────┘                └──────────┘
//! ```
//!
//! - `QueueRegistry`: id/name directory, built once per pipeline
//! - `PacketQueue`: blocking FIFO shared by the stages around it
//! - `validate_topology`: every queue has a reader and a writer

pub mod packet_queue;
pub mod registry;
pub mod topology;

use serde::{Deserialize, Serialize};

pub use packet_queue::PacketQueue;
pub use registry::{QueueInfo, QueueRecord, QueueRegistry, MAX_QUEUES};
pub use topology::{validate_topology, QueueFault};

/// Index of a queue inside its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueId(pub u16);

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
