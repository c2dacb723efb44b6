//! crmonban packet ingestion core
//!
//! Stages of the IDS pipeline run on their own threads and exchange packets
//! through named queues. The decode layer recognizes tunnels (Teredo) and
//! re-injects the inner packet into the pipeline as a derived packet; a root
//! packet is only released once every packet derived from it has completed.
//!
//! # Example
//!
//! ```ignore
//! use crmonban_ingest::config::Config;
//! use crmonban_ingest::engine::{PcapCapture, PipelineBuilder};
//!
//! let config = Config::load("ingest.toml")?;
//! let pipeline = PipelineBuilder::from_config(&config).build()?;
//! let mut running = pipeline.start(Box::new(PcapCapture::open("trace.pcap")?))?;
//! running.wait_capture();
//! let stats = running.shutdown();
//! ```

pub mod config;
pub mod core;
pub mod decode;
pub mod detect;
pub mod engine;
pub mod error;
pub mod queue;

pub use crate::config::Config;
pub use crate::core::{Packet, PacketProto, RootState, TunnelKind};
pub use crate::decode::{decode_packet, decode_teredo, decode_tunnel, DecodeStats, DecodeThreadVars, TunnelVerdict};
pub use crate::detect::{KeywordTable, Signature};
pub use crate::engine::{EngineStats, Pipeline, PipelineBuilder, RunningPipeline, StageKind};
pub use crate::error::{ConfigError, DetectError, QueueError, StartupError, TopologyError};
pub use crate::queue::{validate_topology, PacketQueue, QueueId, QueueRegistry};
