//! Packet Engine
//!
//! Multi-threaded packet pipeline built from a textual stage description.
//! Every stage runs on its own OS thread and talks to its neighbours only
//! through named [`PacketQueue`]s.
//!
//! # Architecture
//! ```text
//! ┌─────────────┐  decode-in  ┌──────────────┐  release-in  ┌──────────────┐
//! │   Capture   │────────────▶│    Decode    │─────────────▶│   Release    │
//! │ (pcap/mem)  │             │ (+ tunnels)  │              │ (finish pkt) │
//! └─────────────┘             └──────────────┘              └──────────────┘
//!                                    │                             │
//!                      derived packets queued                 root released
//!                      ahead of their parent                  when processed
//!                                                             and children done
//! ```
//!
//! Shutdown stops capture, then walks the stages upstream first: each
//! stage's input queue is shut down and its thread joined, so every writer
//! of a queue has finished before its readers are told to stop.

pub mod capture;
pub mod pipeline;
mod workers;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::decode::{DecodeStats, DecodeStatsSnapshot};
use crate::queue::{PacketQueue, QueueInfo, QueueRegistry};

pub use capture::{
    create_capture, CaptureConfig, CaptureMethod, CaptureStats, MemoryCapture, PacketCapture,
    PcapCapture, RawFrame,
};
pub use pipeline::{Pipeline, PipelineBuilder, StageBinding, StageKind};

/// Packet engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Root packets created by capture
    pub packets_captured: u64,
    /// Capture source errors
    pub capture_errors: u64,
    /// Packets moved by forward stages
    pub packets_forwarded: u64,
    /// Root packets finished by release stages
    pub roots_finished: u64,
    /// Derived packets finished by release stages
    pub derived_finished: u64,
    /// Roots that became releasable (processed, no children outstanding)
    pub roots_released: u64,
    /// Packets dropped for lack of an output queue
    pub packets_dropped: u64,
    pub capture: CaptureStats,
    pub decode: DecodeStatsSnapshot,
}

/// Counters shared by all stage threads
#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub packets_captured: AtomicU64,
    pub capture_errors: AtomicU64,
    pub packets_forwarded: AtomicU64,
    pub roots_finished: AtomicU64,
    pub derived_finished: AtomicU64,
    pub roots_released: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub capture: Mutex<CaptureStats>,
}

impl EngineCounters {
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, decode: &DecodeStats) -> EngineStats {
        EngineStats {
            packets_captured: self.packets_captured.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            roots_finished: self.roots_finished.load(Ordering::Relaxed),
            derived_finished: self.derived_finished.load(Ordering::Relaxed),
            roots_released: self.roots_released.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            capture: *self.capture.lock(),
            decode: decode.snapshot(),
        }
    }
}

/// Release notifications: counted, then forwarded to an optional observer
#[derive(Debug, Clone)]
pub(crate) struct ReleaseSink {
    rx: Receiver<u64>,
    notify: Option<Sender<u64>>,
}

impl ReleaseSink {
    pub fn new(rx: Receiver<u64>, notify: Option<Sender<u64>>) -> Self {
        Self { rx, notify }
    }

    /// Account for every release reported so far
    pub fn drain(&self, counters: &EngineCounters) {
        for id in self.rx.try_iter() {
            EngineCounters::incr(&counters.roots_released);
            if let Some(tx) = &self.notify {
                let _ = tx.send(id);
            }
        }
    }
}

/// A spawned stage thread
#[derive(Debug)]
pub(crate) struct StageHandle {
    pub name: String,
    pub kind: StageKind,
    pub input: Option<Arc<PacketQueue>>,
    pub thread: Option<JoinHandle<()>>,
}

impl StageHandle {
    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(stage = %self.name, "stage thread panicked");
            } else {
                debug!(stage = %self.name, kind = self.kind.name(), "stage joined");
            }
        }
    }
}

/// Handle on a started pipeline
#[derive(Debug)]
pub struct RunningPipeline {
    registry: QueueRegistry,
    stages: Vec<StageHandle>,
    stop: Arc<AtomicBool>,
    counters: Arc<EngineCounters>,
    decode_stats: Arc<DecodeStats>,
    releases: ReleaseSink,
}

impl RunningPipeline {
    pub(crate) fn new(
        registry: QueueRegistry,
        stages: Vec<StageHandle>,
        stop: Arc<AtomicBool>,
        counters: Arc<EngineCounters>,
        decode_stats: Arc<DecodeStats>,
        releases: ReleaseSink,
    ) -> Self {
        Self {
            registry,
            stages,
            stop,
            counters,
            decode_stats,
            releases,
        }
    }

    /// Live statistics
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot(&self.decode_stats)
    }

    /// Queue table of the running pipeline
    pub fn queues(&self) -> Vec<QueueInfo> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    /// Block until the capture stage has exhausted its source
    pub fn wait_capture(&mut self) {
        for stage in self.stages.iter_mut().filter(|s| s.kind == StageKind::Capture) {
            stage.join();
        }
    }

    /// Stop capture, drain every queue upstream first, join all threads
    pub fn shutdown(mut self) -> EngineStats {
        self.stop_all();
        self.stats()
    }

    fn stop_all(&mut self) {
        if self.stages.iter().all(|s| s.thread.is_none()) {
            return;
        }
        info!("Stopping pipeline...");
        self.stop.store(true, Ordering::Release);

        for stage in &mut self.stages {
            if let Some(input) = stage.input.as_ref().filter(|q| !q.is_shutdown()) {
                input.shutdown();
            }
            stage.join();
        }

        self.releases.drain(&self.counters);
        info!("Pipeline stopped");
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}
