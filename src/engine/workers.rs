//! Stage thread bodies
//!
//! Each stage runs one of the loops below on its own thread. Non-capture
//! stages block in [`PacketQueue::dequeue`] and exit once their input queue
//! has been shut down and drained.
//!
//! ## Ordering
//!
//! Output queues are chosen by root id, so a root and everything derived
//! from it travel through the same queues. The decode stage writes derived
//! packets before their parent; queues are FIFO, so downstream stages see
//! the inner packets first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, error, info, trace, warn};

use crate::core::{Packet, PacketIds};
use crate::decode::{decode_packet, DecodeThreadVars};
use crate::queue::PacketQueue;

use super::capture::PacketCapture;
use super::{EngineCounters, ReleaseSink};

/// Output queues of a stage
#[derive(Debug, Clone)]
pub struct Outputs {
    queues: Vec<Arc<PacketQueue>>,
}

impl Outputs {
    pub fn new(queues: Vec<Arc<PacketQueue>>) -> Self {
        Self { queues }
    }

    /// Queue serving the root with id `root_id`
    pub fn select(&self, root_id: u64) -> Option<&Arc<PacketQueue>> {
        if self.queues.is_empty() {
            return None;
        }
        let idx = (root_id % self.queues.len() as u64) as usize;
        self.queues.get(idx)
    }

    /// Hand `packet` to its output queue. Returns false if there is none,
    /// in which case the packet is finished here.
    pub fn route(&self, packet: Packet) -> bool {
        match self.select(packet.root_id()) {
            Some(queue) => {
                queue.enqueue(packet);
                true
            }
            None => {
                warn!(packet = packet.id(), "stage has no output queue, dropping packet");
                packet.finish();
                false
            }
        }
    }
}

/// Capture stage: read frames until the source is exhausted or stop is set
pub(crate) fn run_capture(
    mut source: Box<dyn PacketCapture>,
    outputs: Outputs,
    ids: Arc<PacketIds>,
    release_tx: Sender<u64>,
    stop: Arc<AtomicBool>,
    counters: Arc<EngineCounters>,
) {
    info!("Capture started");

    while !stop.load(Ordering::Acquire) {
        match source.next_packet() {
            Ok(Some(frame)) => {
                let id = ids.next_id();
                let mut packet = Packet::root_with_release(id, frame.data, frame.proto, Some(release_tx.clone()));
                packet.timestamp = frame.timestamp;
                trace!(packet = id, len = packet.len(), "captured");
                EngineCounters::incr(&counters.packets_captured);
                if !outputs.route(packet) {
                    EngineCounters::incr(&counters.packets_dropped);
                }
            }
            Ok(None) => {
                debug!("capture source exhausted");
                break;
            }
            Err(e) => {
                error!("Capture error: {:#}", e);
                EngineCounters::incr(&counters.capture_errors);
                break;
            }
        }
    }

    *counters.capture.lock() = source.stats();
    info!("Capture stopped");
}

/// Decode stage: decode each packet, then forward its derived packets
/// followed by the packet itself
pub(crate) fn run_decode(input: &PacketQueue, outputs: Outputs, tv: DecodeThreadVars, counters: Arc<EngineCounters>) {
    debug!("decode stage running");

    while let Some(mut packet) = input.dequeue() {
        if packet.is_root() {
            decode_packet(&tv, &mut packet);
        }

        for derived in tv.take_pending() {
            if !outputs.route(derived) {
                EngineCounters::incr(&counters.packets_dropped);
            }
        }
        if !outputs.route(packet) {
            EngineCounters::incr(&counters.packets_dropped);
        }
    }

    debug!("decode stage drained");
}

/// Forward stage: move packets to the outputs unchanged
pub(crate) fn run_forward(input: &PacketQueue, outputs: Outputs, counters: Arc<EngineCounters>) {
    debug!("forward stage running");

    while let Some(packet) = input.dequeue() {
        if outputs.route(packet) {
            EngineCounters::incr(&counters.packets_forwarded);
        } else {
            EngineCounters::incr(&counters.packets_dropped);
        }
    }

    debug!("forward stage drained");
}

/// Release stage: finish every packet and account for released roots
pub(crate) fn run_release(input: &PacketQueue, releases: ReleaseSink, counters: Arc<EngineCounters>) {
    debug!("release stage running");

    while let Some(packet) = input.dequeue() {
        if packet.is_root() {
            EngineCounters::incr(&counters.roots_finished);
        } else {
            EngineCounters::incr(&counters.derived_finished);
        }
        packet.finish();
        releases.drain(&counters);
    }

    releases.drain(&counters);
    debug!("release stage drained");
}
