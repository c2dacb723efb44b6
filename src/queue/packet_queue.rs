//! Concurrent FIFO moving packet ownership between stages
//!
//! One mutex guards the FIFO together with the reader/writer counts; the
//! condition variable wakes consumers blocked in [`PacketQueue::dequeue`].
//! The queue is unbounded.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::core::Packet;

#[derive(Debug, Default)]
struct QueueState {
    packets: VecDeque<Packet>,
    readers: u32,
    writers: u32,
    shutdown: bool,
}

/// Blocking packet queue
#[derive(Debug, Default)]
pub struct PacketQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet and wake one consumer.
    ///
    /// Packets enqueued after shutdown are still accepted; the consumer drains
    /// them before it sees the stop sentinel.
    pub fn enqueue(&self, packet: Packet) {
        let mut state = self.state.lock();
        state.packets.push_back(packet);
        drop(state);
        self.cond.notify_one();
    }

    /// Remove the head packet, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub fn dequeue(&self) -> Option<Packet> {
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                return Some(packet);
            }
            if state.shutdown {
                return None;
            }
            self.cond.wait(&mut state);
        }
    }

    /// Remove the head packet without blocking
    pub fn try_dequeue(&self) -> Option<Packet> {
        self.state.lock().packets.pop_front()
    }

    /// Current length. Diagnostics only: the value may be stale as soon as
    /// the lock is released.
    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every blocked consumer; `dequeue` returns `None` once drained
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.cond.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn add_reader(&self) {
        self.state.lock().readers += 1;
    }

    pub fn add_writer(&self) {
        self.state.lock().writers += 1;
    }

    pub fn readers(&self) -> u32 {
        self.state.lock().readers
    }

    pub fn writers(&self) -> u32 {
        self.state.lock().writers
    }

    /// Reader count, writer count and length read under one lock
    pub fn counts(&self) -> (u32, u32, usize) {
        let state = self.state.lock();
        (state.readers, state.writers, state.packets.len())
    }
}
