//! Root / derived packet accounting
//!
//! A root packet may only be released once it has been processed *and*
//! every packet derived from it (tunnel decapsulation, possibly nested) has
//! completed. Each derived packet owns a [`ChildHold`] on the root's
//! [`RootState`]; the root packet itself owns a [`RootHold`]. Both holds
//! settle their side of the accounting exactly once, when dropped.
//!
//! The processed flag and the outstanding-children count share a single
//! atomic word so that exactly one of "last child done" and "root processed"
//! observes the transition into the releasable state.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{trace, warn};

const PROCESSED: u32 = 1 << 31;
const COUNT_MASK: u32 = PROCESSED - 1;

/// Shared accounting state of a root packet
#[derive(Debug)]
pub struct RootState {
    /// Id of the root packet
    id: u64,
    /// PROCESSED flag | outstanding children
    state: AtomicU32,
    /// Receives the root id when it becomes releasable
    release_tx: Option<Sender<u64>>,
}

impl RootState {
    pub fn new(id: u64, release_tx: Option<Sender<u64>>) -> Self {
        Self {
            id,
            state: AtomicU32::new(0),
            release_tx,
        }
    }

    /// Root packet id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of derived packets still in flight
    pub fn outstanding(&self) -> u32 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Whether the root packet itself has finished processing
    pub fn is_processed(&self) -> bool {
        self.state.load(Ordering::Acquire) & PROCESSED != 0
    }

    /// Processed and no children outstanding
    pub fn is_releasable(&self) -> bool {
        self.state.load(Ordering::Acquire) == PROCESSED
    }

    /// Register a new derived packet
    pub(crate) fn add_child(&self) {
        let prev = self.state.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev & COUNT_MASK < COUNT_MASK, "outstanding children overflow");
        if prev & PROCESSED != 0 {
            // Derived packets are created while the root is still being decoded.
            warn!(root = self.id, "derived packet registered after root was processed");
        }
    }

    /// A derived packet reached its terminal state.
    ///
    /// Returns true if this call made the root releasable.
    pub(crate) fn child_done(&self) -> bool {
        let prev = self.state.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev & COUNT_MASK > 0, "child completion without outstanding child");
        if prev == PROCESSED | 1 {
            self.notify_release();
            true
        } else {
            false
        }
    }

    /// The root packet reached its terminal state.
    ///
    /// Returns true if this call made the root releasable.
    pub(crate) fn mark_processed(&self) -> bool {
        let prev = self.state.fetch_or(PROCESSED, Ordering::AcqRel);
        debug_assert!(prev & PROCESSED == 0, "root processed twice");
        if prev == 0 {
            self.notify_release();
            true
        } else {
            trace!(root = self.id, outstanding = prev & COUNT_MASK, "root parked on children");
            false
        }
    }

    fn notify_release(&self) {
        trace!(root = self.id, "root releasable");
        if let Some(tx) = &self.release_tx {
            // Receiver gone means nobody is watching releases any more.
            let _ = tx.send(self.id);
        }
    }
}

/// Held by a root packet; marks the root processed when dropped
#[derive(Debug)]
pub struct RootHold {
    state: Arc<RootState>,
}

impl RootHold {
    pub fn new(state: Arc<RootState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<RootState> {
        &self.state
    }
}

impl Drop for RootHold {
    fn drop(&mut self) {
        self.state.mark_processed();
    }
}

/// Held by a derived packet; decrements the root's outstanding count when dropped
#[derive(Debug)]
pub struct ChildHold {
    root: Arc<RootState>,
}

impl ChildHold {
    /// Take a hold on `root`, incrementing its outstanding count
    pub fn acquire(root: &Arc<RootState>) -> Self {
        root.add_child();
        Self { root: Arc::clone(root) }
    }

    pub fn root(&self) -> &Arc<RootState> {
        &self.root
    }
}

impl Drop for ChildHold {
    fn drop(&mut self) {
        self.root.child_done();
    }
}
