//! Directory of named pipeline queues
//!
//! Queues are created while the pipeline is being constructed and addressed
//! afterwards by [`QueueId`]. The registry is owned and mutated through
//! `&mut self` only, which keeps construction single-threaded; running
//! stages hold `Arc<PacketQueue>` clones and never touch the registry.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use crate::error::QueueError;

use super::packet_queue::PacketQueue;
use super::QueueId;

/// Maximum number of queues a registry can hold
pub const MAX_QUEUES: usize = 256;

/// One registered queue
#[derive(Debug)]
pub struct QueueRecord {
    id: QueueId,
    name: String,
    queue: Arc<PacketQueue>,
}

impl QueueRecord {
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<PacketQueue> {
        &self.queue
    }
}

/// Point-in-time view of one queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct QueueInfo {
    pub id: QueueId,
    pub name: String,
    pub readers: u32,
    pub writers: u32,
    pub len: usize,
}

/// Registry of all queues in a pipeline
#[derive(Debug)]
pub struct QueueRegistry {
    queues: Vec<QueueRecord>,
    reject_duplicates: bool,
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueRegistry {
    /// Registry that rejects duplicate queue names
    pub fn new() -> Self {
        Self::with_duplicate_policy(true)
    }

    /// Registry with an explicit duplicate-name policy.
    ///
    /// With `reject_duplicates == false` two queues may share a name and
    /// lookups resolve to the one created first.
    pub fn with_duplicate_policy(reject_duplicates: bool) -> Self {
        Self {
            queues: Vec::new(),
            reject_duplicates,
        }
    }

    /// Allocate the next queue id
    pub fn create_queue(&mut self, name: &str) -> Result<QueueId, QueueError> {
        if self.queues.len() >= MAX_QUEUES {
            return Err(QueueError::CapacityExceeded { max: MAX_QUEUES });
        }
        if self.reject_duplicates && self.queue_by_name(name).is_some() {
            return Err(QueueError::DuplicateName(name.to_string()));
        }

        // len() < MAX_QUEUES (256) always fits in u16
        let id = QueueId(self.queues.len() as u16);
        self.queues.push(QueueRecord {
            id,
            name: name.to_string(),
            queue: Arc::new(PacketQueue::new()),
        });

        debug!("created queue '{}' ({})", name, id);
        Ok(id)
    }

    /// Look up `name`, creating the queue on a miss
    pub fn get_or_create(&mut self, name: &str) -> Result<QueueId, QueueError> {
        match self.queue_by_name(name) {
            Some(id) => Ok(id),
            None => self.create_queue(name),
        }
    }

    /// First queue with `name`, in creation order
    pub fn queue_by_name(&self, name: &str) -> Option<QueueId> {
        self.queues.iter().find(|q| q.name == name).map(|q| q.id)
    }

    pub fn get(&self, id: QueueId) -> Result<&QueueRecord, QueueError> {
        self.queues
            .get(usize::from(id.0))
            .ok_or(QueueError::UnknownQueue(id))
    }

    /// Shared handle to the queue behind `id`
    pub fn queue(&self, id: QueueId) -> Result<Arc<PacketQueue>, QueueError> {
        self.get(id).map(|r| Arc::clone(&r.queue))
    }

    pub fn register_reader(&self, id: QueueId) -> Result<(), QueueError> {
        self.get(id)?.queue.add_reader();
        Ok(())
    }

    pub fn register_writer(&self, id: QueueId) -> Result<(), QueueError> {
        self.get(id)?.queue.add_writer();
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueRecord> {
        self.queues.iter()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Forget every queue and restart ids at zero.
    ///
    /// Only valid between pipeline runs; `&mut self` guarantees no stage
    /// still borrows the registry.
    pub fn reset_all(&mut self) {
        debug!("resetting {} queues", self.queues.len());
        self.queues.clear();
    }

    /// Per-queue counters, each read under that queue's lock
    pub fn snapshot(&self) -> Vec<QueueInfo> {
        self.queues
            .iter()
            .map(|r| {
                let (readers, writers, len) = r.queue.counts();
                QueueInfo {
                    id: r.id,
                    name: r.name.clone(),
                    readers,
                    writers,
                    len,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_until_capacity() {
        let mut reg = QueueRegistry::new();
        let mut last = None;
        for i in 0..MAX_QUEUES {
            let id = reg.create_queue(&format!("q{}", i)).unwrap();
            if let Some(prev) = last {
                assert!(id > prev);
            }
            last = Some(id);
        }
        assert_eq!(reg.len(), 256);
        assert_eq!(
            reg.create_queue("one-too-many"),
            Err(QueueError::CapacityExceeded { max: 256 })
        );
    }

    #[test]
    fn test_lookup_by_name() {
        let mut reg = QueueRegistry::new();
        let a = reg.create_queue("decode").unwrap();
        let b = reg.create_queue("release").unwrap();
        assert_eq!(reg.queue_by_name("decode"), Some(a));
        assert_eq!(reg.queue_by_name("release"), Some(b));
        assert_eq!(reg.queue_by_name("missing"), None);
    }

    #[test]
    fn test_duplicate_rejected_by_default() {
        let mut reg = QueueRegistry::new();
        reg.create_queue("q").unwrap();
        assert_eq!(reg.create_queue("q"), Err(QueueError::DuplicateName("q".into())));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_allowed_resolves_first() {
        let mut reg = QueueRegistry::with_duplicate_policy(false);
        let first = reg.create_queue("q").unwrap();
        let second = reg.create_queue("q").unwrap();
        assert_ne!(first, second);
        assert_eq!(reg.queue_by_name("q"), Some(first));
    }

    #[test]
    fn test_get_or_create() {
        let mut reg = QueueRegistry::new();
        let a = reg.get_or_create("q").unwrap();
        let b = reg.get_or_create("q").unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_reset_reproduces_ids() {
        let mut reg = QueueRegistry::new();
        let names = ["capture", "decode", "release"];
        let first: Vec<_> = names.iter().map(|n| reg.create_queue(n).unwrap()).collect();

        reg.reset_all();
        assert!(reg.is_empty());
        assert_eq!(reg.queue_by_name("decode"), None);

        let second: Vec<_> = names.iter().map(|n| reg.create_queue(n).unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_id() {
        let reg = QueueRegistry::new();
        assert_eq!(reg.register_reader(QueueId(3)).unwrap_err(), QueueError::UnknownQueue(QueueId(3)));
    }

    #[test]
    fn test_snapshot_counts() {
        let mut reg = QueueRegistry::new();
        let id = reg.create_queue("q").unwrap();
        reg.register_reader(id).unwrap();
        reg.register_writer(id).unwrap();
        reg.register_writer(id).unwrap();

        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "q");
        assert_eq!((snap[0].readers, snap[0].writers, snap[0].len), (1, 2, 0));
    }
}
