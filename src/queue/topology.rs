//! Start-up check of the pipeline graph
//!
//! Every queue must have at least one reader and one writer before any
//! stage thread runs; a queue without a reader fills forever and one
//! without a writer starves its consumer. All faults are collected so the
//! operator sees the full list at once.

use serde::Serialize;
use tracing::error;

use crate::error::TopologyError;

use super::registry::QueueRegistry;
use super::QueueId;

/// A queue that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueFault {
    pub id: QueueId,
    pub name: String,
    pub missing_reader: bool,
    pub missing_writer: bool,
}

impl QueueFault {
    /// Human-readable list of the missing roles
    pub fn missing_roles(&self) -> &'static str {
        match (self.missing_reader, self.missing_writer) {
            (true, true) => "reader and writer",
            (true, false) => "reader",
            (false, true) => "writer",
            (false, false) => "nothing",
        }
    }
}

impl std::fmt::Display for QueueFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue \"{}\" ({}) doesn't have a {}", self.name, self.id, self.missing_roles())
    }
}

/// Validate that every registered queue has a reader and a writer
pub fn validate_topology(registry: &QueueRegistry) -> Result<(), TopologyError> {
    let faults: Vec<QueueFault> = registry
        .iter()
        .filter_map(|record| {
            let (readers, writers, _) = record.queue().counts();
            if readers > 0 && writers > 0 {
                return None;
            }
            let fault = QueueFault {
                id: record.id(),
                name: record.name().to_string(),
                missing_reader: readers == 0,
                missing_writer: writers == 0,
            };
            error!("{}", fault);
            Some(fault)
        })
        .collect();

    if faults.is_empty() {
        Ok(())
    } else {
        Err(TopologyError::InvalidQueues(faults))
    }
}
