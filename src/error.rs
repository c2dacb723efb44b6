use thiserror::Error;

use crate::queue::QueueId;
use crate::queue::topology::QueueFault;

/// Errors raised while building the queue registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue pool exhausted: at most {max} queues may be created")]
    CapacityExceeded { max: usize },

    #[error("queue name already registered: {0}")]
    DuplicateName(String),

    #[error("unknown queue id: {0}")]
    UnknownQueue(QueueId),
}

/// Pipeline topology is not well formed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("{} queue(s) failed topology validation", .0.len())]
    InvalidQueues(Vec<QueueFault>),
}

impl TopologyError {
    pub fn faults(&self) -> &[QueueFault] {
        match self {
            TopologyError::InvalidQueues(faults) => faults,
        }
    }
}

/// Signature keyword errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectError {
    #[error("unknown keyword: {0}")]
    UnknownKeyword(String),

    #[error("invalid {keyword} value: {reason}")]
    InvalidValue { keyword: &'static str, reason: String },

    #[error("rule contains conflicting keywords: {keyword} requires {required}, signature uses {current}")]
    ConflictingKeywords {
        keyword: &'static str,
        required: &'static str,
        current: &'static str,
    },
}

/// Structural problems in the pipeline description
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("stage #{0} has an empty name")]
    EmptyStageName(usize),

    #[error("stage '{0}' of kind {1} must not read from a queue")]
    UnexpectedInput(String, &'static str),

    #[error("stage '{0}' of kind {1} needs an input queue")]
    MissingInput(String, &'static str),

    #[error("stage '{0}' of kind {1} must not write to a queue")]
    UnexpectedOutputs(String, &'static str),

    #[error("stage '{0}' of kind {1} needs at least one output queue")]
    MissingOutputs(String, &'static str),

    #[error("pipeline has no capture stage")]
    NoCapture,

    #[error("pipeline has more than one capture stage")]
    MultipleCaptures,

    #[error("max_tunnel_depth must be at least 1")]
    ZeroTunnelDepth,

    #[error("stages feed each other in a cycle: {}", .0.join(", "))]
    StageCycle(Vec<String>),
}

/// Fatal start-up errors. The binary maps any of these to a non-zero exit.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("queue construction failed: {0}")]
    Queue(#[from] QueueError),

    #[error("pipeline topology invalid: {0}")]
    Topology(#[from] TopologyError),

    #[error("failed to spawn stage thread '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StartupError>;
