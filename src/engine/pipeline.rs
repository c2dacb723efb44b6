//! Pipeline construction
//!
//! Turns the `[[stage]]` description into a queue registry plus one
//! [`StageBinding`] per stage. Queues are created on first mention and every
//! stage registers itself as reader of its input and writer of its outputs,
//! so a typo in a queue name shows up as a queue without reader or writer
//! when the topology is validated.
//!
//! Stages may be declared in any order. Threads are spawned, and later
//! stopped, upstream first: every writer of a queue comes before its readers.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, DecodeConfig, StageConfig};
use crate::core::PacketIds;
use crate::decode::{DecodeStats, DecodeThreadVars};
use crate::error::{ConfigError, Result, StartupError, TopologyError};
use crate::queue::{validate_topology, PacketQueue, QueueId, QueueRegistry};

use super::capture::PacketCapture;
use super::workers::{self, Outputs};
use super::{EngineCounters, ReleaseSink, RunningPipeline, StageHandle};

/// What a stage thread does with the packets it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Reads a capture source, writes root packets
    Capture,
    /// Decodes packets, writes derived packets ahead of their parent
    Decode,
    /// Moves packets from its input to its outputs
    Forward,
    /// Terminal stage: finishes packets
    Release,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Capture => "capture",
            StageKind::Decode => "decode",
            StageKind::Forward => "forward",
            StageKind::Release => "release",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage bound to its queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBinding {
    pub name: String,
    pub kind: StageKind,
    pub input: Option<QueueId>,
    pub outputs: Vec<QueueId>,
}

/// Builds a [`Pipeline`] from configuration
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    config: Config,
    release_notify: Option<Sender<u64>>,
}

impl PipelineBuilder {
    pub fn from_config(config: &Config) -> Self {
        Self {
            config: config.clone(),
            release_notify: None,
        }
    }

    /// Receive the id of every root packet once it is released
    pub fn release_notify(mut self, tx: Sender<u64>) -> Self {
        self.release_notify = Some(tx);
        self
    }

    /// Validate the stage description and create the queues
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        let mut registry = QueueRegistry::with_duplicate_policy(self.config.queues.reject_duplicate_names);
        let mut bindings = Vec::with_capacity(self.config.stages.len());

        for stage in &self.config.stages {
            bindings.push(bind_stage(&mut registry, stage)?);
        }
        let order = upstream_order(&bindings)?;

        debug!(stages = bindings.len(), queues = registry.len(), "pipeline built");

        Ok(Pipeline {
            decode: self.config.decode,
            registry,
            bindings,
            order,
            release_notify: self.release_notify,
        })
    }
}

fn bind_stage(registry: &mut QueueRegistry, stage: &StageConfig) -> Result<StageBinding> {
    let input = match &stage.input {
        Some(name) => {
            let id = registry.get_or_create(name)?;
            registry.register_reader(id)?;
            Some(id)
        }
        None => None,
    };

    let mut outputs = Vec::with_capacity(stage.outputs.len());
    for name in &stage.outputs {
        let id = registry.get_or_create(name)?;
        registry.register_writer(id)?;
        outputs.push(id);
    }

    Ok(StageBinding {
        name: stage.name.clone(),
        kind: stage.kind,
        input,
        outputs,
    })
}

/// Stage indices ordered so that every writer of a queue precedes its
/// readers; ties keep declaration order.
fn upstream_order(bindings: &[StageBinding]) -> std::result::Result<Vec<usize>, ConfigError> {
    let n = bindings.len();
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut pending_writers = vec![0usize; n];

    for (from, writer) in bindings.iter().enumerate() {
        for (to, reader) in bindings.iter().enumerate() {
            if reader.input.is_some_and(|q| writer.outputs.contains(&q)) {
                downstream[from].push(to);
                pending_writers[to] += 1;
            }
        }
    }

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let Some(next) = (0..n).find(|&i| !placed[i] && pending_writers[i] == 0) else {
            let stuck = (0..n)
                .filter(|&i| !placed[i])
                .map(|i| bindings[i].name.clone())
                .collect();
            return Err(ConfigError::StageCycle(stuck));
        };
        placed[next] = true;
        order.push(next);
        for &to in &downstream[next] {
            pending_writers[to] -= 1;
        }
    }

    Ok(order)
}

/// A constructed, not yet running, pipeline
#[derive(Debug)]
pub struct Pipeline {
    decode: DecodeConfig,
    registry: QueueRegistry,
    bindings: Vec<StageBinding>,
    /// Spawn and shutdown order, upstream first
    order: Vec<usize>,
    release_notify: Option<Sender<u64>>,
}

impl Pipeline {
    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    pub fn bindings(&self) -> &[StageBinding] {
        &self.bindings
    }

    /// Stage names in the order they are started and stopped
    pub fn stage_order(&self) -> Vec<&str> {
        self.order.iter().map(|&idx| self.bindings[idx].name.as_str()).collect()
    }

    /// Check that every queue has at least one reader and one writer
    pub fn validate(&self) -> std::result::Result<(), TopologyError> {
        validate_topology(&self.registry)
    }

    /// Validate the topology and spawn one thread per stage.
    ///
    /// `source` feeds the capture stage.
    pub fn start(self, source: Box<dyn PacketCapture>) -> Result<RunningPipeline> {
        self.validate()?;
        info!("Starting pipeline...");

        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(EngineCounters::default());
        let decode_stats = DecodeStats::shared();
        let ids = PacketIds::shared();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let releases = ReleaseSink::new(release_rx, self.release_notify.clone());

        let mut source = Some(source);
        let mut handles: Vec<StageHandle> = Vec::with_capacity(self.bindings.len());

        for binding in self.order.iter().map(|&idx| &self.bindings[idx]) {
            let input = binding.input.map(|id| self.registry.queue(id)).transpose()?;
            let outputs = Outputs::new(
                binding
                    .outputs
                    .iter()
                    .map(|id| self.registry.queue(*id))
                    .collect::<std::result::Result<Vec<Arc<PacketQueue>>, _>>()?,
            );

            let name = binding.name.clone();
            let spawned = match binding.kind {
                StageKind::Capture => {
                    let source = source.take();
                    let ids = Arc::clone(&ids);
                    let release_tx = release_tx.clone();
                    let stop = Arc::clone(&stop);
                    let counters = Arc::clone(&counters);
                    spawn(&name, move || {
                        if let Some(source) = source {
                            workers::run_capture(source, outputs, ids, release_tx, stop, counters);
                        }
                    })
                }
                StageKind::Decode => {
                    let tv = DecodeThreadVars::new(self.decode.clone(), Arc::clone(&decode_stats), Arc::clone(&ids));
                    let input = input.clone();
                    let counters = Arc::clone(&counters);
                    spawn(&name, move || {
                        if let Some(input) = input {
                            workers::run_decode(&input, outputs, tv, counters);
                        }
                    })
                }
                StageKind::Forward => {
                    let input = input.clone();
                    let counters = Arc::clone(&counters);
                    spawn(&name, move || {
                        if let Some(input) = input {
                            workers::run_forward(&input, outputs, counters);
                        }
                    })
                }
                StageKind::Release => {
                    let input = input.clone();
                    let releases = releases.clone();
                    let counters = Arc::clone(&counters);
                    spawn(&name, move || {
                        if let Some(input) = input {
                            workers::run_release(&input, releases, counters);
                        }
                    })
                }
            };

            match spawned {
                Ok(thread) => handles.push(StageHandle {
                    name,
                    kind: binding.kind,
                    input,
                    thread: Some(thread),
                }),
                Err(err) => {
                    // stop whatever already runs before reporting
                    drop(RunningPipeline::new(
                        QueueRegistry::new(),
                        handles,
                        stop,
                        counters,
                        decode_stats,
                        releases,
                    ));
                    return Err(StartupError::Spawn { stage: name, source: err });
                }
            }
        }

        info!(stages = handles.len(), queues = self.registry.len(), "Pipeline started");
        Ok(RunningPipeline::new(
            self.registry,
            handles,
            stop,
            counters,
            decode_stats,
            releases,
        ))
    }
}

fn spawn<F>(name: &str, f: F) -> std::io::Result<std::thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(f)
}
