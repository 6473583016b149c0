//! Simulation stepper.
//!
//! The producer drives every bound simulator once per cycle and appends the
//! resulting models to the session buffers. It stops cooperatively: the run
//! flags are checked before each cycle and before each aspect's step, never
//! in the middle of one.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capability::Simulator;
use crate::id::{AspectId, RunId};
use crate::model::{Model, Snapshot};
use crate::tree::RuntimeTree;

use super::context::{RunFlags, SessionContext};

/// One aspect the producer advances.
#[derive(Clone)]
pub struct ProducerTask {
    pub aspect_id: AspectId,
    pub simulator: Arc<dyn Simulator>,
    /// Loaded model handed to the simulator on initialization.
    pub model: Option<Model>,
}

impl std::fmt::Debug for ProducerTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerTask")
            .field("aspect_id", &self.aspect_id)
            .field("simulator", &self.simulator.name())
            .field("model", &self.model.as_ref().map(|m| &m.id))
            .finish()
    }
}

/// Tasks for every bound simulator, in declaration order, with models taken
/// from the runtime tree where the aspect was attached.
#[must_use]
pub fn tasks_from_bindings(ctx: &SessionContext, tree: Option<&RuntimeTree>) -> Vec<ProducerTask> {
    ctx.bindings()
        .into_iter()
        .filter_map(|binding| {
            let simulator = binding.simulator?;
            let model = tree
                .and_then(|t| t.aspect(binding.entity_id.as_str(), binding.aspect_id.as_str()))
                .and_then(|node| node.model.clone());
            Some(ProducerTask {
                aspect_id: binding.aspect_id,
                simulator,
                model,
            })
        })
        .collect()
}

/// What a producer did before it exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub run_id: Option<RunId>,
    /// Completed cycles.
    pub cycles: u64,
    /// Snapshots appended to the buffers.
    pub snapshots: u64,
    pub step_failures: u64,
}

/// The stepper for one run.
pub struct Producer {
    ctx: Arc<SessionContext>,
    flags: Arc<RunFlags>,
    tasks: Vec<ProducerTask>,
    step_interval: Duration,
}

impl Producer {
    #[must_use]
    pub fn new(ctx: Arc<SessionContext>, flags: Arc<RunFlags>, tasks: Vec<ProducerTask>, step_interval: Duration) -> Self {
        Self {
            ctx,
            flags,
            tasks,
            step_interval,
        }
    }

    /// Runs the producer on a named thread.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<ProducerReport>> {
        thread::Builder::new()
            .name("scenecast-producer".to_string())
            .spawn(move || self.run())
    }

    /// Runs the producer on the calling thread until the run flags clear.
    #[must_use]
    pub fn run(self) -> ProducerReport {
        let run_id = self.flags.run_id();
        let mut report = ProducerReport {
            run_id: Some(run_id),
            ..ProducerReport::default()
        };

        let active: Vec<&ProducerTask> = self
            .tasks
            .iter()
            .filter(|task| match task.simulator.initialize(&task.aspect_id, task.model.as_ref()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(%run_id, aspect = %task.aspect_id, error = %e, "simulator initialization failed; aspect not simulated");
                    false
                }
            })
            .collect();

        if active.is_empty() {
            tracing::info!(%run_id, "no simulators bound; producer idle");
            return report;
        }

        tracing::info!(%run_id, aspects = active.len(), "producer started");

        while self.flags.is_running() {
            for task in &active {
                if !self.flags.cycle_permitted() {
                    break;
                }
                match task.simulator.step(&task.aspect_id) {
                    Ok(models) => {
                        for model in models {
                            self.ctx
                                .buffers()
                                .push(Snapshot::new(task.aspect_id.clone(), report.cycles, model));
                            report.snapshots += 1;
                        }
                    }
                    Err(e) => {
                        report.step_failures += 1;
                        tracing::warn!(%run_id, aspect = %task.aspect_id, error = %e, "simulation step failed");
                    }
                }
            }
            report.cycles += 1;

            if !self.step_interval.is_zero() && self.flags.is_running() {
                thread::sleep(self.step_interval);
            }
        }

        tracing::info!(
            %run_id,
            cycles = report.cycles,
            snapshots = report.snapshots,
            "producer stopped"
        );
        report
    }
}
