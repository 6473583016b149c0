//! Session control surface.
//!
//! A [`SimulationSession`] interprets control messages, owns the
//! `Idle -> Running -> Idle` state machine and the worker threads, and
//! launches the update scheduler the first time the session starts.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::callback::{SimulationCallback, TracingCallback};
use crate::capability::CapabilityRegistry;
use crate::config::SessionConfig;
use crate::description::DescriptionSource;
use crate::error::{SessionError, SessionResult};
use crate::id::RunId;
use crate::scheduler::{SchedulerHandle, UpdateScheduler};
use crate::tree::{RuntimeTree, RuntimeTreeBuilder};

use super::context::{SessionContext, SessionState};
use super::producer::{tasks_from_bindings, Producer, ProducerReport};

/// A parsed control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    /// Anything else; accepted and ignored.
    Other,
}

impl ControlCommand {
    /// Parses a control payload. Surrounding whitespace is ignored; matching is
    /// exact otherwise.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            _ => Self::Other,
        }
    }
}

/// What a control message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Started(RunId),
    AlreadyRunning,
    Stopped(RunId),
    NotRunning,
    Ignored,
}

/// One logical simulation session.
pub struct SimulationSession {
    config: SessionConfig,
    ctx: Arc<SessionContext>,
    source: Arc<dyn DescriptionSource>,
    callback: Arc<dyn SimulationCallback>,
    broadcaster: Arc<Broadcaster>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    producer: Mutex<Option<JoinHandle<ProducerReport>>>,
    // Serializes start/stop so two control messages never interleave.
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for SimulationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationSession")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

impl SimulationSession {
    /// Creates an idle session. Errors are logged through `tracing` and
    /// scenes go to a fresh broadcaster until either is replaced.
    #[must_use]
    pub fn new(config: SessionConfig, registry: Arc<CapabilityRegistry>, source: Arc<dyn DescriptionSource>) -> Self {
        let ctx = Arc::new(SessionContext::new(registry, config.buffer_policy()));
        Self {
            config,
            ctx,
            source,
            callback: Arc::new(TracingCallback),
            broadcaster: Arc::new(Broadcaster::new()),
            scheduler: Mutex::new(None),
            producer: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn SimulationCallback>) -> Self {
        self.callback = callback;
        self
    }

    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    #[must_use]
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.ctx.state()
    }

    /// Tree built by the most recent start.
    #[must_use]
    pub fn runtime_tree(&self) -> Option<Arc<RuntimeTree>> {
        self.ctx.runtime_tree()
    }

    /// Whether the update scheduler has been launched.
    #[must_use]
    pub fn scheduler_running(&self) -> bool {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Dispatches one control message.
    ///
    /// # Errors
    /// Returns the error of a failed start; see [`Self::start`].
    pub fn handle_message(&self, text: &str) -> SessionResult<ControlOutcome> {
        match ControlCommand::parse(text) {
            ControlCommand::Start => self.start(),
            ControlCommand::Stop => Ok(self.stop()),
            ControlCommand::Other => {
                tracing::debug!(message = text.trim(), "control message ignored");
                Ok(ControlOutcome::Ignored)
            }
        }
    }

    /// Moves the session from Idle to Running.
    ///
    /// Loads the description, resets the context, records bindings, builds
    /// the runtime tree, launches the producer and, on first use, the
    /// scheduler. Per-aspect build failures go to the callback and do not
    /// fail the start.
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] if the description cannot be loaded,
    /// or [`SessionError::Internal`] if a worker thread cannot be spawned.
    pub fn start(&self) -> SessionResult<ControlOutcome> {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        if self.ctx.state() == SessionState::Running {
            tracing::info!("start ignored; session already running");
            return Ok(ControlOutcome::AlreadyRunning);
        }

        let description = self.source.load()?;

        // The producer of the previous run has been told to stop; wait for it
        // so it cannot write into the buffers about to be reset.
        self.join_producer();

        self.ctx.reset();
        let summary = self.ctx.bind_aspects(&description);

        let tree = RuntimeTreeBuilder::new(Arc::clone(&self.callback)).build(&description, &self.ctx);
        let tasks = tasks_from_bindings(&self.ctx, Some(&tree));
        self.ctx.set_runtime_tree(tree);

        if self.config.producer_outpaces_scheduler() {
            tracing::warn!(
                step_ms = self.config.step_interval_ms,
                tick_ms = self.config.tick_interval_ms,
                "producer steps faster than the scheduler ticks; bounded buffers will evict snapshots"
            );
        }

        let flags = self.ctx.begin_run();
        let run_id = flags.run_id();
        let producer = Producer::new(Arc::clone(&self.ctx), flags, tasks, self.config.step_interval())
            .spawn()
            .map_err(|e| {
                self.ctx.end_run();
                SessionError::internal(format!("failed to spawn producer: {e}"))
            })?;
        *self.producer.lock().unwrap_or_else(PoisonError::into_inner) = Some(producer);

        self.ensure_scheduler()?;

        tracing::info!(
            %run_id,
            aspects = summary.aspects,
            interpreters = summary.interpreters,
            simulators = summary.simulators,
            "session started"
        );
        Ok(ControlOutcome::Started(run_id))
    }

    /// Moves the session from Running to Idle.
    ///
    /// Only clears the run flags; the producer finishes its current step and
    /// exits at its next checkpoint. The scheduler keeps ticking and drains
    /// whatever is left in the buffers.
    pub fn stop(&self) -> ControlOutcome {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match self.ctx.end_run() {
            Some(run_id) => {
                tracing::info!(%run_id, "session stopped");
                ControlOutcome::Stopped(run_id)
            }
            None => {
                tracing::info!("stop ignored; session not running");
                ControlOutcome::NotRunning
            }
        }
    }

    /// Waits for the most recent producer to exit and returns its report.
    ///
    /// Blocks for as long as the run is active; call after [`Self::stop`].
    pub fn join_producer(&self) -> Option<ProducerReport> {
        let handle = self.producer.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                tracing::error!("producer thread panicked");
                None
            }
        }
    }

    /// Stops the run, the producer and the scheduler.
    pub fn shutdown(&self) {
        self.stop();
        self.join_producer();
        let scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
    }

    fn ensure_scheduler(&self) -> SessionResult<()> {
        let mut scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        if scheduler.is_none() {
            let handle = UpdateScheduler::new(Arc::clone(&self.ctx), Arc::clone(&self.broadcaster))
                .spawn(self.config.tick_interval())
                .map_err(|e| SessionError::internal(format!("failed to spawn scheduler: {e}")))?;
            *scheduler = Some(handle);
        }
        Ok(())
    }
}

impl Drop for SimulationSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
