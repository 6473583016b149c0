//! Periodic scene publication.
//!
//! Every tick the scheduler walks the known aspects in declaration order, pops
//! the head snapshot of each non-empty model buffer, asks the aspect's
//! interpreter for a scene and, once every aspect has been visited, hands the
//! serialized scenes to the broadcaster.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::broadcast::Broadcaster;
use crate::id::AspectId;
use crate::model::Model;
use crate::session::SessionContext;

/// One serialized scene ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenePayload {
    pub aspect_id: AspectId,
    /// Snapshots consumed to build the scene.
    pub snapshots: usize,
    pub json: String,
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scenes: usize,
    pub snapshots: usize,
    pub failures: usize,
    pub delivered: usize,
}

/// Drains buffers into scenes and publishes them.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    ctx: Arc<SessionContext>,
    broadcaster: Arc<Broadcaster>,
}

impl UpdateScheduler {
    #[must_use]
    pub fn new(ctx: Arc<SessionContext>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { ctx, broadcaster }
    }

    /// Builds this tick's payloads without publishing them.
    ///
    /// An aspect is skipped when it has no interpreter, no buffers, or no
    /// snapshot waiting in any of its buffers. A scene that fails to build
    /// or serialize is logged and skipped; the snapshots it consumed are not
    /// requeued.
    pub fn collect(&self) -> (Vec<ScenePayload>, usize) {
        let mut payloads = Vec::new();
        let mut failures = 0;

        for aspect_id in self.ctx.aspect_ids() {
            let Some(interpreter) = self.ctx.interpreter_for(aspect_id.as_str()) else {
                continue;
            };
            let Some(heads) = self.ctx.buffers().drain_heads(aspect_id.as_str()) else {
                continue;
            };
            if heads.is_empty() {
                continue;
            }

            let snapshots = heads.len();
            let models: Vec<Model> = heads.into_iter().map(|s| s.model).collect();
            let json = interpreter
                .scene_from_models(&models)
                .map_err(|e| e.to_string())
                .and_then(|scene| scene.to_json().map_err(|e| e.to_string()));

            match json {
                Ok(json) => payloads.push(ScenePayload {
                    aspect_id,
                    snapshots,
                    json,
                }),
                Err(reason) => {
                    failures += 1;
                    tracing::warn!(
                        aspect = %aspect_id,
                        interpreter = interpreter.name(),
                        error = %reason,
                        "scene build failed; skipped this tick"
                    );
                }
            }
        }

        (payloads, failures)
    }

    /// Runs one tick: collect, then broadcast every payload.
    pub fn tick(&self) -> TickReport {
        let (payloads, failures) = self.collect();
        let mut report = TickReport {
            scenes: payloads.len(),
            failures,
            ..TickReport::default()
        };
        for payload in &payloads {
            report.snapshots += payload.snapshots;
            report.delivered += self.broadcaster.broadcast(&payload.json).delivered;
        }
        if report.scenes > 0 {
            tracing::trace!(scenes = report.scenes, snapshots = report.snapshots, "tick published");
        }
        report
    }

    /// Ticks on a named thread every `interval` until the handle is stopped
    /// or dropped.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(self, interval: Duration) -> std::io::Result<SchedulerHandle> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let ticks = Arc::new(AtomicU64::new(0));
        let thread_ticks = Arc::clone(&ticks);
        let interval = interval.max(Duration::from_millis(1));

        let join = thread::Builder::new()
            .name("scenecast-scheduler".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                tracing::info!(interval_ms = saturating_millis(interval), "scheduler started");
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            self.tick();
                            thread_ticks.fetch_add(1, Ordering::Relaxed);
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                tracing::info!(ticks = thread_ticks.load(Ordering::Relaxed), "scheduler stopped");
            })?;

        Ok(SchedulerHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
            ticks,
        })
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Owner of a running scheduler thread.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl SchedulerHandle {
    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stops the thread and waits for it.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        // Dropping the sender disconnects the channel, which wakes the select.
        drop(self.shutdown.take());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::broadcast::ChannelConnection;
    use crate::capability::CapabilityRegistry;
    use crate::description::{AspectDecl, EntityDecl, SimulationDescription};
    use crate::model::Snapshot;
    use crate::session::BufferPolicy;
    use crate::test_support::FakeInterpreter;

    fn setup() -> (Arc<SessionContext>, Arc<Broadcaster>) {
        let registry = CapabilityRegistry::new();
        registry
            .register_interpreter("interp-1", Arc::new(FakeInterpreter::new("interp-1")))
            .unwrap();
        let ctx = Arc::new(SessionContext::new(Arc::new(registry), BufferPolicy::Unbounded));
        ctx.bind_aspects(&SimulationDescription::new(vec![EntityDecl::new("E1")
            .with_aspect(AspectDecl::new("A1").with_model("interp-1", "model://x"))
            .with_aspect(AspectDecl::new("A2"))]));
        (ctx, Arc::new(Broadcaster::new()))
    }

    fn push(ctx: &SessionContext, aspect: &str, model: &str, step: u64) {
        ctx.buffers()
            .push(Snapshot::new(AspectId::new(aspect), step, Model::data(model, json!(step))));
    }

    #[test]
    fn one_pop_per_model_per_tick() {
        let (ctx, broadcaster) = setup();
        push(&ctx, "A1", "m1", 0);
        push(&ctx, "A1", "m1", 1);
        push(&ctx, "A1", "m2", 0);

        let scheduler = UpdateScheduler::new(Arc::clone(&ctx), broadcaster);
        let (first, _) = scheduler.collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].snapshots, 2);
        assert_eq!(ctx.buffers().len("A1", "m1"), 1);
        assert_eq!(ctx.buffers().len("A1", "m2"), 0);

        let (second, _) = scheduler.collect();
        assert_eq!(second[0].snapshots, 1);
        assert!(scheduler.collect().0.is_empty());
    }

    #[test]
    fn aspect_without_interpreter_is_not_drained() {
        let (ctx, broadcaster) = setup();
        push(&ctx, "A2", "m1", 0);
        let report = UpdateScheduler::new(Arc::clone(&ctx), broadcaster).tick();
        assert_eq!(report, TickReport::default());
        assert_eq!(ctx.buffers().len("A2", "m1"), 1);
    }

    #[test]
    fn empty_buffers_produce_no_message() {
        let (ctx, broadcaster) = setup();
        let (conn, rx) = ChannelConnection::new(broadcaster.next_connection_id(), 8);
        broadcaster.register(Arc::new(conn));

        let scheduler = UpdateScheduler::new(Arc::clone(&ctx), Arc::clone(&broadcaster));
        assert_eq!(scheduler.tick().scenes, 0);
        assert!(rx.try_recv().is_err());

        push(&ctx, "A1", "m1", 4);
        let report = scheduler.tick();
        assert_eq!(report.scenes, 1);
        assert_eq!(report.delivered, 1);
        let message: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(message["interpreter"], "interp-1");
        assert_eq!(message["models"][0]["value"], 4);
    }

    #[test]
    fn interval_millis_saturate() {
        assert_eq!(saturating_millis(Duration::from_millis(100)), 100);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn spawned_scheduler_ticks_and_stops() {
        let (ctx, broadcaster) = setup();
        let (conn, rx) = ChannelConnection::new(broadcaster.next_connection_id(), 8);
        broadcaster.register(Arc::new(conn));
        push(&ctx, "A1", "m1", 0);

        let handle = UpdateScheduler::new(Arc::clone(&ctx), broadcaster)
            .spawn(Duration::from_millis(5))
            .unwrap();
        let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(message.contains("interp-1"));
        handle.stop();
        assert_eq!(ctx.buffers().total_len(), 0);
    }
}
