//! Session-scoped shared state.
//!
//! The context is the one object both the producer and the scheduler touch:
//! known aspects, per-aspect capability bindings, snapshot buffers, the
//! runtime tree and the cooperative run flags of the current run.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;

use crate::capability::{CapabilityRegistry, ModelInterpreter, Simulator};
use crate::description::SimulationDescription;
use crate::id::{AspectId, EntityId, RunId};
use crate::tree::RuntimeTree;

use super::buffer::{BufferPolicy, ModelBuffers};

/// Run state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
}

/// Cooperative stop signals for one run.
///
/// `run` keeps the producer looping; `cycle` permits work inside the current
/// cycle. Both are only ever cleared, never forced: the producer observes them
/// at its next checkpoint.
#[derive(Debug)]
pub struct RunFlags {
    run_id: RunId,
    run: AtomicBool,
    cycle: AtomicBool,
}

impl RunFlags {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            run: AtomicBool::new(true),
            cycle: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    /// True while work inside the current cycle may continue.
    #[must_use]
    pub fn cycle_permitted(&self) -> bool {
        self.is_running() && self.cycle.load(Ordering::Acquire)
    }

    /// Clears both flags.
    pub fn stop(&self) {
        self.run.store(false, Ordering::Release);
        self.cycle.store(false, Ordering::Release);
    }
}

impl Default for RunFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Capabilities bound to one aspect at session start.
#[derive(Clone)]
pub struct AspectBinding {
    pub aspect_id: AspectId,
    pub entity_id: EntityId,
    pub interpreter: Option<Arc<dyn ModelInterpreter>>,
    pub simulator: Option<Arc<dyn Simulator>>,
    pub model_url: Option<String>,
}

impl fmt::Debug for AspectBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectBinding")
            .field("aspect_id", &self.aspect_id)
            .field("entity_id", &self.entity_id)
            .field("interpreter", &self.interpreter.as_ref().map(|i| i.name().to_string()))
            .field("simulator", &self.simulator.as_ref().map(|s| s.name().to_string()))
            .field("model_url", &self.model_url)
            .finish()
    }
}

/// Counts from recording bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingSummary {
    pub aspects: usize,
    pub interpreters: usize,
    pub simulators: usize,
}

#[derive(Debug, Default)]
struct Bindings {
    order: Vec<AspectId>,
    by_aspect: HashMap<AspectId, AspectBinding>,
}

/// Shared state of one logical session.
#[derive(Debug)]
pub struct SessionContext {
    registry: Arc<CapabilityRegistry>,
    bindings: RwLock<Bindings>,
    buffers: ModelBuffers,
    tree: RwLock<Option<Arc<RuntimeTree>>>,
    current_run: Mutex<Option<Arc<RunFlags>>>,
}

impl SessionContext {
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>, policy: BufferPolicy) -> Self {
        Self {
            registry,
            bindings: RwLock::new(Bindings::default()),
            buffers: ModelBuffers::new(policy),
            tree: RwLock::new(None),
            current_run: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn buffers(&self) -> &ModelBuffers {
        &self.buffers
    }

    /// Resolves and records the capabilities of every declared aspect.
    ///
    /// Unresolvable capabilities leave the binding empty; they are logged
    /// here and reported by the tree build.
    pub fn bind_aspects(&self, description: &SimulationDescription) -> BindingSummary {
        let mut summary = BindingSummary::default();
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);

        for (entity, aspect) in description.aspects() {
            let interpreter = aspect.interpreter.as_deref().and_then(|id| {
                self.registry
                    .resolve_interpreter(id)
                    .map_err(|e| tracing::warn!(aspect = %aspect.id, error = %e, "interpreter not bound"))
                    .ok()
            });
            let simulator = aspect.simulator.as_deref().and_then(|id| {
                self.registry
                    .resolve_simulator(id)
                    .map_err(|e| tracing::warn!(aspect = %aspect.id, error = %e, "simulator not bound"))
                    .ok()
            });

            summary.aspects += 1;
            summary.interpreters += usize::from(interpreter.is_some());
            summary.simulators += usize::from(simulator.is_some());

            let aspect_id = AspectId::new(aspect.id.as_str());
            let binding = AspectBinding {
                aspect_id: aspect_id.clone(),
                entity_id: EntityId::new(entity.id.as_str()),
                interpreter,
                simulator,
                model_url: aspect.model_url.clone(),
            };
            if bindings.by_aspect.insert(aspect_id.clone(), binding).is_none() {
                bindings.order.push(aspect_id);
            }
        }

        tracing::debug!(
            aspects = summary.aspects,
            interpreters = summary.interpreters,
            simulators = summary.simulators,
            "aspect bindings recorded"
        );
        summary
    }

    /// Known aspect ids, in declaration order.
    #[must_use]
    pub fn aspect_ids(&self) -> Vec<AspectId> {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner).order.clone()
    }

    #[must_use]
    pub fn binding(&self, aspect: &str) -> Option<AspectBinding> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_aspect
            .get(aspect)
            .cloned()
    }

    /// Every binding, in declaration order.
    #[must_use]
    pub fn bindings(&self) -> Vec<AspectBinding> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        bindings
            .order
            .iter()
            .filter_map(|id| bindings.by_aspect.get(id).cloned())
            .collect()
    }

    #[must_use]
    pub fn interpreter_for(&self, aspect: &str) -> Option<Arc<dyn ModelInterpreter>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_aspect
            .get(aspect)
            .and_then(|b| b.interpreter.clone())
    }

    #[must_use]
    pub fn simulator_for(&self, aspect: &str) -> Option<Arc<dyn Simulator>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_aspect
            .get(aspect)
            .and_then(|b| b.simulator.clone())
    }

    #[must_use]
    pub fn model_url_for(&self, aspect: &str) -> Option<String> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_aspect
            .get(aspect)
            .and_then(|b| b.model_url.clone())
    }

    pub fn set_runtime_tree(&self, tree: RuntimeTree) {
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(tree));
    }

    #[must_use]
    pub fn runtime_tree(&self) -> Option<Arc<RuntimeTree>> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Installs fresh flags for a new run and returns them.
    ///
    /// Flags of a previous run are stopped first, so a late producer from
    /// that run cannot keep going.
    pub fn begin_run(&self) -> Arc<RunFlags> {
        let flags = Arc::new(RunFlags::new());
        let mut current = self.current_run.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(Arc::clone(&flags)) {
            previous.stop();
        }
        flags
    }

    /// Stops the current run, if any, and returns its id.
    pub fn end_run(&self) -> Option<RunId> {
        let flags = self.current_run.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        flags.stop();
        Some(flags.run_id())
    }

    #[must_use]
    pub fn current_run(&self) -> Option<Arc<RunFlags>> {
        self.current_run.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.current_run() {
            Some(flags) if flags.is_running() => SessionState::Running,
            _ => SessionState::Idle,
        }
    }

    /// Drops bindings, buffers and the runtime tree. The run flags are left
    /// alone.
    pub fn reset(&self) {
        *self.bindings.write().unwrap_or_else(PoisonError::into_inner) = Bindings::default();
        self.buffers.clear();
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
