//! Pluggable capabilities: model interpreters and simulators.
//!
//! Capabilities are opaque to the session engine. They are registered in a
//! [`CapabilityRegistry`] under a string id ("discoverable id") and resolved
//! when a session starts.

use std::fmt;
use std::sync::Arc;

use crate::error::{CapabilityKind, InterpreterError, SimulatorError};
use crate::id::AspectId;
use crate::model::{Model, Scene};
use crate::resource::ResourceLocator;
use crate::tree::AspectNode;

/// Built-in interpreter for recorded simulations.
pub mod recording;
/// Registration table and resolution.
pub mod registry;

pub use recording::{JsonFileRecordingReader, RecordingReader, RecordingsInterpreter, RECORDING_ID_PREFIX};
pub use registry::CapabilityRegistry;

/// Reads models and turns them into scenes.
pub trait ModelInterpreter: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Pre-populates the runtime sub-structure of an aspect node.
    ///
    /// Returns false if the interpreter has nothing to contribute.
    fn populate_runtime_tree(&self, node: &mut AspectNode) -> bool;

    /// Loads a model from `locator`, with optional auxiliary resources.
    ///
    /// # Errors
    /// Returns an [`InterpreterError`] if the resource cannot be decoded.
    fn load(
        &self,
        locator: &ResourceLocator,
        auxiliary: &[ResourceLocator],
        instance_path: &str,
    ) -> Result<Model, InterpreterError>;

    /// Builds the client-facing scene for a set of model snapshots.
    ///
    /// # Errors
    /// Returns an [`InterpreterError`] if the models cannot be rendered.
    fn scene_from_models(&self, models: &[Model]) -> Result<Scene, InterpreterError>;
}

/// Advances the state of an aspect's models.
pub trait Simulator: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Prepares the simulator for `aspect`, given its loaded model if any.
    ///
    /// # Errors
    /// Returns a [`SimulatorError`] if the simulator cannot run this aspect.
    fn initialize(&self, aspect: &AspectId, model: Option<&Model>) -> Result<(), SimulatorError>;

    /// Computes one step and returns the new state of every model it advanced.
    ///
    /// Each returned model's id is its buffer key under `aspect`.
    ///
    /// # Errors
    /// Returns a [`SimulatorError`] if the step fails.
    fn step(&self, aspect: &AspectId) -> Result<Vec<Model>, SimulatorError>;
}

/// A resolved capability.
#[derive(Clone)]
pub enum Capability {
    Interpreter(Arc<dyn ModelInterpreter>),
    Simulator(Arc<dyn Simulator>),
}

impl Capability {
    #[must_use]
    pub const fn kind(&self) -> CapabilityKind {
        match self {
            Self::Interpreter(_) => CapabilityKind::Interpreter,
            Self::Simulator(_) => CapabilityKind::Simulator,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Interpreter(i) => i.name(),
            Self::Simulator(s) => s.name(),
        }
    }

    #[must_use]
    pub fn into_interpreter(self) -> Option<Arc<dyn ModelInterpreter>> {
        match self {
            Self::Interpreter(i) => Some(i),
            Self::Simulator(_) => None,
        }
    }

    #[must_use]
    pub fn into_simulator(self) -> Option<Arc<dyn Simulator>> {
        match self {
            Self::Simulator(s) => Some(s),
            Self::Interpreter(_) => None,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}
