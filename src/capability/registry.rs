//! In-process capability registry.
//!
//! Capabilities live in two namespaces (interpreters, simulators). Each entry
//! is either an eager instance or a factory that is invoked on first
//! resolution; the constructed instance is cached so later resolutions of the
//! same id share it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{BuildError, CapabilityKind};

use super::{Capability, ModelInterpreter, Simulator};

type Factory<T> = Box<dyn Fn() -> Result<Arc<T>, String> + Send + Sync>;

enum Registration<T: ?Sized> {
    Instance(Arc<T>),
    Factory(Factory<T>),
}

struct Namespace<T: ?Sized> {
    kind: CapabilityKind,
    entries: RwLock<HashMap<String, Registration<T>>>,
}

fn poisoned(kind: CapabilityKind, id: &str) -> BuildError {
    BuildError::Initialization {
        kind,
        id: id.to_string(),
        reason: "poisoned registry lock".to_string(),
    }
}

impl<T: ?Sized> Namespace<T> {
    fn new(kind: CapabilityKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, id: &str, registration: Registration<T>) -> Result<(), BuildError> {
        let mut entries = self.entries.write().map_err(|_| poisoned(self.kind, id))?;
        if entries.insert(id.to_string(), registration).is_some() {
            tracing::debug!(kind = %self.kind, id, "replaced capability registration");
        }
        Ok(())
    }

    fn resolve(&self, id: &str) -> Result<Arc<T>, BuildError> {
        {
            let entries = self.entries.read().map_err(|_| poisoned(self.kind, id))?;
            match entries.get(id) {
                None => {
                    return Err(BuildError::CapabilityNotFound {
                        kind: self.kind,
                        id: id.to_string(),
                    })
                }
                Some(Registration::Instance(instance)) => return Ok(Arc::clone(instance)),
                Some(Registration::Factory(_)) => {}
            }
        }

        // Factory path: construct under the write lock so concurrent resolvers
        // observe a single instance.
        let mut entries = self.entries.write().map_err(|_| poisoned(self.kind, id))?;
        let instance = match entries.get(id) {
            None => {
                return Err(BuildError::CapabilityNotFound {
                    kind: self.kind,
                    id: id.to_string(),
                })
            }
            Some(Registration::Instance(instance)) => return Ok(Arc::clone(instance)),
            Some(Registration::Factory(factory)) => factory().map_err(|reason| BuildError::Initialization {
                kind: self.kind,
                id: id.to_string(),
                reason,
            })?,
        };
        entries.insert(id.to_string(), Registration::Instance(Arc::clone(&instance)));
        tracing::debug!(kind = %self.kind, id, "constructed capability from factory");
        Ok(instance)
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.read().map(|e| e.contains_key(id)).unwrap_or(false)
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Maps (namespace, id) to a capability instance.
pub struct CapabilityRegistry {
    interpreters: Namespace<dyn ModelInterpreter>,
    simulators: Namespace<dyn Simulator>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("interpreters", &self.interpreters.ids())
            .field("simulators", &self.simulators.ids())
            .finish()
    }
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interpreters: Namespace::new(CapabilityKind::Interpreter),
            simulators: Namespace::new(CapabilityKind::Simulator),
        }
    }

    /// Registers an interpreter instance, replacing any previous registration.
    ///
    /// # Errors
    /// Returns [`BuildError::Initialization`] if the registry lock is poisoned.
    pub fn register_interpreter(&self, id: &str, interpreter: Arc<dyn ModelInterpreter>) -> Result<(), BuildError> {
        self.interpreters.insert(id, Registration::Instance(interpreter))
    }

    /// Registers an interpreter factory, invoked on first resolution.
    ///
    /// # Errors
    /// Returns [`BuildError::Initialization`] if the registry lock is poisoned.
    pub fn register_interpreter_factory<F>(&self, id: &str, factory: F) -> Result<(), BuildError>
    where
        F: Fn() -> Result<Arc<dyn ModelInterpreter>, String> + Send + Sync + 'static,
    {
        self.interpreters.insert(id, Registration::Factory(Box::new(factory)))
    }

    /// Registers a simulator instance, replacing any previous registration.
    ///
    /// # Errors
    /// Returns [`BuildError::Initialization`] if the registry lock is poisoned.
    pub fn register_simulator(&self, id: &str, simulator: Arc<dyn Simulator>) -> Result<(), BuildError> {
        self.simulators.insert(id, Registration::Instance(simulator))
    }

    /// Registers a simulator factory, invoked on first resolution.
    ///
    /// # Errors
    /// Returns [`BuildError::Initialization`] if the registry lock is poisoned.
    pub fn register_simulator_factory<F>(&self, id: &str, factory: F) -> Result<(), BuildError>
    where
        F: Fn() -> Result<Arc<dyn Simulator>, String> + Send + Sync + 'static,
    {
        self.simulators.insert(id, Registration::Factory(Box::new(factory)))
    }

    /// Resolves `id` in the namespace selected by `kind`.
    ///
    /// # Errors
    /// - `CapabilityNotFound` if nothing is registered under `id`
    /// - `Initialization` if a factory fails or the registry lock is poisoned
    pub fn resolve(&self, id: &str, kind: CapabilityKind) -> Result<Capability, BuildError> {
        match kind {
            CapabilityKind::Interpreter => self.resolve_interpreter(id).map(Capability::Interpreter),
            CapabilityKind::Simulator => self.resolve_simulator(id).map(Capability::Simulator),
        }
    }

    /// Resolves an interpreter.
    ///
    /// # Errors
    /// See [`CapabilityRegistry::resolve`].
    pub fn resolve_interpreter(&self, id: &str) -> Result<Arc<dyn ModelInterpreter>, BuildError> {
        self.interpreters.resolve(id)
    }

    /// Resolves a simulator.
    ///
    /// # Errors
    /// See [`CapabilityRegistry::resolve`].
    pub fn resolve_simulator(&self, id: &str) -> Result<Arc<dyn Simulator>, BuildError> {
        self.simulators.resolve(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Interpreter => self.interpreters.contains(id),
            CapabilityKind::Simulator => self.simulators.contains(id),
        }
    }

    /// Registered ids in `kind`, sorted.
    #[must_use]
    pub fn ids(&self, kind: CapabilityKind) -> Vec<String> {
        match kind {
            CapabilityKind::Interpreter => self.interpreters.ids(),
            CapabilityKind::Simulator => self.simulators.ids(),
        }
    }
}
