//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::json;

use crate::capability::{ModelInterpreter, Simulator};
use crate::error::{InterpreterError, SimulatorError};
use crate::id::AspectId;
use crate::model::{Model, Scene};
use crate::resource::ResourceLocator;
use crate::tree::{AspectNode, SubTreeKind};

/// Loads deterministic models; any locator containing "fail" fails to load.
pub struct FakeInterpreter {
    name: String,
}

impl FakeInterpreter {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl ModelInterpreter for FakeInterpreter {
    fn name(&self) -> &str {
        &self.name
    }

    fn populate_runtime_tree(&self, node: &mut AspectNode) -> bool {
        node.subtree_mut(SubTreeKind::Model)
            .properties
            .insert("interpreter".to_string(), json!(self.name));
        true
    }

    fn load(&self, locator: &ResourceLocator, auxiliary: &[ResourceLocator], instance_path: &str) -> Result<Model, InterpreterError> {
        if locator.as_str().contains("fail") {
            return Err(InterpreterError::LoadFailed {
                locator: locator.to_string(),
                reason: "fake failure".to_string(),
            });
        }
        let aux: Vec<&str> = auxiliary.iter().map(ResourceLocator::as_str).collect();
        Ok(Model::data(instance_path, json!({ "url": locator.as_str(), "aux": aux })).with_instance_path(instance_path))
    }

    fn scene_from_models(&self, models: &[Model]) -> Result<Scene, InterpreterError> {
        let entries: Vec<serde_json::Value> = models
            .iter()
            .map(|m| json!({ "id": m.id.as_str(), "value": m.as_data().cloned() }))
            .collect();
        Ok(Scene::new(json!({ "interpreter": self.name, "models": entries })))
    }
}

/// Emits one data model per configured id on every step, valued by a
/// per-aspect step counter.
pub struct FakeSimulator {
    name: String,
    model_ids: Vec<String>,
    counters: Mutex<HashMap<AspectId, u64>>,
    steps: AtomicU64,
}

impl FakeSimulator {
    pub fn new(name: &str) -> Self {
        Self::with_models(name, &["m1"])
    }

    pub fn with_models(name: &str, model_ids: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            model_ids: model_ids.iter().map(|s| (*s).to_string()).collect(),
            counters: Mutex::new(HashMap::new()),
            steps: AtomicU64::new(0),
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }
}

impl Simulator for FakeSimulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, _aspect: &AspectId, _model: Option<&Model>) -> Result<(), SimulatorError> {
        Ok(())
    }

    fn step(&self, aspect: &AspectId) -> Result<Vec<Model>, SimulatorError> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        let mut counters = self.counters.lock().unwrap();
        let n = counters.entry(aspect.clone()).or_insert(0);
        *n += 1;
        let value = *n;
        Ok(self
            .model_ids
            .iter()
            .map(|id| Model::data(id.as_str(), json!(value)))
            .collect())
    }
}
