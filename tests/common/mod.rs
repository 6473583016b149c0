#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::json;

use scenecast::tree::{AspectNode, SubTreeKind};
use scenecast::{
    AspectId, InterpreterError, Model, ModelInterpreter, ResourceLocator, Scene, Simulator, SimulatorError,
};

/// Deterministic interpreter: the loaded model is a pure function of its
/// inputs, and scenes list the ids and values of the models given.
pub struct EchoInterpreter {
    name: String,
}

impl EchoInterpreter {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl ModelInterpreter for EchoInterpreter {
    fn name(&self) -> &str {
        &self.name
    }

    fn populate_runtime_tree(&self, node: &mut AspectNode) -> bool {
        node.subtree_mut(SubTreeKind::Visualization)
            .properties
            .insert("renderer".to_string(), json!(self.name));
        true
    }

    fn load(&self, locator: &ResourceLocator, auxiliary: &[ResourceLocator], instance_path: &str) -> Result<Model, InterpreterError> {
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

/// Emits one model per configured id per step; each value is the per-aspect
/// step number, starting at 1.
pub struct CountingSimulator {
    model_ids: Vec<String>,
    counters: Mutex<HashMap<AspectId, u64>>,
    steps: AtomicU64,
}

impl CountingSimulator {
    pub fn new(model_ids: &[&str]) -> Self {
        Self {
            model_ids: model_ids.iter().map(|s| (*s).to_string()).collect(),
            counters: Mutex::new(HashMap::new()),
            steps: AtomicU64::new(0),
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }
}

impl Simulator for CountingSimulator {
    fn name(&self) -> &str {
        "counting"
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
        Ok(self.model_ids.iter().map(|id| Model::data(id.as_str(), json!(value))).collect())
    }
}
