//! Models, scenes and snapshots.
//!
//! A [`Model`] is opaque to the session engine: interpreters produce it,
//! simulators advance it, and only the interpreter knows how to turn a set of
//! models into a client-facing [`Scene`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AspectId, ModelId};

/// A point in 3-D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Payload of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ModelContent {
    /// Interpreter-defined state.
    Data(serde_json::Value),
    /// A wrapper around other models, in insertion order.
    Wrapper(Vec<Model>),
}

/// An interpreter-produced representation of an aspect's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_path: Option<String>,
    pub content: ModelContent,
}

impl Model {
    /// Creates a data model.
    #[must_use]
    pub fn data(id: impl Into<ModelId>, value: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            instance_path: None,
            content: ModelContent::Data(value),
        }
    }

    /// Creates an empty wrapper model.
    #[must_use]
    pub fn wrapper(id: impl Into<ModelId>) -> Self {
        Self {
            id: id.into(),
            instance_path: None,
            content: ModelContent::Wrapper(Vec::new()),
        }
    }

    /// Sets the instance path this model belongs to.
    #[must_use]
    pub fn with_instance_path(mut self, path: impl Into<String>) -> Self {
        self.instance_path = Some(path.into());
        self
    }

    /// Appends `model` to a wrapper. Returns false if `self` is not a wrapper.
    pub fn wrap_model(&mut self, model: Model) -> bool {
        match &mut self.content {
            ModelContent::Wrapper(children) => {
                children.push(model);
                true
            }
            ModelContent::Data(_) => false,
        }
    }

    /// Looks up a wrapped model by id.
    #[must_use]
    pub fn wrapped(&self, id: &str) -> Option<&Model> {
        match &self.content {
            ModelContent::Wrapper(children) => children.iter().find(|m| m.id.as_str() == id),
            ModelContent::Data(_) => None,
        }
    }

    /// Returns the data payload, if this is a data model.
    #[must_use]
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match &self.content {
            ModelContent::Data(v) => Some(v),
            ModelContent::Wrapper(_) => None,
        }
    }
}

/// Client-facing view of one or more models for one aspect and tick.
///
/// The JSON shape is owned entirely by the interpreter that built it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scene(serde_json::Value);

impl Scene {
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Serializes the scene to its wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

/// A timestamped model placed into a buffer by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub aspect_id: AspectId,
    /// Producer cycle that computed this state.
    pub step: u64,
    pub recorded_at: DateTime<Utc>,
    pub model: Model,
}

impl Snapshot {
    /// Stamps `model` with the current time.
    #[must_use]
    pub fn new(aspect_id: AspectId, step: u64, model: Model) -> Self {
        Self {
            aspect_id,
            step,
            recorded_at: Utc::now(),
            model,
        }
    }

    /// The buffer key under its aspect.
    #[must_use]
    pub const fn model_id(&self) -> &ModelId {
        &self.model.id
    }
}
