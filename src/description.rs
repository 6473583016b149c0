//! Declarative simulation descriptions.
//!
//! A description is an ordered set of (possibly nested) entities, each with
//! zero or more aspects. Only the fields the session engine needs are modelled
//! here. Descriptions can be loaded from TOML or JSON files; embedders with
//! their own configuration format implement [`DescriptionSource`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Point;

/// One facet of an entity: a model, the interpreter that reads it and the
/// simulator that advances it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectDecl {
    pub id: String,
    /// Model resource locator. Absent for aspects with no model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    /// Interpreter capability id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// Simulator capability id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator: Option<String>,
    /// Auxiliary recording locators handed to the interpreter on load.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recordings: Vec<String>,
}

impl AspectDecl {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model_url: None,
            interpreter: None,
            simulator: None,
            recordings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, interpreter: impl Into<String>, model_url: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self.model_url = Some(model_url.into());
        self
    }

    #[must_use]
    pub fn with_simulator(mut self, simulator: impl Into<String>) -> Self {
        self.simulator = Some(simulator.into());
        self
    }

    #[must_use]
    pub fn with_recordings<I, S>(mut self, recordings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recordings = recordings.into_iter().map(Into::into).collect();
        self
    }
}

/// An entity: an id, an optional position, its aspects and nested entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<AspectDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityDecl>,
}

impl EntityDecl {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
            aspects: Vec::new(),
            entities: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_aspect(mut self, aspect: AspectDecl) -> Self {
        self.aspects.push(aspect);
        self
    }

    #[must_use]
    pub fn with_entity(mut self, entity: EntityDecl) -> Self {
        self.entities.push(entity);
        self
    }
}

/// A node visited while walking a description.
#[derive(Debug, Clone, Copy)]
pub enum DescriptionNode<'a> {
    Entity {
        entity: &'a EntityDecl,
        parent: Option<&'a EntityDecl>,
    },
    Aspect {
        aspect: &'a AspectDecl,
        parent: &'a EntityDecl,
    },
}

/// A complete simulation description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationDescription {
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
}

impl SimulationDescription {
    #[must_use]
    pub fn new(entities: Vec<EntityDecl>) -> Self {
        Self { entities }
    }

    /// Depth-first walk, entities first.
    ///
    /// For each entity: the entity itself, then its child entities (recursively),
    /// then its own aspects. Siblings are visited in declared order, so an
    /// entity is always visited before any of its aspects.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(DescriptionNode<'a>)) {
        for entity in &self.entities {
            walk_entity(entity, None, visit);
        }
    }

    /// All nodes in walk order.
    #[must_use]
    pub fn nodes(&self) -> Vec<DescriptionNode<'_>> {
        let mut out = Vec::new();
        self.walk(&mut |node| out.push(node));
        out
    }

    /// Every (declaring entity, aspect) pair in walk order.
    #[must_use]
    pub fn aspects(&self) -> Vec<(&EntityDecl, &AspectDecl)> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if let DescriptionNode::Aspect { aspect, parent } = node {
                out.push((parent, aspect));
            }
        });
        out
    }

    /// Every entity id in walk order.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if let DescriptionNode::Entity { entity, .. } = node {
                out.push(entity.id.as_str());
            }
        });
        out
    }

    /// Checks id uniqueness and that every aspect with a model names an
    /// interpreter.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut entity_ids = HashSet::new();
        let mut aspect_ids = HashSet::new();
        let mut first_err = None;

        self.walk(&mut |node| {
            if first_err.is_some() {
                return;
            }
            match node {
                DescriptionNode::Entity { entity, .. } => {
                    if !entity_ids.insert(entity.id.as_str()) {
                        first_err = Some(ConfigError::DuplicateId {
                            what: "entity",
                            id: entity.id.clone(),
                        });
                    }
                }
                DescriptionNode::Aspect { aspect, .. } => {
                    if !aspect_ids.insert(aspect.id.as_str()) {
                        first_err = Some(ConfigError::DuplicateId {
                            what: "aspect",
                            id: aspect.id.clone(),
                        });
                    } else if aspect.model_url.is_some() && aspect.interpreter.is_none() {
                        first_err = Some(ConfigError::MissingField {
                            aspect: aspect.id.clone(),
                            field: "interpreter",
                        });
                    }
                }
            }
        });

        first_err.map_or(Ok(()), Err)
    }

    /// Parses a TOML description.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input, or a validation error.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let desc: Self = toml::from_str(s).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        desc.validate()?;
        Ok(desc)
    }

    /// Parses a JSON description.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input, or a validation error.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let desc: Self = serde_json::from_str(s).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        desc.validate()?;
        Ok(desc)
    }

    /// Loads a description from a `.toml` or `.json` file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, has an unknown
    /// extension, fails to parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?;
        let result = match ext.as_deref() {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => return Err(ConfigError::UnsupportedFormat { path: display }),
        };
        result.map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse { path: display, message },
            other => other,
        })
    }
}

fn walk_entity<'a>(
    entity: &'a EntityDecl,
    parent: Option<&'a EntityDecl>,
    visit: &mut impl FnMut(DescriptionNode<'a>),
) {
    visit(DescriptionNode::Entity { entity, parent });
    for child in &entity.entities {
        walk_entity(child, Some(entity), visit);
    }
    for aspect in &entity.aspects {
        visit(DescriptionNode::Aspect { aspect, parent: entity });
    }
}

/// Produces the simulation description when a session starts.
pub trait DescriptionSource: Send + Sync {
    /// # Errors
    /// Returns a [`ConfigError`] if the description cannot be produced.
    fn load(&self) -> Result<SimulationDescription, ConfigError>;
}

impl DescriptionSource for SimulationDescription {
    fn load(&self) -> Result<SimulationDescription, ConfigError> {
        Ok(self.clone())
    }
}

/// Reads the description from a file on every start.
#[derive(Debug, Clone)]
pub struct FileDescriptionSource {
    path: PathBuf,
}

impl FileDescriptionSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DescriptionSource for FileDescriptionSource {
    fn load(&self) -> Result<SimulationDescription, ConfigError> {
        SimulationDescription::load(&self.path)
    }
}
