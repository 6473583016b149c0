//! Runtime tree: the live entity/aspect graph of a running session.
//!
//! The root holds entity nodes only. Entity nodes hold an ordered mix of child
//! entities and aspects; aspect nodes carry the bound model, interpreter and
//! simulator plus whatever sub-trees the interpreter populated.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::capability::{ModelInterpreter, Simulator};
use crate::id::{AspectId, EntityId};
use crate::model::{Model, Point};

/// Visitor that populates a runtime tree from a simulation description.
pub mod builder;

pub use builder::RuntimeTreeBuilder;

/// Root of the runtime tree.
#[derive(Debug, Default, Serialize)]
pub struct RuntimeTree {
    children: Vec<EntityNode>,
}

impl RuntimeTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entity at the root level.
    pub fn add_child(&mut self, entity: EntityNode) {
        self.children.push(entity);
    }

    #[must_use]
    pub fn children(&self) -> &[EntityNode] {
        &self.children
    }

    /// First root-level entity with `id`.
    #[must_use]
    pub fn find_child(&self, id: &str) -> Option<&EntityNode> {
        self.children.iter().find(|e| e.id.as_str() == id)
    }

    /// First root-level entity with `id`, mutably.
    pub fn find_child_mut(&mut self, id: &str) -> Option<&mut EntityNode> {
        self.children.iter_mut().find(|e| e.id.as_str() == id)
    }

    /// Aspect `aspect` under the root-level entity `entity`.
    #[must_use]
    pub fn aspect(&self, entity: &str, aspect: &str) -> Option<&AspectNode> {
        self.find_child(entity).and_then(|e| e.aspect(aspect))
    }

    /// Every (entity, aspect) pair reachable from the root, in tree order.
    pub fn aspects(&self) -> impl Iterator<Item = (&EntityNode, &AspectNode)> {
        self.children
            .iter()
            .flat_map(|entity| entity.aspects().map(move |aspect| (entity, aspect)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Serializes the tree for clients. Capability bindings are not included.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A child of an entity node.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeNode {
    Entity(EntityNode),
    Aspect(AspectNode),
}

impl RuntimeNode {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Entity(e) => e.id.as_str(),
            Self::Aspect(a) => a.id.as_str(),
        }
    }
}

/// An entity in the runtime tree.
#[derive(Debug, Serialize)]
pub struct EntityNode {
    pub id: EntityId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    children: Vec<RuntimeNode>,
}

impl EntityNode {
    #[must_use]
    pub fn new(id: impl Into<EntityId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            position: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: Option<Point>) -> Self {
        self.position = position;
        self
    }

    pub fn add_child(&mut self, child: RuntimeNode) {
        self.children.push(child);
    }

    pub fn add_aspect(&mut self, aspect: AspectNode) {
        self.children.push(RuntimeNode::Aspect(aspect));
    }

    #[must_use]
    pub fn children(&self) -> &[RuntimeNode] {
        &self.children
    }

    /// First direct child with `id`.
    #[must_use]
    pub fn find_child(&self, id: &str) -> Option<&RuntimeNode> {
        self.children.iter().find(|c| c.id() == id)
    }

    pub fn aspects(&self) -> impl Iterator<Item = &AspectNode> {
        self.children.iter().filter_map(|c| match c {
            RuntimeNode::Aspect(a) => Some(a),
            RuntimeNode::Entity(_) => None,
        })
    }

    #[must_use]
    pub fn aspect(&self, id: &str) -> Option<&AspectNode> {
        self.aspects().find(|a| a.id.as_str() == id)
    }

    pub fn aspect_mut(&mut self, id: &str) -> Option<&mut AspectNode> {
        self.children.iter_mut().find_map(|c| match c {
            RuntimeNode::Aspect(a) if a.id.as_str() == id => Some(a),
            _ => None,
        })
    }
}

/// Kind of interpreter-populated sub-tree under an aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTreeKind {
    Model,
    Simulation,
    Visualization,
}

/// Interpreter-owned properties of one sub-tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AspectSubTree {
    pub kind: SubTreeKind,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// An aspect in the runtime tree.
#[derive(Serialize)]
pub struct AspectNode {
    pub id: AspectId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
    #[serde(skip)]
    interpreter: Option<Arc<dyn ModelInterpreter>>,
    #[serde(skip)]
    simulator: Option<Arc<dyn Simulator>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subtrees: Vec<AspectSubTree>,
}

impl AspectNode {
    #[must_use]
    pub fn new(id: impl Into<AspectId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            model: None,
            interpreter: None,
            simulator: None,
            subtrees: Vec::new(),
        }
    }

    #[must_use]
    pub fn interpreter(&self) -> Option<&Arc<dyn ModelInterpreter>> {
        self.interpreter.as_ref()
    }

    pub fn set_interpreter(&mut self, interpreter: Arc<dyn ModelInterpreter>) {
        self.interpreter = Some(interpreter);
    }

    #[must_use]
    pub fn simulator(&self) -> Option<&Arc<dyn Simulator>> {
        self.simulator.as_ref()
    }

    pub fn set_simulator(&mut self, simulator: Arc<dyn Simulator>) {
        self.simulator = Some(simulator);
    }

    #[must_use]
    pub fn subtrees(&self) -> &[AspectSubTree] {
        &self.subtrees
    }

    /// Returns the sub-tree of `kind`, creating an empty one if needed.
    pub fn subtree_mut(&mut self, kind: SubTreeKind) -> &mut AspectSubTree {
        let idx = match self.subtrees.iter().position(|s| s.kind == kind) {
            Some(idx) => idx,
            None => {
                self.subtrees.push(AspectSubTree {
                    kind,
                    properties: serde_json::Map::new(),
                });
                self.subtrees.len() - 1
            }
        };
        &mut self.subtrees[idx]
    }
}

impl fmt::Debug for AspectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectNode")
            .field("id", &self.id)
            .field("model", &self.model.as_ref().map(|m| &m.id))
            .field("interpreter", &self.interpreter.as_ref().map(|i| i.name().to_string()))
            .field("simulator", &self.simulator.as_ref().map(|s| s.name().to_string()))
            .field("subtrees", &self.subtrees.len())
            .finish()
    }
}
