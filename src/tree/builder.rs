use std::sync::Arc;

use crate::callback::{ErrorReport, SimulationCallback};
use crate::capability::CapabilityRegistry;
use crate::description::{AspectDecl, DescriptionNode, EntityDecl, SimulationDescription};
use crate::error::{BuildError, CapabilityKind};
use crate::resource::ResourceLocator;
use crate::session::SessionContext;

use super::{AspectNode, EntityNode, RuntimeTree};

const ORIGIN: &str = "runtime_tree_builder";

/// Builds a [`RuntimeTree`] from a [`SimulationDescription`].
///
/// Entities are always appended at the root of the tree, whatever their
/// declared depth, and an aspect attaches to the first root-level entity whose
/// id matches its declaring entity. An aspect whose entity is not found is
/// dropped.
///
/// Failures while binding an aspect are reported to the callback and the walk
/// continues; `build` itself never fails.
pub struct RuntimeTreeBuilder {
    callback: Arc<dyn SimulationCallback>,
}

impl RuntimeTreeBuilder {
    #[must_use]
    pub fn new(callback: Arc<dyn SimulationCallback>) -> Self {
        Self { callback }
    }

    /// Builds a tree, resolving capabilities through the session's registry.
    #[must_use]
    pub fn build(&self, description: &SimulationDescription, ctx: &SessionContext) -> RuntimeTree {
        self.build_with_registry(description, ctx.registry())
    }

    /// Builds a tree against an explicit registry.
    #[must_use]
    pub fn build_with_registry(&self, description: &SimulationDescription, registry: &CapabilityRegistry) -> RuntimeTree {
        let mut tree = RuntimeTree::new();
        description.walk(&mut |node| match node {
            DescriptionNode::Entity { entity, .. } => visit_entity(&mut tree, entity),
            DescriptionNode::Aspect { aspect, parent } => self.visit_aspect(&mut tree, registry, aspect, parent),
        });
        tracing::debug!(entities = tree.len(), "runtime tree built");
        tree
    }

    fn visit_aspect(&self, tree: &mut RuntimeTree, registry: &CapabilityRegistry, aspect: &AspectDecl, parent: &EntityDecl) {
        let mut node = AspectNode::new(aspect.id.as_str());
        let instance_path = format!("{}.{}", parent.id, aspect.id);

        if let Some(model_url) = aspect.model_url.as_deref() {
            if let Err(err) = bind_model(&mut node, registry, aspect, model_url, &instance_path) {
                self.report(&instance_path, err);
            }
        }

        if let Some(simulator_id) = aspect.simulator.as_deref() {
            match registry.resolve_simulator(simulator_id) {
                Ok(simulator) => node.set_simulator(simulator),
                Err(err) => self.report(&instance_path, err),
            }
        }

        match tree.find_child_mut(&parent.id) {
            Some(entity) => entity.add_aspect(node),
            None => {
                tracing::debug!(aspect = %aspect.id, entity = %parent.id, "no root-level entity for aspect; dropped");
            }
        }
    }

    fn report(&self, instance_path: &str, err: BuildError) {
        tracing::warn!(context = instance_path, kind = %err.kind(), error = %err, "aspect binding failed");
        self.callback
            .error(ErrorReport::new(ORIGIN, Some(instance_path.to_string()), err));
    }
}

fn visit_entity(tree: &mut RuntimeTree, entity: &EntityDecl) {
    tree.add_child(EntityNode::new(entity.id.as_str()).with_position(entity.position));
}

fn bind_model(
    node: &mut AspectNode,
    registry: &CapabilityRegistry,
    aspect: &AspectDecl,
    model_url: &str,
    instance_path: &str,
) -> Result<(), BuildError> {
    let interpreter_id = aspect.interpreter.as_deref().ok_or_else(|| BuildError::CapabilityNotFound {
        kind: CapabilityKind::Interpreter,
        id: String::new(),
    })?;
    let interpreter = registry.resolve_interpreter(interpreter_id)?;

    if !interpreter.populate_runtime_tree(node) {
        tracing::trace!(interpreter = interpreter.name(), aspect = %aspect.id, "interpreter added no runtime sub-trees");
    }

    let locator = ResourceLocator::parse(model_url)?;
    let auxiliary = ResourceLocator::parse_all(&aspect.recordings)?;

    let model = interpreter
        .load(&locator, &auxiliary, instance_path)
        .map_err(|source| BuildError::Interpreter {
            interpreter: interpreter_id.to_string(),
            source,
        })?;

    node.model = Some(model);
    node.set_interpreter(interpreter);
    Ok(())
}
