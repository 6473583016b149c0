mod common;

use std::sync::Arc;

use scenecast::{
    AspectDecl, CapabilityKind, CapabilityRegistry, CollectingCallback, EntityDecl, ErrorKind, ModelInterpreter,
    ResourceLocator, RuntimeTreeBuilder, SessionContext, SimulationCallback, SimulationDescription,
};
use scenecast::session::BufferPolicy;

use common::{CountingSimulator, EchoInterpreter};

fn e1_a1() -> SimulationDescription {
    SimulationDescription::new(vec![EntityDecl::new("E1").with_aspect(
        AspectDecl::new("A1")
            .with_model("interp-1", "model://x")
            .with_simulator("sim-1"),
    )])
}

fn build(registry: CapabilityRegistry, desc: &SimulationDescription) -> (scenecast::RuntimeTree, Arc<CollectingCallback>) {
    let ctx = SessionContext::new(Arc::new(registry), BufferPolicy::default());
    let callback = Arc::new(CollectingCallback::new());
    let builder = RuntimeTreeBuilder::new(Arc::clone(&callback) as Arc<dyn SimulationCallback>);
    (builder.build(desc, &ctx), callback)
}

#[test]
fn fully_registered_aspect_binds_interpreter_model_and_simulator() {
    let interpreter: Arc<dyn ModelInterpreter> = Arc::new(EchoInterpreter::new("interp-1"));
    let registry = CapabilityRegistry::new();
    registry.register_interpreter("interp-1", Arc::clone(&interpreter)).unwrap();
    registry
        .register_simulator("sim-1", Arc::new(CountingSimulator::new(&["m1"])))
        .unwrap();

    let (tree, callback) = build(registry, &e1_a1());

    assert!(callback.is_empty());
    assert_eq!(tree.len(), 1);
    let node = tree.aspect("E1", "A1").unwrap();
    assert_eq!(node.id.as_str(), "A1");
    assert_eq!(node.name, "A1");
    assert!(Arc::ptr_eq(node.interpreter().unwrap(), &interpreter));
    assert!(node.simulator().is_some());

    let locator = ResourceLocator::parse("model://x").unwrap();
    let expected = interpreter.load(&locator, &[], "E1.A1").unwrap();
    assert_eq!(node.model.as_ref(), Some(&expected));
}

#[test]
fn unregistered_simulator_is_reported_once_and_model_still_loads() {
    let registry = CapabilityRegistry::new();
    registry
        .register_interpreter("interp-1", Arc::new(EchoInterpreter::new("interp-1")))
        .unwrap();

    let (tree, callback) = build(registry, &e1_a1());

    let node = tree.aspect("E1", "A1").unwrap();
    assert!(node.model.is_some());
    assert!(node.simulator().is_none());

    let reports = callback.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, ErrorKind::CapabilityNotFound);
    assert_eq!(reports[0].capability_kind(), Some(CapabilityKind::Simulator));
    assert_eq!(reports[0].context.as_deref(), Some("E1.A1"));
}

#[test]
fn unregistered_interpreter_does_not_stop_other_aspects() {
    let registry = CapabilityRegistry::new();
    registry
        .register_interpreter("interp-1", Arc::new(EchoInterpreter::new("interp-1")))
        .unwrap();
    let desc = SimulationDescription::new(vec![
        EntityDecl::new("E1")
            .with_aspect(AspectDecl::new("A1").with_model("missing", "model://a"))
            .with_aspect(AspectDecl::new("A2").with_model("interp-1", "model://b")),
        EntityDecl::new("E2").with_aspect(AspectDecl::new("A3").with_model("interp-1", "model://c")),
    ]);

    let (tree, callback) = build(registry, &desc);

    assert_eq!(callback.count(ErrorKind::CapabilityNotFound), 1);
    assert_eq!(callback.reports()[0].context.as_deref(), Some("E1.A1"));
    assert!(tree.aspect("E1", "A1").unwrap().model.is_none());
    assert!(tree.aspect("E1", "A2").unwrap().model.is_some());
    assert!(tree.aspect("E2", "A3").unwrap().model.is_some());
}

#[test]
fn nested_entities_land_at_root_with_their_aspects() {
    let registry = CapabilityRegistry::new();
    let desc = SimulationDescription::new(vec![EntityDecl::new("cell")
        .with_aspect(AspectDecl::new("membrane"))
        .with_entity(
            EntityDecl::new("nucleus")
                .with_aspect(AspectDecl::new("dna"))
                .with_entity(EntityDecl::new("nucleolus")),
        )]);

    let (tree, callback) = build(registry, &desc);

    assert!(callback.is_empty());
    let ids: Vec<&str> = tree.children().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["cell", "nucleus", "nucleolus"]);
    assert!(tree.aspect("cell", "membrane").is_some());
    assert!(tree.aspect("nucleus", "dna").is_some());
    assert!(tree.aspect("cell", "dna").is_none());
}

#[test]
fn tree_serializes_without_capability_handles() {
    let registry = CapabilityRegistry::new();
    registry
        .register_interpreter("interp-1", Arc::new(EchoInterpreter::new("interp-1")))
        .unwrap();
    let (tree, _) = build(registry, &e1_a1());

    let json: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();
    let text = json.to_string();
    assert!(text.contains("E1.A1"));
    assert!(text.contains("renderer"));
}
