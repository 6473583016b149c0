//! # scenecast - live scene streaming for pluggable simulations
//!
//! scenecast coordinates pluggable model interpreters and numeric simulators to
//! build a live, tree-shaped view of a simulated scene, and streams
//! incremental snapshots of that scene to subscribed clients on a fixed
//! cadence.
//!
//! ## Core Concepts
//!
//! - **CapabilityRegistry**: named interpreters and simulators, resolved by id
//! - **RuntimeTree**: entity and aspect nodes bound to their capabilities
//! - **SessionContext**: bindings, snapshot buffers and run flags of one session
//! - **UpdateScheduler**: drains buffers into scenes every tick
//! - **Broadcaster**: best-effort fan-out to live connections
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scenecast::{CapabilityRegistry, SessionConfig, SimulationSession, FileDescriptionSource};
//!
//! let registry = Arc::new(CapabilityRegistry::new());
//! registry.register_interpreter("interp-1", Arc::new(MyInterpreter::default()))?;
//! registry.register_simulator("sim-1", Arc::new(MySimulator::default()))?;
//!
//! let source = Arc::new(FileDescriptionSource::new("scene.toml"));
//! let session = SimulationSession::new(SessionConfig::default(), registry, source);
//! session.handle_message("start")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod id;
pub mod model;
pub mod resource;

// Capabilities and descriptions
pub mod callback;
pub mod capability;
pub mod description;

// Tree, session and publication
pub mod broadcast;
pub mod config;
pub mod scheduler;
pub mod session;
#[cfg(feature = "transport-ws")]
pub mod transport;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_support;

pub use broadcast::{BroadcastReport, Broadcaster, ChannelConnection, Connection};
pub use callback::{CollectingCallback, ErrorReport, SimulationCallback, TracingCallback};
pub use capability::{
    Capability, CapabilityRegistry, ModelInterpreter, RecordingReader, RecordingsInterpreter, Simulator,
};
pub use config::SessionConfig;
pub use description::{AspectDecl, DescriptionSource, EntityDecl, FileDescriptionSource, SimulationDescription};
pub use error::{
    BuildError, CapabilityKind, ConfigError, ErrorKind, InterpreterError, SessionError, SessionResult,
    SimulatorError, TransportError,
};
pub use id::{AspectId, ConnectionId, EntityId, ModelId, RunId};
pub use model::{Model, ModelContent, Point, Scene, Snapshot};
pub use resource::ResourceLocator;
pub use scheduler::{SchedulerHandle, TickReport, UpdateScheduler};
pub use session::{BufferPolicy, ControlOutcome, SessionContext, SessionState, SimulationSession};
#[cfg(feature = "transport-ws")]
pub use transport::{TransportHandle, WsConnection, WsTransport};
pub use tree::{AspectNode, EntityNode, RuntimeTree, RuntimeTreeBuilder};
