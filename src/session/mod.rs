//! Session state, producer and control surface.

pub mod buffer;
pub mod context;
pub mod engine;
pub mod producer;

pub use buffer::{BufferPolicy, ModelBuffers};
pub use context::{AspectBinding, BindingSummary, RunFlags, SessionContext, SessionState};
pub use engine::{ControlCommand, ControlOutcome, SimulationSession};
pub use producer::{tasks_from_bindings, Producer, ProducerReport, ProducerTask};
