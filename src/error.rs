//! Error types for scenecast.
//!
//! All errors are strongly typed using thiserror. Failures that happen while
//! building the runtime tree are never fatal to the build; they are reported
//! through a [`SimulationCallback`](crate::callback::SimulationCallback) and
//! classified with an [`ErrorKind`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ConnectionId;

/// Capability namespace: interpreters and simulators are registered separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Model interpreter namespace.
    Interpreter,
    /// Simulator namespace.
    Simulator,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpreter => f.write_str("interpreter"),
            Self::Simulator => f.write_str("simulator"),
        }
    }
}

/// Classification carried by every error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No registration matches the requested capability id.
    CapabilityNotFound,
    /// A model resource locator could not be parsed or resolved.
    MalformedResource,
    /// The interpreter failed while loading or populating.
    InterpreterFailure,
    /// The capability resolution mechanism itself failed.
    InitializationFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CapabilityNotFound => "capability_not_found",
            Self::MalformedResource => "malformed_resource",
            Self::InterpreterFailure => "interpreter_failure",
            Self::InitializationFailure => "initialization_failure",
        };
        f.write_str(s)
    }
}

/// Errors raised by model interpreters.
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("Failed to load model from '{locator}': {reason}")]
    LoadFailed {
        locator: String,
        reason: String,
    },

    #[error("Failed to read recording '{locator}': {reason}")]
    RecordingFailed {
        locator: String,
        reason: String,
    },

    #[error("Failed to build scene: {reason}")]
    SceneFailed {
        reason: String,
    },
}

/// Errors raised by simulators.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Simulator initialization failed for aspect '{aspect}': {reason}")]
    InitializationFailed {
        aspect: String,
        reason: String,
    },

    #[error("Simulation step failed for aspect '{aspect}': {reason}")]
    StepFailed {
        aspect: String,
        reason: String,
    },
}

/// Errors raised while resolving capabilities or loading models for one aspect.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No {kind} registered under id '{id}'")]
    CapabilityNotFound {
        kind: CapabilityKind,
        id: String,
    },

    #[error("Malformed resource locator '{locator}': {reason}")]
    MalformedResource {
        locator: String,
        reason: String,
    },

    #[error("Interpreter '{interpreter}' failed: {source}")]
    Interpreter {
        interpreter: String,
        #[source]
        source: InterpreterError,
    },

    #[error("Failed to initialize {kind} '{id}': {reason}")]
    Initialization {
        kind: CapabilityKind,
        id: String,
        reason: String,
    },
}

impl BuildError {
    /// Classifies this error for reporting.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityNotFound { .. } => ErrorKind::CapabilityNotFound,
            Self::MalformedResource { .. } => ErrorKind::MalformedResource,
            Self::Interpreter { .. } => ErrorKind::InterpreterFailure,
            Self::Initialization { .. } => ErrorKind::InitializationFailure,
        }
    }

    /// The capability namespace involved, when the error concerns one.
    #[must_use]
    pub const fn capability_kind(&self) -> Option<CapabilityKind> {
        match self {
            Self::CapabilityNotFound { kind, .. } | Self::Initialization { kind, .. } => Some(*kind),
            Self::Interpreter { .. } => Some(CapabilityKind::Interpreter),
            Self::MalformedResource { .. } => None,
        }
    }
}

/// Transport errors for output connections.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection {id} is closed")]
    ConnectionClosed {
        id: ConnectionId,
    },

    #[error("Connection {id} writer queue is full (capacity {capacity})")]
    Backpressure {
        id: ConnectionId,
        capacity: usize,
    },

    #[error("Transport I/O error: {message}")]
    Io {
        message: String,
    },
}

/// Configuration and description loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },

    #[error("Failed to parse '{path}': {message}")]
    Parse {
        path: String,
        message: String,
    },

    #[error("Unsupported description format for '{path}' (expected .toml or .json)")]
    UnsupportedFormat {
        path: String,
    },

    #[error("Duplicate {what} id '{id}'")]
    DuplicateId {
        what: &'static str,
        id: String,
    },

    #[error("Aspect '{aspect}' is missing required field '{field}'")]
    MissingField {
        aspect: String,
        field: &'static str,
    },
}

/// Top-level error type for scenecast.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Simulator error: {0}")]
    Simulator(#[from] SimulatorError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SessionError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a build error.
    #[must_use]
    pub const fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for scenecast operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_not_found_message() {
        let err = BuildError::CapabilityNotFound {
            kind: CapabilityKind::Simulator,
            id: "sim-1".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("simulator"));
        assert!(msg.contains("sim-1"));
        assert_eq!(err.kind(), ErrorKind::CapabilityNotFound);
        assert_eq!(err.capability_kind(), Some(CapabilityKind::Simulator));
    }

    #[test]
    fn test_build_error_kinds() {
        let malformed = BuildError::MalformedResource {
            locator: "::".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(malformed.kind(), ErrorKind::MalformedResource);
        assert_eq!(malformed.capability_kind(), None);

        let interp = BuildError::Interpreter {
            interpreter: "interp-1".to_string(),
            source: InterpreterError::LoadFailed {
                locator: "model://x".to_string(),
                reason: "truncated".to_string(),
            },
        };
        assert_eq!(interp.kind(), ErrorKind::InterpreterFailure);
        assert!(std::error::Error::source(&interp).is_some());

        let init = BuildError::Initialization {
            kind: CapabilityKind::Interpreter,
            id: "interp-1".to_string(),
            reason: "factory failed".to_string(),
        };
        assert_eq!(init.kind(), ErrorKind::InitializationFailure);
    }

    #[test]
    fn test_transport_error() {
        let err = TransportError::Backpressure {
            id: ConnectionId::new(7),
            capacity: 16,
        };
        let msg = format!("{err}");
        assert!(msg.contains("conn-7"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_session_error_from_build() {
        let err: SessionError = BuildError::CapabilityNotFound {
            kind: CapabilityKind::Interpreter,
            id: "x".to_string(),
        }
        .into();
        assert!(err.is_build());
        assert!(!err.is_config());
    }

    #[test]
    fn test_session_error_internal() {
        let err = SessionError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("unexpected state"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::MalformedResource.to_string(), "malformed_resource");
        assert_eq!(CapabilityKind::Interpreter.to_string(), "interpreter");
    }
}
