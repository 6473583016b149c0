//! Error reporting collaborator.
//!
//! Per-node failures during a tree build are never propagated to the caller of
//! `build`; they are handed to a [`SimulationCallback`] and the walk continues.

use std::sync::{Arc, Mutex};

use crate::error::{BuildError, CapabilityKind, ErrorKind};

/// One reported failure.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    /// Component that caught the error.
    pub origin: &'static str,
    /// Instance path (`<entity>.<aspect>`) of the affected node, if any.
    pub context: Option<String>,
    pub cause: Arc<BuildError>,
}

impl ErrorReport {
    #[must_use]
    pub fn new(origin: &'static str, context: Option<String>, cause: BuildError) -> Self {
        Self {
            kind: cause.kind(),
            origin,
            context,
            cause: Arc::new(cause),
        }
    }

    #[must_use]
    pub fn capability_kind(&self) -> Option<CapabilityKind> {
        self.cause.capability_kind()
    }
}

/// Receives error reports from the session engine.
pub trait SimulationCallback: Send + Sync {
    fn error(&self, report: ErrorReport);
}

/// Logs every report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallback;

impl SimulationCallback for TracingCallback {
    fn error(&self, report: ErrorReport) {
        tracing::error!(
            kind = %report.kind,
            origin = report.origin,
            context = report.context.as_deref().unwrap_or("-"),
            cause = %report.cause,
            "simulation error"
        );
    }
}

/// Keeps every report in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingCallback {
    reports: Mutex<Vec<ErrorReport>>,
}

impl CollectingCallback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of reports of `kind`.
    #[must_use]
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.reports
            .lock()
            .map(|r| r.iter().filter(|rep| rep.kind == kind).count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().map(|r| r.is_empty()).unwrap_or(true)
    }
}

impl SimulationCallback for CollectingCallback {
    fn error(&self, report: ErrorReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
    }
}
