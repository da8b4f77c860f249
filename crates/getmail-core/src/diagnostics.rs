//! Diagnostics sink for the parsing and verification components
//!
//! Components receive an [`Observer`] at construction instead of logging
//! through process-wide state, so tests can capture what was reported.

use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Receiver of component diagnostics
pub trait Observer: Send + Sync {
    fn info(&self, context: &str, message: &str);
    fn warning(&self, context: &str, message: &str);
    fn error(&self, context: &str, message: &str);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn info(&self, context: &str, message: &str) {
        info!(context, "{}", message);
    }

    fn warning(&self, context: &str, message: &str) {
        warn!(context, "{}", message);
    }

    fn error(&self, context: &str, message: &str) {
        error!(context, "{}", message);
    }
}

/// Shared handle to the default observer
pub fn tracing_observer() -> Arc<dyn Observer> {
    Arc::new(TracingObserver)
}

/// A captured diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub context: String,
    pub message: String,
}

/// Keeps every diagnostic in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries recorded at the given level
    pub fn at_level(&self, level: Level) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }

    /// Whether any message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.message.contains(needle))
    }

    fn record(&self, level: Level, context: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Diagnostic {
                level,
                context: context.to_string(),
                message: message.to_string(),
            });
        }
    }
}

impl Observer for RecordingObserver {
    fn info(&self, context: &str, message: &str) {
        self.record(Level::Info, context, message);
    }

    fn warning(&self, context: &str, message: &str) {
        self.record(Level::Warning, context, message);
    }

    fn error(&self, context: &str, message: &str) {
        self.record(Level::Error, context, message);
    }
}
