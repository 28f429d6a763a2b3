//! Human-readable diagnostics.
//!
//! Notifications are plain text lines for humans, kept strictly apart
//! from the binary data output. They are best-effort: emitting one can
//! never fail the pipeline, and repeats of the same subject inside the
//! writer's cool-down window collapse into a single line.

use std::sync::Mutex;

/// A (subject, message) diagnostic pair. Deduplication is keyed on the
/// subject alone; the message carries the detail, typically the OS
/// error text of the failing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub message: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// The printed form: subject immediately followed by the message.
    pub fn line(&self) -> String {
        format!("{}{}", self.subject, self.message)
    }
}

/// Destination for diagnostic lines.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Production sink: one line per notification on standard error.
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&self, line: &str) {
        eprintln!("{line}");
    }
}

/// Sink that collects lines in memory, for assertions in tests.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}
