//! Progress reporting for long-running batch operations.
//!
//! Batch upserts and deletions can run for minutes against a remote
//! backend; the managers emit progress through this trait so the CLI can
//! render it either as human-readable stderr lines or as JSON events for
//! machine consumers. Library callers that want silence use
//! [`SilentProgress`].

use serde_json::json;

pub trait ProgressReporter: Send + Sync {
    /// Called after each completed batch of a batched operation.
    fn batch(&self, operation: &str, current: usize, total: usize);

    /// Free-form note, e.g. a non-fatal per-batch error.
    fn note(&self, message: &str);
}

/// Human-readable progress on stderr, keeping stdout clean for results.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn batch(&self, operation: &str, current: usize, total: usize) {
        eprintln!("[{}] {}/{}", operation, current, total);
    }

    fn note(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// One JSON object per line on stderr, for scripted consumers.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn batch(&self, operation: &str, current: usize, total: usize) {
        eprintln!(
            "{}",
            json!({ "event": "progress", "operation": operation, "current": current, "total": total })
        );
    }

    fn note(&self, message: &str) {
        eprintln!("{}", json!({ "event": "note", "message": message }));
    }
}

/// Discards all events. The default for library use and tests.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn batch(&self, _operation: &str, _current: usize, _total: usize) {}
    fn note(&self, _message: &str) {}
}
