//! Error types for the watch module.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone, Error)]
pub enum WatchError {
    /// A payload could not be decoded. Fatal to the listener.
    #[error("{label}: failed to decode event payload: {reason}")]
    Decode {
        label: String,
        reason: String,
        payload: String,
    },

    /// Expected events did not all arrive before the deadline.
    #[error(transparent)]
    Timeout(#[from] ConvergenceTimeout),

    /// The event source reported a connection failure.
    #[error("{label}: channel error: {message}")]
    Channel { label: String, message: String },

    /// The wait was cancelled through its token.
    #[error("wait cancelled")]
    Cancelled,

    /// The watcher was closed before the wait started.
    #[error("watcher is closed")]
    Closed,

    /// No tokio runtime was available to run the listener.
    #[error("{label}: no tokio runtime to run the listener")]
    NoRuntime { label: String },
}

impl WatchError {
    /// Check if this is a convergence timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WatchError::Timeout(_))
    }

    /// The timeout diagnostics, if this is a timeout.
    pub fn as_timeout(&self) -> Option<&ConvergenceTimeout> {
        match self {
            WatchError::Timeout(t) => Some(t),
            _ => None,
        }
    }
}

/// Failure reported by an [`EventSource`](crate::EventSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Diagnostics for a wait that ran out of time.
///
/// Identifiers are rendered with `Display` so the report stays readable
/// regardless of the event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceTimeout {
    /// Label of the watcher that timed out.
    pub label: String,
    /// The expected set of the failed wait.
    pub expected: BTreeSet<String>,
    /// Everything observed on the channel at the time of failure.
    pub observed: BTreeSet<String>,
    /// How long the wait ran.
    pub waited: Duration,
}

impl ConvergenceTimeout {
    /// Expected events that did arrive.
    pub fn matched(&self) -> BTreeSet<String> {
        self.expected.intersection(&self.observed).cloned().collect()
    }

    /// Expected events that never arrived.
    pub fn missing(&self) -> BTreeSet<String> {
        self.expected.difference(&self.observed).cloned().collect()
    }
}

impl fmt::Display for ConvergenceTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: timeout waiting for events after {:?} -- expected: {:?} but received: {:?} (missing: {:?})",
            self.label,
            self.waited,
            self.expected,
            self.observed,
            self.missing()
        )
    }
}

impl std::error::Error for ConvergenceTimeout {}

/// Result type for watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_timeout_diff() {
        let timeout = ConvergenceTimeout {
            label: "node2".into(),
            expected: set(&["a", "b", "c"]),
            observed: set(&["a", "b", "z"]),
            waited: Duration::from_secs(10),
        };

        assert_eq!(timeout.matched(), set(&["a", "b"]));
        assert_eq!(timeout.missing(), set(&["c"]));

        let message = timeout.to_string();
        assert!(message.starts_with("node2: timeout waiting for events"));
        assert!(message.contains("missing: {\"c\"}"));
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let err = WatchError::from(ConvergenceTimeout {
            label: "feed".into(),
            expected: set(&["x"]),
            observed: BTreeSet::new(),
            waited: Duration::from_millis(5),
        });
        assert!(err.is_timeout());
        assert!(err.as_timeout().is_some());

        assert!(!WatchError::Cancelled.is_timeout());
        assert!(WatchError::Closed.as_timeout().is_none());
    }
}
