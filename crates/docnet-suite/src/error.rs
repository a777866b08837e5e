//! Error types for the suite.

use std::time::Duration;

use docnet_client::ClientError;
use docnet_core::{CoreError, StreamId};
use docnet_watch::WatchError;
use thiserror::Error;

/// Errors that can fail a scenario.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Node client error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Convergence wait failed.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Identifier or identity error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A freshly created model never became loadable.
    #[error("model {model} not loadable after {waited:?}")]
    ModelUnavailable { model: StreamId, waited: Duration },

    /// Nodes disagree.
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl SuiteError {
    /// The convergence timeout behind this error, if any.
    pub fn as_timeout(&self) -> Option<&docnet_watch::ConvergenceTimeout> {
        match self {
            SuiteError::Watch(e) => e.as_timeout(),
            _ => None,
        }
    }
}

/// Result type for suite operations.
pub type Result<T> = std::result::Result<T, SuiteError>;
