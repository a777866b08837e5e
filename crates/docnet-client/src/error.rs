//! Error types for node clients.

use docnet_core::CoreError;
use thiserror::Error;

/// Errors from talking to a node.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("graphql errors: {}", .0.join("; "))]
    Graphql(Vec<String>),

    #[error("no identity configured for writes")]
    Unauthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by node: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("feed error: {0}")]
    Feed(String),
}

impl ClientError {
    /// Check if this is a not-found condition, from either transport.
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::NotFound(_) => true,
            ClientError::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
