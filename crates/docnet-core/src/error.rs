//! Error types for Docnet Core.

use thiserror::Error;

/// Errors from identifier codecs and identity operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported multibase prefix: {0:?}")]
    UnsupportedMultibase(char),

    #[error("invalid multibase string: {0}")]
    InvalidMultibase(String),

    #[error("invalid varint: {0}")]
    Varint(String),

    #[error("invalid CID: {0}")]
    InvalidCid(String),

    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    #[error("unknown stream type: {0}")]
    UnknownStreamType(u64),

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("invalid did: {0}")]
    InvalidDid(String),

    #[error("malformed JWS: {0}")]
    InvalidJws(String),

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
