//! Error types for indifs core.

use thiserror::Error;

/// Errors from encoding, decoding and key handling.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("root header is missing field {0}")]
    MissingField(&'static str),

    #[error("unsupported field value: {0}")]
    UnsupportedValue(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Reasons a commit is rejected.
///
/// None of these are retryable without a corrected commit.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The version/fork rule rejected the commit.
    #[error("stale commit: version {got} cannot follow version {current}")]
    StaleCommit { current: u64, got: u64 },

    #[error("root signature verification failed")]
    InvalidSignature,

    /// The header tree recomputed from the merged header set does not match
    /// the root `Merkle`.
    #[error("header tree mismatch: expected {expected}, computed {actual}")]
    TreeMerkleMismatch { expected: String, actual: String },

    #[error("content of {path} does not match its declared Merkle root")]
    ContentMerkleMismatch { path: String },

    #[error("{path} declares {declared} bytes but only {available} remain in the body")]
    SizeMismatch {
        path: String,
        declared: u64,
        available: u64,
    },

    #[error("malformed commit: {0}")]
    MalformedCommit(String),

    /// An immutable root field (`Pub`, `PartSize`) differs from the tree's.
    #[error("immutable root field {0} changed")]
    RootFieldChanged(&'static str),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::InvalidSignature
            }
            other => ValidationError::MalformedCommit(other.to_string()),
        }
    }
}
