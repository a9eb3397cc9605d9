//! Error taxonomy for the render-grid client.
//!
//! The enum is `Clone` on purpose: a single transport failure of a batched
//! RPC call must be delivered to every caller waiting in that batch, so
//! error sources are flattened to strings rather than held as causes.

use std::time::Duration;

/// Errors produced by the render-grid client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GridError {
    /// The underlying HTTP call to the grid failed. Fatal for every
    /// render/booking/upload in the affected batch.
    #[error("grid transport error: {0}")]
    Transport(String),

    /// The grid answered with something the client contract does not
    /// allow, e.g. a result count that does not match the request count.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The grid asked for resources after the upload pipeline confirmed
    /// everything. Fatal for that one render; see the upload pipeline.
    #[error("render {0} reported need-more-resources after upload completed")]
    NeedMoreResources(String),

    /// Server-reported render failure, message passed through verbatim.
    #[error("render failed: {0}")]
    RenderFailed(String),

    /// The caller's wall-clock budget elapsed before a terminal status.
    #[error("render timed out after {0:?}")]
    RenderTimedOut(Duration),

    /// The caller's cancellation signal fired mid-poll.
    #[error("render aborted by caller")]
    RenderAborted,

    #[error("invalid digest hex: {0}")]
    InvalidDigest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The batching combinator's collector task is gone.
    #[error("batch channel closed")]
    BatchClosed,
}

impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        GridError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Serialization(err.to_string())
    }
}

/// Result type for render-grid client operations.
pub type Result<T> = std::result::Result<T, GridError>;
