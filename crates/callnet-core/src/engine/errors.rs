//! Error types for call-network construction, persistence and inference.

use thiserror::Error;

/// Errors raised while building, encoding, decoding or querying a call network.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// None of these are recovered from inside the crate: a failed load or query
/// surfaces to the caller, which decides whether to try another model or to
/// fall back to "no recommendations".
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CallNetError {
    /// Invalid caller input (probability vectors out of range, unknown outcome
    /// in evidence, inconsistent network structure).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed, truncated or incompatible JBIF data.
    #[error("decode error: {0}")]
    Decode(String),

    /// A network that cannot be represented in the JBIF layout.
    #[error("encode error: {0}")]
    Encode(String),

    /// Numerical failure during inference (all-zero table, NaN beliefs).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Underlying reader or writer failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CallNetError>;
