//! Error taxonomy for harvest operations.
//!
//! Only `Config` errors are allowed to abort before a run produces output.
//! Everything below that class is recovered locally and represented as data
//! (a tagged record) rather than a raised error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Missing or invalid configuration. Fails fast, before any run starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// Browser session could not be established or was lost.
    #[error("browser error: {0}")]
    Browser(String),

    /// Document store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Analysis collaborator failure.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Other errors, with full context chain preserved.
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

/// Convenience alias for Result with `HarvestError`.
pub type HarvestResult<T> = Result<T, HarvestError>;
