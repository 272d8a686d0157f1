//! Typed error taxonomy (spec §7).
//!
//! Filter/parameter/producer/limit/cache-miss errors propagate to callers;
//! storage failures during ingest are logged and the tick retries (handled
//! in `ingest.rs`, which wraps its tick boundary in `anyhow::Result` so a
//! single bad tick is logged and retried rather than panicking the task).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ObsCacheError>;

#[derive(Debug, Error)]
pub enum ObsCacheError {
    #[error("invalid filter syntax in '{0}'")]
    InvalidFilterSyntax(String),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("unsupported special parameter '{0}'")]
    UnsupportedParameter(String),

    #[error("unknown producer '{0}'")]
    UnknownProducer(String),

    #[error("request limit exceeded: {0}")]
    RequestLimitExceeded(String),

    #[error("cache miss: request not covered by memory or mirror and upstream query is forbidden")]
    CacheMiss,

    #[error("storage failure: {0}")]
    StorageFailure(#[from] rusqlite::Error),

    #[error("operation aborted by shutdown signal")]
    Shutdown,
}
