//! Typed errors for the handful of pipeline failures callers may want to match on.
//!
//! Everything else (sink I/O, serialization glue, config parsing) flows through
//! `anyhow::Result` with `.context(...)` added at each hop, the same split the
//! rest of this codebase uses.

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no sink configured: at least one of a primary store or a message bus is required")]
    NoSinkConfigured,

    #[error("primary store unreachable at startup: {0}")]
    StoreUnreachable(#[source] anyhow::Error),

    #[error("shutdown deadline of {0:?} elapsed before drain completed")]
    DrainTimedOut(std::time::Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
