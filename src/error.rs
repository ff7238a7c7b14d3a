//! Error types for the foreman kernel.
//!
//! Construction-time problems are never surfaced as errors: they are
//! reported through the issue sink (see [`crate::issues`]) and the offending
//! item is skipped. The variants here cover the remaining surfaces: opening
//! a floor, invoking work on it, and waiting on a running process.

use thiserror::Error;

/// Main error type for floor operations.
#[derive(Error, Debug)]
pub enum FloorError {
    /// Configuration produced one or more reported issues; the rendered
    /// report lists every one of them.
    #[error("floor configuration failed:\n{0}")]
    Configuration(String),

    /// A work name was invoked that no office declares.
    #[error("unknown work '{0}'")]
    UnknownWork(String),

    /// The floor has been closed; no further work may be invoked.
    #[error("floor is closed")]
    Closed,

    /// Waiting for a process to complete exceeded the given duration.
    #[error("timed out waiting for process completion after {0:?}")]
    WaitTimeout(std::time::Duration),

    /// The process terminated with an escalation no handler accepted.
    #[error("process failed: {0}")]
    ProcessFailure(String),
}

/// Result type alias for floor operations.
pub type Result<T> = std::result::Result<T, FloorError>;
