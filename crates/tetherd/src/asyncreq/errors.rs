//! Error types for the request executor.

use thiserror::Error;

use super::request::AsyncKind;

/// Errors returned when submitting a request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor has begun shutting down and accepts no new work.
    #[error("executor is shutting down; {kind} request rejected")]
    ShuttingDown {
        /// Operation that was rejected.
        kind: AsyncKind,
    },
}
