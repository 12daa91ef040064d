//! Scheduler error types.

use thiserror::Error;

/// Errors from scheduler construction and task management.
#[derive(Debug, Error)]
pub enum SchedError {
    /// The scheduler configuration is invalid.
    #[error("invalid scheduler config: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: &'static str,
    },

    /// The worker pool could not be started.
    #[error("failed to start worker pool: {message}")]
    Runtime {
        /// Error reported by the runtime builder.
        message: String,
    },
}
