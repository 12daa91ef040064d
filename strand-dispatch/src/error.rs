//! Dispatcher error types.

use strand_log::AppendError;
use thiserror::Error;

/// Errors surfaced to producers on `offer` and `claim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OfferError {
    /// Insufficient capacity: the slowest subscription has not freed
    /// enough of the buffer. Transient; retry once consumers advance.
    #[error("insufficient capacity")]
    Full,

    /// The dispatcher is closed. Terminal for the producer.
    #[error("dispatcher is closed")]
    Closed,

    /// The requested length is zero or exceeds the maximum frame
    /// length. Rejected synchronously.
    #[error("invalid claim length {length}: must be in 1..={max}")]
    InvalidLength {
        /// The requested payload length.
        length: usize,
        /// The maximum allowed payload length.
        max: usize,
    },
}

impl From<AppendError> for OfferError {
    fn from(err: AppendError) -> Self {
        match err {
            AppendError::Full => Self::Full,
            AppendError::InvalidLength { length, max } => Self::InvalidLength { length, max },
        }
    }
}

/// Errors surfaced by dispatcher construction and the async lifecycle
/// operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher is closed.
    #[error("dispatcher is closed")]
    Closed,

    /// No subscription with the given name is registered.
    #[error("subscription '{name}' not found")]
    SubscriptionNotFound {
        /// The requested subscription name.
        name: String,
    },

    /// A subscription with the given name is already registered.
    #[error("subscription '{name}' already exists")]
    SubscriptionExists {
        /// The conflicting subscription name.
        name: String,
    },

    /// The subscription registry is at capacity.
    #[error("subscription limit reached (max={max})")]
    SubscriptionLimit {
        /// The configured maximum.
        max: u32,
    },

    /// The operation is not available in pipeline mode, where the
    /// subscription chain is fixed at construction.
    #[error("{operation} is not available in pipeline mode")]
    PipelineMode {
        /// The rejected operation.
        operation: &'static str,
    },

    /// The builder was not given a scheduler handle.
    #[error("builder requires a scheduler handle")]
    MissingScheduler,

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] strand_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_error_mapping() {
        assert_eq!(OfferError::from(AppendError::Full), OfferError::Full);
        assert_eq!(
            OfferError::from(AppendError::InvalidLength { length: 9, max: 4 }),
            OfferError::InvalidLength { length: 9, max: 4 }
        );
    }

    #[test]
    fn test_display() {
        let err = DispatchError::SubscriptionNotFound {
            name: "consumer-a".to_string(),
        };
        assert_eq!(format!("{err}"), "subscription 'consumer-a' not found");
    }
}
