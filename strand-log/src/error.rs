//! Append error types.

use std::fmt;

/// Result type for append operations.
pub type AppendResult<T> = Result<T, AppendError>;

/// Errors surfaced by the appender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendError {
    /// Insufficient capacity: the claim would overtake the slowest
    /// subscription, or the next partition has not been reclaimed yet.
    /// Transient; producers retry once consumers advance.
    Full,

    /// The requested length is zero or exceeds the maximum frame
    /// length. Rejected synchronously; retrying cannot succeed.
    InvalidLength {
        /// The requested payload length.
        length: usize,
        /// The maximum allowed payload length.
        max: usize,
    },
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "insufficient capacity"),
            Self::InvalidLength { length, max } => {
                write!(f, "invalid claim length {length}: must be in 1..={max}")
            }
        }
    }
}

impl std::error::Error for AppendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", AppendError::Full), "insufficient capacity");
        let err = AppendError::InvalidLength {
            length: 0,
            max: 256,
        };
        assert!(format!("{err}").contains("1..=256"));
    }
}
