use thiserror::Error;

/// Result type for valve operations
pub type Result<T> = std::result::Result<T, ValveError>;

/// Errors returned by valve operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValveError {
    /// The input queue was full when a non-blocking add was attempted
    #[error("Unable to enqueue: input queue is full")]
    UnableToEnqueue,

    /// The cancellation signal was fired
    #[error("Operation cancelled")]
    Cancelled,

    /// The cancellation signal's deadline elapsed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A task thread could not be spawned or panicked
    #[error("Thread error: {0}")]
    Thread(String),
}

impl ValveError {
    /// Whether this error means the caller's cancellation signal fired
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ValveError::Cancelled | ValveError::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_kind() {
        assert!(ValveError::Cancelled.is_cancellation());
        assert!(ValveError::DeadlineExceeded.is_cancellation());
        assert!(!ValveError::UnableToEnqueue.is_cancellation());
        assert!(!ValveError::Config("x".into()).is_cancellation());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ValveError::UnableToEnqueue.to_string(),
            "Unable to enqueue: input queue is full"
        );
        assert_eq!(
            ValveError::Config("batch_size must be positive".into()).to_string(),
            "Configuration error: batch_size must be positive"
        );
    }
}
