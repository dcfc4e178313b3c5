//! Autofocus error types
//!
//! Expected autofocus outcomes (a run that could not find focus) are reported
//! as [`crate::AutoFocusStep::Failed`], never as errors. The types here cover
//! configuration mistakes.

use thiserror::Error;

/// Errors raised by the autofocus core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FocusError {
    /// Autofocus options cannot drive a run
    #[error("Invalid autofocus options: {0}")]
    InvalidOptions(String),

    /// Backlash configuration is unusable
    #[error("Invalid backlash compensation: {0}")]
    InvalidBacklash(String),
}

/// Result type for autofocus operations
pub type FocusResult<T> = Result<T, FocusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FocusError::InvalidOptions("step size must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid autofocus options: step size must be positive");

        let err = FocusError::InvalidBacklash("backlash_in must be finite".to_string());
        assert_eq!(err.to_string(), "Invalid backlash compensation: backlash_in must be finite");
    }
}
