//! Error types for exprdiag.
//!
//! All errors are strongly typed using thiserror. Data problems found while
//! sampling (malformed gates, unknown prototypes, unknown context keys) are not
//! errors: they are logged and surfaced in the result. Only configuration
//! problems and isolated computation failures are represented here.

use thiserror::Error;

/// Validation errors raised before any sampling happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A `SimulationConfig` field is out of range.
    #[error("Invalid simulation config: {reason}")]
    InvalidSimulationConfig {
        /// Why it was rejected.
        reason: String,
    },

    /// The expression document could not be parsed.
    #[error("Invalid expression: {reason}")]
    InvalidExpression {
        /// Why it was rejected.
        reason: String,
    },

    /// A mood constraint names an unknown axis or a non-finite threshold.
    #[error("Invalid mood constraint on '{var_path}': {reason}")]
    InvalidMoodConstraint {
        /// Offending variable path.
        var_path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required field is absent.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// Worker or queue settings are unusable.
    #[error("Invalid runtime config: {reason}")]
    InvalidRuntimeConfig {
        /// Why it was rejected.
        reason: String,
    },
}

/// Execution errors that occur while computing diagnostics.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// One sweep candidate could not be computed.
    #[error("Sensitivity sweep failed for '{var_path}': {reason}")]
    SensitivityFailed {
        /// Offending variable path.
        var_path: String,
        /// What went wrong.
        reason: String,
    },

    /// A sweep was asked to run over no contexts.
    #[error("Population '{population}' is empty")]
    EmptyPopulation {
        /// Population label.
        population: String,
    },

    /// The runtime queue rejected a submission.
    #[error("Simulation queue full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// The worker dropped its result channel.
    #[error("Simulation worker disconnected")]
    Disconnected,

    /// A join gave up waiting.
    #[error("Simulation timed out after {duration_ms}ms")]
    Timeout {
        /// Time waited.
        duration_ms: u64,
    },

    /// The OS refused to start a worker thread.
    #[error("Failed to spawn simulation worker: {reason}")]
    WorkerSpawn {
        /// What went wrong.
        reason: String,
    },
}

/// Top-level error type for exprdiag.
#[derive(Debug, Error)]
pub enum DiagError {
    /// Rejected input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Failed computation.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// An unexpected internal state.
    #[error("Internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl DiagError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    ///
    /// The engine is deterministic: rerunning with the same seed reproduces the
    /// same failure. Only waiting on a busy worker can succeed on a later try.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(e, ExecutionError::Timeout { .. } | ExecutionError::QueueFull { .. }),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for exprdiag operations.
pub type DiagResult<T> = Result<T, DiagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_config() {
        let err = ValidationError::InvalidSimulationConfig {
            reason: "sample_count must be > 0".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("sample_count"));
        assert!(msg.contains("Invalid simulation config"));
    }

    #[test]
    fn test_validation_error_mood_constraint() {
        let err = ValidationError::InvalidMoodConstraint {
            var_path: "moodAxes.nope".to_string(),
            reason: "unknown axis".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("moodAxes.nope"));
        assert!(msg.contains("unknown axis"));
    }

    #[test]
    fn test_execution_error_sensitivity() {
        let err = ExecutionError::SensitivityFailed {
            var_path: "emotions.fear".to_string(),
            reason: "no resolvable values".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("emotions.fear"));
    }

    #[test]
    fn test_execution_error_timeout() {
        let err = ExecutionError::Timeout { duration_ms: 5000 };
        let msg = format!("{err}");
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_diag_error_from_validation() {
        let err: DiagError = ValidationError::MissingField {
            field: "id".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_diag_error_from_execution() {
        let err: DiagError = ExecutionError::Timeout { duration_ms: 10 }.into();
        assert!(err.is_execution());
        assert!(err.is_retryable());

        let err: DiagError = ExecutionError::Disconnected.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_diag_error_internal() {
        let err = DiagError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
