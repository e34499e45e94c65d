//! Error types for smpmap.

use thiserror::Error;

/// Main error type for smpmap.
///
/// Per-task variants ([`SmpError::Computation`], [`SmpError::Protocol`] and
/// [`SmpError::InvalidInput`]) are yielded at the failed task's position and
/// the run continues. Every other variant ends the run.
#[derive(Error, Debug)]
pub enum SmpError {
    #[error("Unsupported platform: {0}. Process-based parallel map requires a Unix host.")]
    UnsupportedPlatform(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn worker for task #{index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker protocol violation in task #{index}: {reason}")]
    Protocol { index: usize, reason: String },

    #[error("Task #{index} failed: {message}")]
    Computation { index: usize, message: String },

    #[error("Task #{index} has an unserializable input: {reason}")]
    InvalidInput { index: usize, reason: String },

    #[error("{0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmpError {
    /// Submission index of the task this error belongs to, if any.
    pub fn task_index(&self) -> Option<usize> {
        match self {
            Self::Spawn { index, .. }
            | Self::Protocol { index, .. }
            | Self::Computation { index, .. }
            | Self::InvalidInput { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether this error only affects a single task.
    ///
    /// The controller keeps running after a task-scoped error.
    pub fn is_task_scoped(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. } | Self::Computation { .. } | Self::InvalidInput { .. }
        )
    }
}

/// Result type alias for smpmap operations.
pub type Result<T> = std::result::Result<T, SmpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_unsupported_platform_message() {
        let err = SmpError::UnsupportedPlatform("windows".to_string());
        let msg = err.to_string();
        assert!(msg.contains("windows"));
        assert!(msg.contains("Unix"));
        assert!(!err.is_task_scoped());
        assert_eq!(err.task_index(), None);
    }

    #[test]
    fn test_protocol_error_message() {
        let err = SmpError::Protocol {
            index: 5,
            reason: "channel closed after 3 of 16 header bytes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#5"));
        assert!(msg.contains("header bytes"));
        assert!(err.is_task_scoped());
        assert_eq!(err.task_index(), Some(5));
    }

    #[test]
    fn test_computation_error_message() {
        let err = SmpError::Computation {
            index: 2,
            message: "division by zero".to_string(),
        };
        assert_eq!(err.to_string(), "Task #2 failed: division by zero");
        assert!(err.is_task_scoped());
    }

    #[test]
    fn test_spawn_error_is_fatal() {
        let err = SmpError::Spawn {
            index: 7,
            source: io::Error::new(io::ErrorKind::WouldBlock, "too many processes"),
        };
        assert!(!err.is_task_scoped());
        assert_eq!(err.task_index(), Some(7));
        assert!(err.to_string().contains("too many processes"));
    }

    #[test]
    fn test_worker_message_passthrough() {
        let err = SmpError::Worker("custom worker error".to_string());
        assert_eq!(err.to_string(), "custom worker error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "sink closed");
        let err: SmpError = io_err.into();
        assert!(err.to_string().contains("sink closed"));
    }
}
