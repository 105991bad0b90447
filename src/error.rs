//! Error types for model tasks
//!
//! Every failure carries the [`Phase`] it happened in, so callers can tell a
//! misconfigured task from an exhausted device pool or a broken model.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceId;

/// Stage of a task invocation in which an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Task construction and static validation
    Configuration,
    /// Reading fields from the record
    Record,
    /// Input transforms and element-type cast
    Input,
    /// Waiting for a device from the pool
    Acquisition,
    /// Running the model on a borrowed device
    Execution,
    /// Output transforms and field assignment
    Output,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Configuration => "configuration",
            Phase::Record => "record",
            Phase::Input => "input",
            Phase::Acquisition => "acquisition",
            Phase::Execution => "execution",
            Phase::Output => "output",
        };
        f.write_str(name)
    }
}

/// Error type for all task failures.
///
/// | Kind | Variants | Retried? |
/// |------|----------|----------|
/// | Configuration | Config, Cardinality | never |
/// | Data | MissingField, Storage, Transform | never |
/// | Resource exhaustion | Exhausted, Cancelled | never, pool untouched |
/// | Execution | DeviceOpen, Execution | never, device already released |
#[derive(Debug, Error)]
pub enum TaskError {
    /// Invalid task configuration.
    #[error("{phase} error: {message}")]
    Config { phase: Phase, message: String },

    /// Field names and their transforms (or the model output) disagree on
    /// single-vs-list shape or on list length.
    #[error("{phase} error: cardinality mismatch, {left} vs {right}")]
    Cardinality {
        phase: Phase,
        left: String,
        right: String,
    },

    /// Input field absent from the record.
    #[error("record error: field '{field}' not found")]
    MissingField { field: String },

    /// A transform or dtype cast failed.
    #[error("{phase} error: transform #{index} failed: {source}")]
    Transform {
        phase: Phase,
        index: usize,
        #[source]
        source: candle_core::Error,
    },

    /// Retry budget used up without obtaining a device.
    #[error("acquisition error: no device after {tries} tries of {timeout:?}")]
    Exhausted { tries: u32, timeout: Duration },

    /// Cancelled while waiting for a device.
    #[error("acquisition error: cancelled after {tries} tries")]
    Cancelled { tries: u32 },

    /// Borrowed identifier could not be resolved to a device.
    #[error("execution error: failed to open {device}: {source}")]
    DeviceOpen {
        device: DeviceId,
        #[source]
        source: candle_core::Error,
    },

    /// The model failed (or panicked) while running on a device.
    #[error("execution error on {device}: {message}")]
    Execution { device: DeviceId, message: String },

    /// Record file could not be read or written.
    #[error("record error: {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: candle_core::Error,
    },
}

impl TaskError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        TaskError::Config {
            phase: Phase::Configuration,
            message: message.into(),
        }
    }

    /// Phase in which this error occurred
    pub fn phase(&self) -> Phase {
        match self {
            TaskError::Config { phase, .. }
            | TaskError::Cardinality { phase, .. }
            | TaskError::Transform { phase, .. } => *phase,
            TaskError::MissingField { .. } | TaskError::Storage { .. } => Phase::Record,
            TaskError::Exhausted { .. } | TaskError::Cancelled { .. } => Phase::Acquisition,
            TaskError::DeviceOpen { .. } | TaskError::Execution { .. } => Phase::Execution,
        }
    }

    /// True for errors that mean the task itself is misconfigured
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TaskError::Config { .. } | TaskError::Cardinality { .. }
        )
    }
}

/// Result alias for task operations
pub type Result<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_of_each_kind() {
        assert_eq!(TaskError::config("x").phase(), Phase::Configuration);
        assert_eq!(
            TaskError::Exhausted {
                tries: 3,
                timeout: Duration::from_secs(1)
            }
            .phase(),
            Phase::Acquisition
        );
        assert_eq!(
            TaskError::Execution {
                device: DeviceId::cpu(0),
                message: "boom".into()
            }
            .phase(),
            Phase::Execution
        );
        assert_eq!(
            TaskError::MissingField { field: "x".into() }.phase(),
            Phase::Record
        );
    }

    #[test]
    fn test_message_names_phase() {
        let err = TaskError::Cardinality {
            phase: Phase::Output,
            left: "list of 2".into(),
            right: "single".into(),
        };
        assert!(err.to_string().starts_with("output error"));
        assert!(err.is_configuration());
    }
}
