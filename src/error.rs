use std::fmt::{self, Display};
use std::io;

use crate::disease::DiseaseState;
use crate::mobility::PersonId;

/// Provides `SimError` and maps to other errors to
/// convert to a `SimError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum SimError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    EncodeError(bincode::error::EncodeError),
    DecodeError(bincode::error::DecodeError),
    /// Malformed or missing mobility/simulation parameters, detected before any event runs.
    ConfigError(String),
    /// A delay distribution produced a negative or non-finite sample.
    InvalidDistributionSample {
        distribution: &'static str,
        value: f64,
    },
    /// A transition was attempted from a terminal state or from a state the person is not in.
    InvalidTransitionError {
        person: PersonId,
        current: DiseaseState,
        from: DiseaseState,
        to: DiseaseState,
        time: f64,
    },
    /// A plan was scheduled at a NaN time or before the current time.
    InvalidPlanTime { time: f64, current_time: f64 },
    EmptyQueueError,
    /// Fewer than two rollouts completed; the spread across rollouts cannot be estimated.
    InsufficientRolloutsError { completed: usize },
    /// The first rollout that failed during an orchestration run.
    RolloutError {
        rollout: usize,
        source: Box<SimError>,
    },
    /// Execution was stopped by a cancellation signal or deadline.
    Cancelled,
}

impl From<io::Error> for SimError {
    fn from(error: io::Error) -> Self {
        SimError::IoError(error)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(error: serde_json::Error) -> Self {
        SimError::JsonError(error)
    }
}

impl From<csv::Error> for SimError {
    fn from(error: csv::Error) -> Self {
        SimError::CSVError(error)
    }
}

impl From<bincode::error::EncodeError> for SimError {
    fn from(error: bincode::error::EncodeError) -> Self {
        SimError::EncodeError(error)
    }
}

impl From<bincode::error::DecodeError> for SimError {
    fn from(error: bincode::error::DecodeError) -> Self {
        SimError::DecodeError(error)
    }
}

impl From<String> for SimError {
    fn from(error: String) -> Self {
        SimError::ConfigError(error)
    }
}

impl From<&str> for SimError {
    fn from(error: &str) -> Self {
        SimError::ConfigError(error.to_string())
    }
}

impl SimError {
    /// Returns true for the cooperative stop signal, which is not a failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SimError::Cancelled)
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::IoError(error) => Some(error),
            SimError::JsonError(error) => Some(error),
            SimError::CSVError(error) => Some(error),
            SimError::EncodeError(error) => Some(error),
            SimError::DecodeError(error) => Some(error),
            SimError::RolloutError { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimError::IoError(error) => write!(f, "I/O error: {error}"),
            SimError::JsonError(error) => write!(f, "JSON error: {error}"),
            SimError::CSVError(error) => write!(f, "CSV error: {error}"),
            SimError::EncodeError(error) => write!(f, "encoding error: {error}"),
            SimError::DecodeError(error) => write!(f, "decoding error: {error}"),
            SimError::ConfigError(message) => write!(f, "configuration error: {message}"),
            SimError::InvalidDistributionSample {
                distribution,
                value,
            } => write!(f, "distribution `{distribution}` sampled invalid delay {value}"),
            SimError::InvalidTransitionError {
                person,
                current,
                from,
                to,
                time,
            } => write!(
                f,
                "invalid transition {from} -> {to} for {person:?} at t={time} (currently {current})"
            ),
            SimError::InvalidPlanTime { time, current_time } => {
                write!(f, "cannot plan at t={time} when current time is {current_time}")
            }
            SimError::EmptyQueueError => write!(f, "popped from an empty event queue"),
            SimError::InsufficientRolloutsError { completed } => write!(
                f,
                "at least 2 rollouts are required to estimate variance, {completed} completed"
            ),
            SimError::RolloutError { rollout, source } => {
                write!(f, "rollout {rollout} failed: {source}")
            }
            SimError::Cancelled => write!(f, "execution cancelled"),
        }
    }
}
