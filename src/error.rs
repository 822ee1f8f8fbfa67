//! Errors for the beam model, the executor, and sequence loading
//!
//! Two families:
//! - [`Error`]: caller misuse, returned synchronously. The operation that
//!   returned it left all state unchanged.
//! - [`StepFailure`]: a step failed while a sequence was running. These are
//!   never returned from `tick`; they are recorded as the run's `last_error`
//!   and the run state becomes `Failed`.

use serde::Serialize;
use thiserror::Error;

use crate::sim::{BeamStatus, Condition, Parameter, RunState};

/// Crate result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported synchronously to the caller
#[derive(Debug, Error)]
pub enum Error {
    /// The value is outside the parameter's domain
    #[error("invalid value {value} for {parameter}: {reason}")]
    InvalidParameter {
        parameter: Parameter,
        value: f64,
        reason: &'static str,
    },

    /// The name does not match any mutable beam field
    #[error("unknown parameter: {0:?}")]
    UnknownParameter(String),

    /// Simulated time cannot run backwards
    #[error("invalid time delta: {0}")]
    InvalidTimeDelta(f64),

    /// A sequence must hold at least one step
    #[error("sequence has no steps")]
    EmptySequence,

    /// The operation is not allowed from the executor's current state
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: RunState,
    },

    /// A step payload failed load-time validation
    #[error("step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for both out-of-domain values and unrecognized parameter names
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::InvalidParameter { .. } | Error::UnknownParameter(_))
    }
}

/// Why a running sequence stopped in the `Failed` state
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum StepFailure {
    /// The model refused a parameter write
    #[error("step {step}: {parameter} rejected value {value}: {reason}")]
    ParameterRejected {
        step: usize,
        parameter: Parameter,
        value: f64,
        reason: &'static str,
    },

    /// An assertion evaluated false against the beam snapshot
    #[error("step {step}: assertion {condition} failed (observed {observed})")]
    AssertionFailed {
        step: usize,
        condition: Condition,
        observed: Observed,
    },

    /// The step ran longer than its timeout
    #[error("step {step}: timed out after {elapsed:.3}s (limit {timeout:.3}s)")]
    Timeout {
        step: usize,
        elapsed: f64,
        timeout: f64,
    },
}

impl StepFailure {
    /// Index of the step that failed
    pub fn step(&self) -> usize {
        match self {
            StepFailure::ParameterRejected { step, .. }
            | StepFailure::AssertionFailed { step, .. }
            | StepFailure::Timeout { step, .. } => *step,
        }
    }
}

/// The value an assertion looked at
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Observed {
    Value(f64),
    Status(BeamStatus),
}

impl std::fmt::Display for Observed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observed::Value(v) => write!(f, "{v}"),
            Observed::Status(s) => write!(f, "{s}"),
        }
    }
}
