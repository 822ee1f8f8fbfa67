//! Sequence steps and their load-time validation
//!
//! A [`Sequence`] is plain data: hosts build it in code or deserialize it
//! from a document. The executor validates it on `load` and never mutates it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::beam::{BeamState, BeamStatus, Parameter, Species};
use crate::consts::MAX_MACRO_PARTICLES;
use crate::error::{Error, Observed, Result};

/// Tolerance for `==` / `!=` assertions on floating-point fields
pub const EQ_TOLERANCE: f64 = 1e-9;

/// Comparison operator for assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Less => lhs < rhs,
            Comparison::LessOrEqual => lhs <= rhs,
            Comparison::Greater => lhs > rhs,
            Comparison::GreaterOrEqual => lhs >= rhs,
            Comparison::Equal => (lhs - rhs).abs() <= EQ_TOLERANCE,
            Comparison::NotEqual => (lhs - rhs).abs() > EQ_TOLERANCE,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        }
    }
}

/// Predicate checked by an ASSERT_CONDITION step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Compare one beam field against a constant
    Compare {
        parameter: Parameter,
        comparison: Comparison,
        value: f64,
    },
    /// Require an exact safety status
    Status { status: BeamStatus },
}

impl Condition {
    pub fn compare(parameter: Parameter, comparison: Comparison, value: f64) -> Self {
        Condition::Compare {
            parameter,
            comparison,
            value,
        }
    }

    pub fn status(status: BeamStatus) -> Self {
        Condition::Status { status }
    }

    /// Evaluate against a snapshot, returning the verdict and what was looked at
    pub fn evaluate(&self, state: &BeamState) -> (bool, Observed) {
        match *self {
            Condition::Compare {
                parameter,
                comparison,
                value,
            } => {
                let observed = state.get(parameter);
                (comparison.holds(observed, value), Observed::Value(observed))
            }
            Condition::Status { status } => {
                (state.status == status, Observed::Status(state.status))
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare {
                parameter,
                comparison,
                value,
            } => write!(f, "{} {} {}", parameter, comparison.symbol(), value),
            Condition::Status { status } => write!(f, "status == {}", status),
        }
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Write one beam field
    SetParameter { parameter: Parameter, value: f64 },
    /// Hold for a span of simulated time
    Wait { duration: f64 },
    /// Fail the run unless the condition holds
    AssertCondition { condition: Condition },
    /// Move a field to `target` along an S-curve over `duration`
    RampParameter {
        parameter: Parameter,
        target: f64,
        duration: f64,
    },
    /// Replace the beam with a fresh bunch
    Inject { species: Species, count: usize },
    /// Dump the beam
    Extract,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::SetParameter { .. } => "SET_PARAMETER",
            StepKind::Wait { .. } => "WAIT",
            StepKind::AssertCondition { .. } => "ASSERT_CONDITION",
            StepKind::RampParameter { .. } => "RAMP_PARAMETER",
            StepKind::Inject { .. } => "INJECT",
            StepKind::Extract => "EXTRACT",
        }
    }
}

/// One operator-authored step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    #[serde(flatten)]
    pub kind: StepKind,
    /// Fail the run if the step is still active after this long
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl SequenceStep {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            timeout: None,
        }
    }

    pub fn set(parameter: Parameter, value: f64) -> Self {
        Self::new(StepKind::SetParameter { parameter, value })
    }

    pub fn wait(duration: f64) -> Self {
        Self::new(StepKind::Wait { duration })
    }

    pub fn assert(condition: Condition) -> Self {
        Self::new(StepKind::AssertCondition { condition })
    }

    pub fn ramp(parameter: Parameter, target: f64, duration: f64) -> Self {
        Self::new(StepKind::RampParameter {
            parameter,
            target,
            duration,
        })
    }

    pub fn inject(species: Species, count: usize) -> Self {
        Self::new(StepKind::Inject { species, count })
    }

    pub fn extract() -> Self {
        Self::new(StepKind::Extract)
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The beam field this step writes or inspects, if any
    pub fn target_parameter(&self) -> Option<Parameter> {
        match &self.kind {
            StepKind::SetParameter { parameter, .. }
            | StepKind::RampParameter { parameter, .. } => Some(*parameter),
            StepKind::AssertCondition {
                condition: Condition::Compare { parameter, .. },
            } => Some(*parameter),
            _ => None,
        }
    }

    /// Structural checks; value domains are left to the beam model
    pub fn validate(&self, index: usize) -> Result<()> {
        let invalid = |reason: String| Error::InvalidStep { index, reason };

        let finite = |what: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(invalid(format!("{what} must be finite, got {v}")))
            }
        };
        let span = |what: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(invalid(format!("{what} must be a non-negative duration, got {v}")))
            }
        };

        match &self.kind {
            StepKind::SetParameter { value, .. } => finite("value", *value)?,
            StepKind::Wait { duration } => span("duration", *duration)?,
            StepKind::AssertCondition {
                condition: Condition::Compare { value, .. },
            } => finite("value", *value)?,
            StepKind::RampParameter {
                target, duration, ..
            } => {
                finite("target", *target)?;
                span("duration", *duration)?;
            }
            StepKind::Inject { count, .. } => {
                if *count > MAX_MACRO_PARTICLES {
                    return Err(invalid(format!(
                        "bunch of {count} exceeds {MAX_MACRO_PARTICLES} macro-particles"
                    )));
                }
            }
            StepKind::AssertCondition { .. } | StepKind::Extract => {}
        }

        if let Some(timeout) = self.timeout {
            span("timeout", timeout)?;
        }
        Ok(())
    }
}

impl fmt::Display for SequenceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::SetParameter { parameter, value } => {
                write!(f, "SET_PARAMETER({parameter}, {value})")?
            }
            StepKind::Wait { duration } => write!(f, "WAIT({duration}s)")?,
            StepKind::AssertCondition { condition } => write!(f, "ASSERT_CONDITION({condition})")?,
            StepKind::RampParameter {
                parameter,
                target,
                duration,
            } => write!(f, "RAMP_PARAMETER({parameter} -> {target} over {duration}s)")?,
            StepKind::Inject { species, count } => write!(f, "INJECT({count} {species})")?,
            StepKind::Extract => write!(f, "EXTRACT")?,
        }
        if let Some(timeout) = self.timeout {
            write!(f, " [timeout {timeout}s]")?;
        }
        Ok(())
    }
}

/// Ordered list of steps, executed front to back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(default)]
    pub name: String,
    pub steps: Vec<SequenceStep>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<SequenceStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Reject empty sequences and malformed steps
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::EmptySequence);
        }
        self.steps
            .iter()
            .enumerate()
            .try_for_each(|(index, step)| step.validate(index))
    }

    /// Sum of all WAIT and RAMP durations (lower bound on run time)
    pub fn nominal_duration(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| match s.kind {
                StepKind::Wait { duration } | StepKind::RampParameter { duration, .. } => duration,
                _ => 0.0,
            })
            .sum()
    }
}

impl From<Vec<SequenceStep>> for Sequence {
    fn from(steps: Vec<SequenceStep>) -> Self {
        Self::new("", steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_holds() {
        assert!(Comparison::Greater.holds(5.0, 0.0));
        assert!(!Comparison::Greater.holds(0.0, 0.0));
        assert!(Comparison::GreaterOrEqual.holds(0.0, 0.0));
        assert!(Comparison::Less.holds(-1.0, 0.0));
        assert!(Comparison::Equal.holds(0.1 + 0.2, 0.3));
        assert!(Comparison::NotEqual.holds(1.0, 2.0));
    }

    #[test]
    fn test_condition_evaluate() {
        let state = BeamState {
            intensity: 5.0,
            ..Default::default()
        };
        let cond = Condition::compare(Parameter::Intensity, Comparison::Greater, 0.0);
        assert_eq!(cond.evaluate(&state), (true, Observed::Value(5.0)));

        let cond = Condition::status(BeamStatus::Fault);
        assert_eq!(
            cond.evaluate(&state),
            (false, Observed::Status(BeamStatus::Nominal))
        );
        assert_eq!(cond.to_string(), "status == FAULT");
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let seq = Sequence::default();
        assert!(matches!(seq.validate(), Err(Error::EmptySequence)));
    }

    #[test]
    fn test_step_validation() {
        assert!(SequenceStep::wait(-1.0).validate(0).is_err());
        assert!(SequenceStep::wait(f64::NAN).validate(0).is_err());
        assert!(SequenceStep::wait(0.0).validate(0).is_ok());
        assert!(SequenceStep::wait(1.0).with_timeout(-0.5).validate(0).is_err());
        assert!(SequenceStep::set(Parameter::Energy, f64::INFINITY).validate(0).is_err());
        assert!(SequenceStep::ramp(Parameter::Energy, 10.0, -2.0).validate(0).is_err());

        assert!(SequenceStep::inject(Species::Proton, MAX_MACRO_PARTICLES).validate(0).is_ok());
        assert!(matches!(
            SequenceStep::inject(Species::Proton, MAX_MACRO_PARTICLES + 1).validate(3),
            Err(Error::InvalidStep { index: 3, .. })
        ));

        // Domain errors are left for tick time
        assert!(SequenceStep::set(Parameter::Energy, -1.0).validate(0).is_ok());

        let seq = Sequence::from(vec![SequenceStep::wait(1.0), SequenceStep::wait(-1.0)]);
        match seq.validate() {
            Err(Error::InvalidStep { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidStep, got {other:?}"),
        }
    }

    #[test]
    fn test_target_parameter() {
        assert_eq!(
            SequenceStep::set(Parameter::Energy, 1.0).target_parameter(),
            Some(Parameter::Energy)
        );
        assert_eq!(SequenceStep::wait(1.0).target_parameter(), None);
        assert_eq!(
            SequenceStep::assert(Condition::compare(
                Parameter::Position,
                Comparison::Less,
                0.5
            ))
            .target_parameter(),
            Some(Parameter::Position)
        );
    }

    #[test]
    fn test_nominal_duration() {
        let seq = Sequence::from(vec![
            SequenceStep::wait(2.0),
            SequenceStep::set(Parameter::Energy, 1.0),
            SequenceStep::ramp(Parameter::Energy, 5.0, 1.5),
        ]);
        assert!((seq.nominal_duration() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_step_display() {
        let step = SequenceStep::wait(2.0).with_timeout(3.0);
        assert_eq!(step.to_string(), "WAIT(2s) [timeout 3s]");
        assert_eq!(
            SequenceStep::inject(Species::LeadIon, 10).to_string(),
            "INJECT(10 Lead Ion)"
        );
    }
}
