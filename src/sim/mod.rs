//! Deterministic simulation core
//!
//! Everything the host drives lives here. This module must stay pure:
//! - Time advances only through explicit ticks
//! - Seeded RNG only
//! - No I/O, no rendering, no timers

pub mod beam;
pub mod executor;
pub mod physics;
pub mod step;

pub use beam::{BeamModel, BeamState, BeamStatus, Parameter, SafetyLimits, Species};
pub use executor::{ExecutionContext, Executor, ExecutorEvent, Frame, HostCommand, RunState};
pub use step::{Comparison, Condition, Sequence, SequenceStep, StepKind};
