//! Beam Sequencer - operator sequences against a simplified beam model
//!
//! Core modules:
//! - `sim`: Deterministic core (beam model, sequence steps, executor)
//! - `settings`: Tunable simulation configuration
//! - `script`: JSON sequence documents
//! - `error`: Error taxonomy shared by every layer
//!
//! The core is single-threaded and cooperative: nothing advances unless the
//! host calls [`sim::Executor::tick`] (or [`sim::Executor::run`]).

pub mod error;
pub mod script;
pub mod settings;
pub mod sim;

pub use error::{Error, Result, StepFailure};
pub use settings::SimConfig;
pub use sim::{
    BeamModel, BeamState, BeamStatus, Condition, Executor, ExecutorEvent, Frame, HostCommand,
    Parameter, RunState, Sequence, SequenceStep, Species, StepKind,
};

/// Simulation configuration constants
pub mod consts {
    /// Default host tick interval (seconds of simulated time per tick)
    pub const DEFAULT_TICK_INTERVAL: f64 = 0.1;

    /// Energy above which the beam is in FAULT (GeV)
    pub const ENERGY_FAULT_THRESHOLD: f64 = 100.0;
    /// Intensity above which the beam is in FAULT (macro-particles)
    pub const INTENSITY_FAULT_THRESHOLD: f64 = 1000.0;
    /// WARNING band below each fault threshold, as a fraction of the threshold
    pub const WARNING_MARGIN: f64 = 0.1;

    /// Intensity attenuation rate (per simulated second)
    pub const DECAY_RATE: f64 = 0.01;

    /// Ring position of the injection point (normalized circumference)
    pub const INJECTION_POSITION: f64 = 0.01;
    /// Half-width of the injected bunch around the injection point
    pub const INJECTION_SPREAD: f64 = 0.01;
    /// Largest bunch a single injection may create
    pub const MAX_MACRO_PARTICLES: usize = 100_000;

    /// Drift speed floor for any beam with positive energy (ring lengths/s)
    pub const MIN_DRIFT_SPEED: f64 = 0.1;
    /// Drift speed added at beta = 1
    pub const DRIFT_SPEED_SCALE: f64 = 0.9;
}

/// Wrap a ring coordinate to [0, 1)
#[inline]
pub fn wrap_position(position: f64) -> f64 {
    let wrapped = position.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 { 0.0 } else { wrapped }
}
