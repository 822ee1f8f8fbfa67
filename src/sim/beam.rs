//! Beam state and the physics model that owns it
//!
//! The model holds exactly one [`BeamState`]. Every mutation goes through a
//! validating operation and ends by re-deriving the safety status, so a
//! state handed out by [`BeamModel::snapshot`] is always self-consistent.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::physics::{energy_to_momentum, lorentz_factor, relativistic_beta};
use crate::consts::*;
use crate::error::{Error, Result};
use crate::settings::SimConfig;
use crate::wrap_position;

/// Safety classification of the beam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamStatus {
    #[default]
    Nominal,
    /// Within the warning margin of a fault threshold
    Warning,
    /// A hard safety threshold has been crossed
    Fault,
}

impl fmt::Display for BeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BeamStatus::Nominal => "NOMINAL",
            BeamStatus::Warning => "WARNING",
            BeamStatus::Fault => "FAULT",
        })
    }
}

/// Mutable beam fields, addressable by name from sequences and hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Longitudinal ring coordinate, normalized to [0, 1)
    Position,
    /// Kinetic energy (GeV)
    Energy,
    /// Beam intensity (macro-particles)
    Intensity,
}

impl Parameter {
    pub const ALL: [Parameter; 3] = [Parameter::Position, Parameter::Energy, Parameter::Intensity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Position => "position",
            Parameter::Energy => "energy",
            Parameter::Intensity => "intensity",
        }
    }

    /// Check a value against this field's domain
    pub fn validate(&self, value: f64) -> Result<()> {
        let reason = if !value.is_finite() {
            Some("must be finite")
        } else {
            match self {
                Parameter::Position if !(0.0..1.0).contains(&value) => Some("must be in [0, 1)"),
                Parameter::Energy | Parameter::Intensity if value < 0.0 => {
                    Some("must be non-negative")
                }
                _ => None,
            }
        };

        match reason {
            Some(reason) => Err(Error::InvalidParameter {
                parameter: *self,
                value,
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Parameter::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownParameter(s.to_string()))
    }
}

/// Particle species the ring can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    #[default]
    Proton,
    Electron,
    /// Fully stripped Pb-208
    LeadIon,
    Antiproton,
}

impl Species {
    /// Rest mass (GeV/c²)
    pub fn rest_mass(&self) -> f64 {
        match self {
            Species::Proton | Species::Antiproton => 0.938272,
            Species::Electron => 0.000511,
            Species::LeadIon => 193.7,
        }
    }

    /// Charge in units of the elementary charge
    pub fn charge(&self) -> f64 {
        match self {
            Species::Proton => 1.0,
            Species::Electron | Species::Antiproton => -1.0,
            Species::LeadIon => 82.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Proton => "Proton",
            Species::Electron => "Electron",
            Species::LeadIon => "Lead Ion",
            Species::Antiproton => "Antiproton",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the beam at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BeamState {
    /// Ring coordinate [0, 1)
    pub position: f64,
    /// Kinetic energy (GeV), never negative
    pub energy: f64,
    /// Intensity, never negative
    pub intensity: f64,
    /// Derived from the other fields after every mutation
    pub status: BeamStatus,
    pub species: Species,
}

impl BeamState {
    /// Read one mutable field
    pub fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Position => self.position,
            Parameter::Energy => self.energy,
            Parameter::Intensity => self.intensity,
        }
    }

    /// Relativistic beta of the beam's species at its energy
    pub fn beta(&self) -> f64 {
        relativistic_beta(self.energy, self.species.rest_mass())
    }

    pub fn gamma(&self) -> f64 {
        lorentz_factor(self.beta())
    }

    /// Momentum (GeV/c)
    pub fn momentum(&self) -> f64 {
        energy_to_momentum(self.energy, self.species.rest_mass())
    }

    /// Drift speed around the ring (ring lengths per simulated second)
    ///
    /// Scaled up from beta so the motion stays visible at low energy.
    pub fn drift_speed(&self) -> f64 {
        if self.energy <= 0.0 {
            0.0
        } else {
            MIN_DRIFT_SPEED + DRIFT_SPEED_SCALE * self.beta()
        }
    }
}

/// Fault and warning thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub energy_fault: f64,
    pub intensity_fault: f64,
    /// Fraction of a threshold below it that counts as WARNING
    pub warning_margin: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            energy_fault: ENERGY_FAULT_THRESHOLD,
            intensity_fault: INTENSITY_FAULT_THRESHOLD,
            warning_margin: WARNING_MARGIN,
        }
    }
}

impl SafetyLimits {
    /// Derive the status from energy and intensity
    pub fn classify(&self, energy: f64, intensity: f64) -> BeamStatus {
        if energy > self.energy_fault || intensity > self.intensity_fault {
            return BeamStatus::Fault;
        }
        let keep = 1.0 - self.warning_margin;
        if energy >= self.energy_fault * keep || intensity >= self.intensity_fault * keep {
            BeamStatus::Warning
        } else {
            BeamStatus::Nominal
        }
    }
}

/// Owner of the beam state and its transition rules
#[derive(Debug, Clone)]
pub struct BeamModel {
    state: BeamState,
    limits: SafetyLimits,
    decay_rate: f64,
    seed: u64,
    /// Number of injections so far (varies the bunch between injections)
    injections: u64,
    /// Macro-particle ring positions, drifting with the centroid
    particles: Vec<f64>,
}

impl Default for BeamModel {
    fn default() -> Self {
        Self::new(&SimConfig::default())
    }
}

impl BeamModel {
    /// Create an empty, de-energized beam using the given configuration
    pub fn new(config: &SimConfig) -> Self {
        let limits = config.limits();
        let mut state = BeamState::default();
        state.status = limits.classify(state.energy, state.intensity);
        Self {
            state,
            limits,
            decay_rate: config.decay_rate,
            seed: config.seed,
            injections: 0,
            particles: Vec::new(),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> BeamState {
        self.state
    }

    pub fn status(&self) -> BeamStatus {
        self.state.status
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Macro-particle positions for rendering
    pub fn particles(&self) -> &[f64] {
        &self.particles
    }

    /// Write one field; rejected values leave the state untouched
    pub fn set_parameter(&mut self, parameter: Parameter, value: f64) -> Result<()> {
        parameter.validate(value)?;
        match parameter {
            Parameter::Position => {
                let shift = value - self.state.position;
                for p in &mut self.particles {
                    *p = wrap_position(*p + shift);
                }
                self.state.position = value;
            }
            Parameter::Energy => self.state.energy = value,
            Parameter::Intensity => self.state.intensity = value,
        }
        self.refresh_status();
        Ok(())
    }

    /// Write one field addressed by name (manual operator overrides)
    pub fn set_named(&mut self, name: &str, value: f64) -> Result<()> {
        let parameter: Parameter = name.parse()?;
        self.set_parameter(parameter, value)
    }

    /// Advance simulated time: drift around the ring and attenuate intensity
    pub fn advance(&mut self, delta_time: f64) -> Result<()> {
        if !delta_time.is_finite() || delta_time < 0.0 {
            return Err(Error::InvalidTimeDelta(delta_time));
        }
        if delta_time == 0.0 {
            return Ok(());
        }

        let step = self.state.drift_speed() * delta_time;
        self.state.position = wrap_position(self.state.position + step);
        for p in &mut self.particles {
            *p = wrap_position(*p + step);
        }

        self.state.intensity *= (-self.decay_rate * delta_time).exp();
        self.refresh_status();
        Ok(())
    }

    /// Replace the beam with a fresh bunch at the injection point
    ///
    /// Returns the number of macro-particles injected. A bunch larger than
    /// [`MAX_MACRO_PARTICLES`] is rejected and the beam is left untouched.
    pub fn inject(&mut self, species: Species, count: usize) -> Result<usize> {
        if count > MAX_MACRO_PARTICLES {
            return Err(Error::InvalidParameter {
                parameter: Parameter::Intensity,
                value: count as f64,
                reason: "exceeds the macro-particle limit",
            });
        }

        let mut rng = Pcg32::seed_from_u64(self.seed.wrapping_add(self.injections));
        self.injections += 1;

        self.particles = (0..count)
            .map(|_| {
                let offset = rng.random_range(-INJECTION_SPREAD..=INJECTION_SPREAD);
                wrap_position(INJECTION_POSITION + offset)
            })
            .collect();

        self.state.species = species;
        self.state.position = INJECTION_POSITION;
        self.state.intensity = count as f64;
        self.refresh_status();
        log::debug!("Injected {} {} macro-particles", count, species);
        Ok(count)
    }

    /// Dump the beam; returns how many macro-particles were extracted
    pub fn extract(&mut self) -> usize {
        let count = self.particles.len();
        self.particles.clear();
        self.state.intensity = 0.0;
        self.refresh_status();
        log::debug!("Extracted {} macro-particles", count);
        count
    }

    fn refresh_status(&mut self) {
        self.state.status = self.limits.classify(self.state.energy, self.state.intensity);
    }
}
