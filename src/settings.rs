//! Simulation configuration
//!
//! Loaded from JSON by the host; every field has a default so a partial
//! file only overrides what it names.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Error, Result};
use crate::sim::SafetyLimits;

/// Tunable simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // === Safety ===
    /// Energy above which the beam faults (GeV)
    pub energy_fault_threshold: f64,
    /// Intensity above which the beam faults
    pub intensity_fault_threshold: f64,
    /// WARNING band below each threshold (fraction, 0.0 - 1.0)
    pub warning_margin: f64,

    // === Physics ===
    /// Intensity attenuation per simulated second
    pub decay_rate: f64,

    // === Host ===
    /// Simulated seconds per tick
    pub tick_interval: f64,
    /// Bunch injection seed
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            energy_fault_threshold: ENERGY_FAULT_THRESHOLD,
            intensity_fault_threshold: INTENSITY_FAULT_THRESHOLD,
            warning_margin: WARNING_MARGIN,
            decay_rate: DECAY_RATE,
            tick_interval: DEFAULT_TICK_INTERVAL,
            seed: 0,
        }
    }
}

impl SimConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{name} must be positive, got {v}")))
            }
        };
        positive("energy_fault_threshold", self.energy_fault_threshold)?;
        positive("intensity_fault_threshold", self.intensity_fault_threshold)?;
        positive("tick_interval", self.tick_interval)?;

        if !(0.0..1.0).contains(&self.warning_margin) {
            return Err(Error::InvalidConfig(format!(
                "warning_margin must be in [0, 1), got {}",
                self.warning_margin
            )));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "decay_rate must be non-negative, got {}",
                self.decay_rate
            )));
        }
        Ok(())
    }

    /// Thresholds used by the beam model
    pub fn limits(&self) -> SafetyLimits {
        SafetyLimits {
            energy_fault: self.energy_fault_threshold,
            intensity_fault: self.intensity_fault_threshold,
            warning_margin: self.warning_margin,
        }
    }
}
