//! Relativistic helpers for the beam model
//!
//! Natural units throughout: energies and masses in GeV, c = 1.
//! Illustrative only, good enough to make the drift speed depend on energy.

use std::f64::consts::PI;

/// Relativistic beta (v/c) for a kinetic energy and rest mass
pub fn relativistic_beta(kinetic_energy: f64, rest_mass: f64) -> f64 {
    if kinetic_energy <= 0.0 || rest_mass <= 0.0 {
        return 0.0;
    }
    let gamma = (kinetic_energy + rest_mass) / rest_mass;
    let beta_squared = 1.0 - 1.0 / (gamma * gamma);
    // Floating point can dip just below zero for tiny energies
    beta_squared.max(0.0).sqrt()
}

/// Lorentz factor for a given beta (infinite at beta >= 1)
pub fn lorentz_factor(beta: f64) -> f64 {
    if beta >= 1.0 {
        return f64::INFINITY;
    }
    1.0 / (1.0 - beta * beta).sqrt()
}

/// Momentum (GeV/c) from kinetic energy and rest mass
pub fn energy_to_momentum(kinetic_energy: f64, rest_mass: f64) -> f64 {
    let total = kinetic_energy.max(0.0) + rest_mass;
    (total * total - rest_mass * rest_mass).max(0.0).sqrt()
}

/// Smooth S-curve ramp profile, 0 at t=0 and 1 at t=1
///
/// `t` is clamped to [0, 1].
pub fn ramp_profile(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    0.5 * (1.0 - (PI * t).cos())
}
