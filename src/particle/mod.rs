//! # Particle Module
//!
//! Static lepton definitions and the mutable state carried through a
//! propagation.
//!
//! ## Kinematics
//!
//! p = √(E² - m²), β = p/E, γ = E/m. The decay length of a particle with
//! lifetime τ is βγcτ = (p/m)·cτ.

use crate::constants::*;
use crate::decay::DecayTable;
use crate::error::{PropagationError, Result};
use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource};
use crate::types::Vec3;

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Immutable particle type
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleDef {
    pub name: String,
    /// Rest mass (MeV)
    pub mass: f64,
    /// Charge (e)
    pub charge: f64,
    /// Mean lifetime at rest (s), None if stable
    pub lifetime: Option<f64>,
    /// Energy below which propagation stops (MeV)
    pub low: f64,
    pub decay_table: DecayTable,
}

impl ParticleDef {
    fn lepton(name: &str, mass: f64, charge: f64, lifetime: Option<f64>, decay_table: DecayTable) -> Self {
        Self {
            name: name.to_string(),
            mass,
            charge,
            lifetime,
            low: 1.1 * mass,
            decay_table,
        }
    }

    pub fn mu_minus() -> Self {
        Self::lepton("MuMinus", MMU, -1.0, Some(LIFETIME_MU), DecayTable::muon())
    }

    pub fn mu_plus() -> Self {
        Self::lepton("MuPlus", MMU, 1.0, Some(LIFETIME_MU), DecayTable::muon())
    }

    pub fn tau_minus() -> Self {
        Self::lepton("TauMinus", MTAU, -1.0, Some(LIFETIME_TAU), DecayTable::tau())
    }

    pub fn tau_plus() -> Self {
        Self::lepton("TauPlus", MTAU, 1.0, Some(LIFETIME_TAU), DecayTable::tau())
    }

    pub fn e_minus() -> Self {
        Self { low: 1.0, ..Self::lepton("EMinus", ME, -1.0, None, DecayTable::stable()) }
    }

    pub fn e_plus() -> Self {
        Self { low: 1.0, ..Self::lepton("EPlus", ME, 1.0, None, DecayTable::stable()) }
    }

    /// Look up a preset by name, case-insensitive
    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "muminus" | "mu-" => Ok(Self::mu_minus()),
            "muplus" | "mu+" => Ok(Self::mu_plus()),
            "tauminus" | "tau-" => Ok(Self::tau_minus()),
            "tauplus" | "tau+" => Ok(Self::tau_plus()),
            "eminus" | "e-" => Ok(Self::e_minus()),
            "eplus" | "e+" => Ok(Self::e_plus()),
            _ => Err(PropagationError::UnknownParticle(name.to_string())),
        }
    }

    /// Override the low-energy cutoff (MeV); never below the rest mass
    pub fn with_low(mut self, low: f64) -> Self {
        self.low = low.max(self.mass);
        self
    }

    pub fn is_stable(&self) -> bool {
        self.lifetime.is_none() || self.decay_table.is_stable()
    }

    /// Momentum at total energy E (MeV)
    pub fn momentum(&self, energy: f64) -> f64 {
        (energy * energy - self.mass * self.mass).max(0.0).sqrt()
    }
}

impl FingerprintSource for ParticleDef {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        builder
            .text("particle", &self.name)
            .number("mass", self.mass)
            .number("charge", self.charge)
            .number("lifetime", self.lifetime.unwrap_or(-1.0))
            .number("low", self.low)
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Dynamic state of one propagated particle
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    /// Total energy (MeV)
    pub energy: f64,
    /// Position (cm)
    pub position: Vec3,
    /// Unit direction
    pub direction: Vec3,
    /// Elapsed time (s)
    pub time: f64,
    /// Propagated path length (cm)
    pub propagated_distance: f64,
    /// Energy cutoff (MeV)
    pub low: f64,
    /// Lifetime at rest (s), None if the particle does not decay
    pub lifetime: Option<f64>,
    /// Rest mass (MeV)
    pub mass: f64,
}

impl ParticleState {
    pub fn new(def: &ParticleDef, energy: f64, position: Vec3, direction: Vec3) -> Self {
        Self {
            energy,
            position,
            direction: direction.normalize(),
            time: 0.0,
            propagated_distance: 0.0,
            low: def.low,
            lifetime: if def.is_stable() { None } else { def.lifetime },
            mass: def.mass,
        }
    }

    /// Momentum (MeV)
    pub fn momentum(&self) -> f64 {
        (self.energy * self.energy - self.mass * self.mass).max(0.0).sqrt()
    }

    pub fn beta(&self) -> f64 {
        if self.energy > 0.0 {
            self.momentum() / self.energy
        } else {
            0.0
        }
    }

    pub fn gamma(&self) -> f64 {
        self.energy / self.mass
    }

    pub fn is_stopped(&self) -> bool {
        self.energy <= self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_presets() {
        let mu = ParticleDef::mu_minus();
        assert_relative_eq!(mu.mass, MMU);
        assert!(mu.low > mu.mass);
        assert!(!mu.is_stable());
        assert!(ParticleDef::e_minus().is_stable());
        assert_eq!(ParticleDef::tau_plus().charge, 1.0);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(ParticleDef::by_name("MuMinus").map(|p| p.name).ok(), Some("MuMinus".to_string()));
        assert_eq!(ParticleDef::by_name("e+").map(|p| p.charge).ok(), Some(1.0));
        assert!(matches!(ParticleDef::by_name("photon"), Err(PropagationError::UnknownParticle(_))));
    }

    #[test]
    fn test_low_not_below_mass() {
        let mu = ParticleDef::mu_minus().with_low(1.0);
        assert_relative_eq!(mu.low, MMU);
    }

    #[test]
    fn test_kinematics() {
        let def = ParticleDef::mu_minus();
        let state = ParticleState::new(&def, 10.0 * MMU, Vec3::zero(), Vec3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(state.gamma(), 10.0, max_relative = 1e-12);
        assert_relative_eq!(state.beta(), (1.0 - 0.01f64).sqrt(), max_relative = 1e-12);
        assert_relative_eq!(state.direction.mag(), 1.0, max_relative = 1e-12);
        assert_relative_eq!(state.momentum(), def.momentum(10.0 * MMU));
    }

    #[test]
    fn test_fingerprint_depends_on_cutoff() {
        let a = ParticleDef::mu_minus().fingerprint_into(FingerprintBuilder::new("p")).finish();
        let b = ParticleDef::mu_minus().with_low(500.0).fingerprint_into(FingerprintBuilder::new("p")).finish();
        assert_ne!(a, b);
    }
}
