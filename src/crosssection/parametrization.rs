//! Differential cross sections dσ/dv per target atom (cm²), v = ΔE/E.
//!
//! Ionization uses the leading Bethe-Bhabha term for a spin-½ projectile,
//! bremsstrahlung the complete-screening Tsai form with optional LPM
//! suppression. Bhabha and Møller scattering follow the exact QED
//! expressions and describe positrons and electrons respectively.

use std::sync::Arc;

use crate::constants::*;
use crate::cuts::EnergyCutSettings;
use crate::error::{PropagationError, Result};
use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource};
use crate::medium::{Component, Medium};
use crate::particle::ParticleDef;

/// Integration limits in v at one energy, v_min ≤ v_up ≤ v_max
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegralLimits {
    pub v_min: f64,
    /// Boundary between continuous and stochastic losses
    pub v_up: f64,
    pub v_max: f64,
}

impl IntegralLimits {
    /// Order raw kinematic limits and place the cut between them
    fn new(v_min: f64, v_max: f64, cut: f64) -> Self {
        let v_max = v_max.clamp(0.0, 1.0);
        let v_min = v_min.clamp(0.0, v_max);
        let v_up = cut.min(v_max).max(v_min);
        Self { v_min, v_up, v_max }
    }

    /// No phase space above the cut
    pub fn is_collapsed(&self) -> bool {
        !(self.v_up > 0.0) || self.v_up >= self.v_max
    }
}

/// What every process is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSetup {
    pub particle: ParticleDef,
    pub medium: Arc<Medium>,
    pub cuts: Arc<EnergyCutSettings>,
    /// Scales every rate; ≤ 0 disables the process
    pub multiplier: f64,
}

impl ProcessSetup {
    pub fn new(particle: ParticleDef, medium: Arc<Medium>, cuts: Arc<EnergyCutSettings>) -> Self {
        Self { particle, medium, cuts, multiplier: 1.0 }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl FingerprintSource for ProcessSetup {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        let builder = self.particle.fingerprint_into(builder);
        let builder = self.medium.fingerprint_into(builder);
        self.cuts.fingerprint_into(builder).number("multiplier", self.multiplier)
    }
}

// ============================================================================
// PROCESSES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Parametrization {
    Ionization(ProcessSetup),
    Bremsstrahlung {
        setup: ProcessSetup,
        lpm: bool,
        /// E_LPM of the projectile in this medium (MeV)
        lpm_energy: f64,
    },
    BhabhaScattering {
        setup: ProcessSetup,
        /// Smallest sampled energy transfer (MeV)
        threshold: f64,
    },
    MollerScattering {
        setup: ProcessSetup,
        threshold: f64,
    },
}

impl Parametrization {
    pub fn ionization(setup: ProcessSetup) -> Self {
        Parametrization::Ionization(setup)
    }

    pub fn bremsstrahlung(setup: ProcessSetup, lpm: bool) -> Self {
        let ratio = setup.particle.mass / ME;
        let lpm_energy = E_LPM_PER_CM * setup.medium.radiation_length() * ratio * ratio;
        Parametrization::Bremsstrahlung { setup, lpm, lpm_energy }
    }

    /// e⁺e⁻ scattering, positive projectiles only
    pub fn bhabha(setup: ProcessSetup, threshold: f64) -> Result<Self> {
        check_electron_like(&setup.particle, "bhabhascattering", 1.0)?;
        Ok(Parametrization::BhabhaScattering { setup, threshold })
    }

    /// e⁻e⁻ scattering, negative projectiles only
    pub fn moller(setup: ProcessSetup, threshold: f64) -> Result<Self> {
        check_electron_like(&setup.particle, "mollerscattering", -1.0)?;
        Ok(Parametrization::MollerScattering { setup, threshold })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Parametrization::Ionization(_) => "ionization",
            Parametrization::Bremsstrahlung { .. } => "bremsstrahlung",
            Parametrization::BhabhaScattering { .. } => "bhabhascattering",
            Parametrization::MollerScattering { .. } => "mollerscattering",
        }
    }

    pub fn setup(&self) -> &ProcessSetup {
        match self {
            Parametrization::Ionization(setup)
            | Parametrization::Bremsstrahlung { setup, .. }
            | Parametrization::BhabhaScattering { setup, .. }
            | Parametrization::MollerScattering { setup, .. } => setup,
        }
    }

    pub fn particle(&self) -> &ParticleDef {
        &self.setup().particle
    }

    pub fn medium(&self) -> &Medium {
        &self.setup().medium
    }

    pub fn multiplier(&self) -> f64 {
        self.setup().multiplier
    }

    pub fn lpm(&self) -> bool {
        matches!(self, Parametrization::Bremsstrahlung { lpm: true, .. })
    }

    pub fn is_enabled(&self) -> bool {
        self.multiplier() > 0.0
    }

    /// Limits at energy E (MeV) for `component`
    pub fn limits(&self, energy: f64, component: usize) -> IntegralLimits {
        let setup = self.setup();
        let cut = setup.cuts.cut(energy);
        let Some(target) = setup.medium.components().get(component) else {
            return IntegralLimits::new(0.0, 0.0, cut);
        };
        let mass = setup.particle.mass;

        match self {
            Parametrization::Ionization(_) => {
                let p2 = (energy * energy - mass * mass).max(0.0);
                let t_max = 2.0 * ME * p2 / (mass * mass + ME * ME + 2.0 * ME * energy);
                let excitation = EXCITATION_SCALE * target.charge.powf(0.9);
                IntegralLimits::new(excitation / energy, t_max / energy, cut)
            }
            Parametrization::Bremsstrahlung { .. } => {
                let v_max = 1.0 - 0.75 * EULER_E.sqrt() * (mass / energy) * target.charge.cbrt();
                IntegralLimits::new(0.0, v_max, cut)
            }
            Parametrization::BhabhaScattering { threshold, .. } => {
                IntegralLimits::new((threshold / energy).min(1.0), 1.0 - ME / energy, cut)
            }
            Parametrization::MollerScattering { threshold, .. } => {
                IntegralLimits::new((threshold / energy).min(1.0), 0.5 * (1.0 - ME / energy), cut)
            }
        }
    }

    /// dσ/dv per atom (cm²), without the multiplier
    pub fn differential(&self, energy: f64, v: f64, component: usize) -> f64 {
        let setup = self.setup();
        let Some(target) = setup.medium.components().get(component) else {
            return 0.0;
        };
        if !(v > 0.0) || v >= 1.0 {
            return 0.0;
        }

        let value = match self {
            Parametrization::Ionization(_) => ionization(&setup.particle, target, energy, v),
            Parametrization::Bremsstrahlung { lpm, lpm_energy, .. } => {
                let base = bremsstrahlung(setup.particle.mass, target, v);
                if *lpm {
                    base * (v * lpm_energy / energy).sqrt().min(1.0)
                } else {
                    base
                }
            }
            Parametrization::BhabhaScattering { .. } => bhabha(target, energy, v),
            Parametrization::MollerScattering { .. } => moller(target, energy, v),
        };
        if value.is_finite() {
            value.max(0.0)
        } else {
            0.0
        }
    }

    /// v · dσ/dv, the integrand of the continuous rate
    pub fn dedx_integrand(&self, energy: f64, v: f64, component: usize) -> f64 {
        v * self.differential(energy, v, component)
    }
}

fn check_electron_like(particle: &ParticleDef, process: &str, sign: f64) -> Result<()> {
    let reason = if particle.charge == 0.0 {
        Some("requires a charged particle")
    } else if particle.charge.signum() != sign {
        Some(if sign > 0.0 { "requires a positive charge" } else { "requires a negative charge" })
    } else if (particle.mass - ME).abs() > 1e-6 * ME {
        Some("requires an electron mass projectile")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PropagationError::InvalidParticle {
            process: process.to_string(),
            particle: particle.name.clone(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn ionization(particle: &ParticleDef, target: &Component, energy: f64, v: f64) -> f64 {
    let mass = particle.mass;
    let gamma = energy / mass;
    let beta2 = 1.0 - 1.0 / (gamma * gamma);
    if !(beta2 > 0.0) {
        return 0.0;
    }
    let p2 = energy * energy - mass * mass;
    let v_max = 2.0 * ME * p2 / (mass * mass + ME * ME + 2.0 * ME * energy) / energy;
    if v >= v_max {
        return 0.0;
    }
    let spin = v * v / (2.0 * (1.0 + 1.0 / gamma).powi(2));
    let z2 = particle.charge * particle.charge;
    TWO_PI_RE2_ME * target.charge * z2 / (beta2 * energy * v * v) * (1.0 - beta2 * v / v_max + spin)
}

fn bremsstrahlung(mass: f64, target: &Component, v: f64) -> f64 {
    let z = target.charge;
    let ratio = ME / mass;
    let screening = z * z * target.radiation_log() + z * target.inelastic_radiation_log();
    let shape = (4.0 / 3.0 * (1.0 - v) + v * v) * screening + (1.0 - v) / 9.0 * (z * z + z);
    4.0 * ALPHA * RE * RE * ratio * ratio * shape / v
}

fn bhabha(target: &Component, energy: f64, v: f64) -> f64 {
    let gamma = energy / ME;
    if gamma <= 1.0 {
        return 0.0;
    }
    let epsilon = v * energy / (energy - ME);
    let beta2 = 1.0 - 1.0 / (gamma * gamma);
    let y = 1.0 / (gamma + 1.0);
    let b1 = 2.0 - y * y;
    let b2 = (1.0 - 2.0 * y) * (3.0 + y * y);
    let b4 = (1.0 - 2.0 * y).powi(3);
    let b3 = (1.0 - 2.0 * y).powi(2) + b4;

    let shape = 1.0 / (beta2 * epsilon * epsilon) - b1 / epsilon + b2 - b3 * epsilon + b4 * epsilon * epsilon;
    shape / (gamma - 1.0) / (1.0 - 1.0 / gamma) * 2.0 * std::f64::consts::PI * RE * RE * target.charge
}

fn moller(target: &Component, energy: f64, v: f64) -> f64 {
    let gamma = energy / ME;
    if gamma <= 1.0 {
        return 0.0;
    }
    let epsilon = v * energy / (energy - ME);
    let epsilon_prime = 1.0 - epsilon;
    let c1 = ((gamma - 1.0) / gamma).powi(2);
    let c2 = (2.0 * gamma - 1.0) / (gamma * gamma);
    let beta2 = 1.0 - 1.0 / (gamma * gamma);

    let shape = c1 + 1.0 / epsilon * (1.0 / epsilon - c2) + 1.0 / epsilon_prime * (1.0 / epsilon_prime - c2);
    shape / (beta2 * (gamma - 1.0)) / (1.0 - 1.0 / gamma) * 2.0 * std::f64::consts::PI * RE * RE * target.charge
}

impl FingerprintSource for Parametrization {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        let builder = self.setup().fingerprint_into(builder.text("process", self.name()));
        match self {
            Parametrization::Ionization(_) => builder,
            Parametrization::Bremsstrahlung { lpm, .. } => builder.flag("lpm", *lpm),
            Parametrization::BhabhaScattering { threshold, .. }
            | Parametrization::MollerScattering { threshold, .. } => builder.number("threshold", *threshold),
        }
    }
}
