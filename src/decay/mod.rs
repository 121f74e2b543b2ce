//! # Decay Module
//!
//! Branching tables and final-state kinematics for unstable leptons.
//!
//! ## Channels
//!
//! - **Leptonic**: ℓ → ℓ' ν ν̄. The charged daughter energy follows the
//!   Michel spectrum dΓ/dx ∝ x²(3 - 2x), x = E*/E*_max, in the rest frame;
//!   the neutrino pair shares the remaining rest-frame energy.
//! - **Two-body**: isotropic phase space, back-to-back daughters with
//!   p* = λ^½(M², m₁², m₂²) / 2M.
//! - **Stable**: no products.
//!
//! Rest-frame momenta are boosted along the parent direction.
//!
//! ## References
//!
//! - Michel, "Interaction between four half-spin particles and the decay of
//!   the μ-meson", Proc. Phys. Soc. A 63 (1950)
//! - Particle Data Group, "Review of Particle Physics" (τ branching ratios)

use rand::Rng;

use crate::constants::{ME, MKAON, MMU, MPI, MRHO};
use crate::types::Vec3;

// ============================================================================
// CHANNELS
// ============================================================================

/// One decay mode
#[derive(Debug, Clone, PartialEq)]
pub enum DecayChannel {
    Stable,
    Leptonic {
        /// Charged daughter lepton
        lepton: String,
        /// Charged daughter mass (MeV)
        lepton_mass: f64,
    },
    TwoBody {
        first: String,
        first_mass: f64,
        second: String,
        second_mass: f64,
    },
}

/// Decay product in the lab frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecayProduct {
    pub name: String,
    /// Total energy (MeV)
    pub energy: f64,
    pub direction: Vec3,
}

impl DecayChannel {
    pub fn leptonic(lepton: &str, lepton_mass: f64) -> Self {
        DecayChannel::Leptonic { lepton: lepton.to_string(), lepton_mass }
    }

    pub fn two_body(first: &str, first_mass: f64, second: &str, second_mass: f64) -> Self {
        DecayChannel::TwoBody {
            first: first.to_string(),
            first_mass,
            second: second.to_string(),
            second_mass,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecayChannel::Stable => "stable",
            DecayChannel::Leptonic { .. } => "leptonic",
            DecayChannel::TwoBody { .. } => "two-body",
        }
    }

    /// Decay a parent of `mass` and total `energy` moving along `direction`
    pub fn decay<R: Rng + ?Sized>(
        &self,
        mass: f64,
        energy: f64,
        direction: Vec3,
        rng: &mut R,
    ) -> Vec<DecayProduct> {
        let frame = Boost::new(mass, energy, direction);

        match self {
            DecayChannel::Stable => Vec::new(),
            DecayChannel::Leptonic { lepton, lepton_mass } => {
                let e_max = (mass * mass + lepton_mass * lepton_mass) / (2.0 * mass);
                let x = sample_michel(rng.gen::<f64>());
                let e_lepton = (x * e_max).max(*lepton_mass);
                let p_lepton = (e_lepton * e_lepton - lepton_mass * lepton_mass).max(0.0).sqrt();
                let cos_theta = 2.0 * rng.gen::<f64>() - 1.0;
                let phi = Vec3::azimuth(rng.gen::<f64>());

                let e_neutrino = 0.5 * (mass - e_lepton).max(0.0);
                let (lepton_energy, lepton_dir) = frame.apply(e_lepton, p_lepton, cos_theta, phi);
                let (nu_energy, nu_dir) = frame.apply(e_neutrino, e_neutrino, -cos_theta, phi);

                let mut products = vec![DecayProduct {
                    name: lepton.clone(),
                    energy: lepton_energy,
                    direction: lepton_dir,
                }];
                for name in ["neutrino", "antineutrino"] {
                    products.push(DecayProduct {
                        name: name.to_string(),
                        energy: nu_energy,
                        direction: nu_dir,
                    });
                }
                products
            }
            DecayChannel::TwoBody { first, first_mass, second, second_mass } => {
                let p_star = two_body_momentum(mass, *first_mass, *second_mass);
                let e1 = (p_star * p_star + first_mass * first_mass).sqrt();
                let e2 = (p_star * p_star + second_mass * second_mass).sqrt();
                let cos_theta = 2.0 * rng.gen::<f64>() - 1.0;
                let phi = Vec3::azimuth(rng.gen::<f64>());

                let (energy1, dir1) = frame.apply(e1, p_star, cos_theta, phi);
                let (energy2, dir2) = frame.apply(e2, p_star, -cos_theta, phi + std::f64::consts::PI);
                vec![
                    DecayProduct { name: first.clone(), energy: energy1, direction: dir1 },
                    DecayProduct { name: second.clone(), energy: energy2, direction: dir2 },
                ]
            }
        }
    }
}

/// Rest-frame momentum of a two-body decay (MeV)
pub fn two_body_momentum(mass: f64, m1: f64, m2: f64) -> f64 {
    let sum = m1 + m2;
    let diff = m1 - m2;
    let lambda = (mass * mass - sum * sum) * (mass * mass - diff * diff);
    lambda.max(0.0).sqrt() / (2.0 * mass)
}

/// Inverse of the Michel CDF F(x) = 2x³ - x⁴ on [0, 1]
fn sample_michel(u: f64) -> f64 {
    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        let cdf = mid * mid * mid * (2.0 - mid);
        if cdf < u {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Lorentz boost from the parent rest frame to the lab
struct Boost {
    gamma: f64,
    beta_gamma: f64,
    direction: Vec3,
}

impl Boost {
    fn new(mass: f64, energy: f64, direction: Vec3) -> Self {
        let gamma = (energy / mass).max(1.0);
        let beta_gamma = (gamma * gamma - 1.0).sqrt();
        Self { gamma, beta_gamma, direction: direction.normalize() }
    }

    /// Lab energy and direction of a daughter with rest-frame energy e,
    /// momentum p, polar cosine `cos_theta` to the boost axis
    fn apply(&self, e: f64, p: f64, cos_theta: f64, phi: f64) -> (f64, Vec3) {
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let energy = self.gamma * e + self.beta_gamma * p * cos_theta;
        let p_parallel = self.beta_gamma * e + self.gamma * p * cos_theta;
        let p_perp = p * sin_theta;
        let p_total = (p_parallel * p_parallel + p_perp * p_perp).sqrt();
        let direction = if p_total > 0.0 {
            self.direction.deflect(p_parallel / p_total, phi)
        } else {
            self.direction
        };
        (energy, direction)
    }
}

// ============================================================================
// DECAY TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Branch {
    ratio: f64,
    channel: DecayChannel,
}

/// Branching table of a particle; an empty table means stable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecayTable {
    branches: Vec<Branch>,
}

impl DecayTable {
    pub fn stable() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, ratio: f64, channel: DecayChannel) -> Self {
        if ratio > 0.0 {
            self.branches.push(Branch { ratio, channel });
        }
        self
    }

    /// μ → e ν ν̄
    pub fn muon() -> Self {
        Self::stable().with_channel(1.0, DecayChannel::leptonic("e", ME))
    }

    /// Dominant τ modes, normalised on selection
    pub fn tau() -> Self {
        Self::stable()
            .with_channel(0.1782, DecayChannel::leptonic("e", ME))
            .with_channel(0.1739, DecayChannel::leptonic("mu", MMU))
            .with_channel(0.1082, DecayChannel::two_body("pi", MPI, "neutrino", 0.0))
            .with_channel(0.0070, DecayChannel::two_body("K", MKAON, "neutrino", 0.0))
            .with_channel(0.2549, DecayChannel::two_body("rho", MRHO, "neutrino", 0.0))
    }

    pub fn is_stable(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Channel for a uniform draw in [0, 1)
    pub fn select_channel(&self, rnd: f64) -> &DecayChannel {
        static STABLE: DecayChannel = DecayChannel::Stable;
        let total: f64 = self.branches.iter().map(|b| b.ratio).sum();
        let target = rnd * total;
        let mut sum = 0.0;
        for branch in &self.branches {
            sum += branch.ratio;
            if sum > target {
                return &branch.channel;
            }
        }
        self.branches.last().map_or(&STABLE, |b| &b.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_muon_selects_leptonic() {
        let table = DecayTable::muon();
        for rnd in [0.0, 0.3, 0.999] {
            assert!(matches!(table.select_channel(rnd), DecayChannel::Leptonic { .. }));
        }
    }

    #[test]
    fn test_stable_table() {
        let table = DecayTable::stable();
        assert!(table.is_stable());
        assert_eq!(table.select_channel(0.5), &DecayChannel::Stable);
    }

    #[test]
    fn test_tau_selects_several_channels() {
        let table = DecayTable::tau();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut leptonic = 0;
        let mut two_body = 0;
        for _ in 0..1000 {
            match table.select_channel(rng.gen()) {
                DecayChannel::Leptonic { .. } => leptonic += 1,
                DecayChannel::TwoBody { .. } => two_body += 1,
                DecayChannel::Stable => {}
            }
        }
        assert!(leptonic > 0);
        assert!(two_body > 0);
        assert_eq!(leptonic + two_body, 1000);
    }

    #[test]
    fn test_two_body_conserves_energy() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let channel = DecayChannel::two_body("pi", MPI, "neutrino", 0.0);
        let products = channel.decay(1776.86, 1e5, Vec3::unit_z(), &mut rng);
        let sum: f64 = products.iter().map(|p| p.energy).sum();
        assert_relative_eq!(sum, 1e5, max_relative = 1e-12);
    }

    #[test]
    fn test_leptonic_energy_bounds() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let channel = DecayChannel::leptonic("e", ME);
        for _ in 0..100 {
            let products = channel.decay(MMU, 1e4, Vec3::unit_z(), &mut rng);
            assert_eq!(products.len(), 3);
            assert!(products[0].energy >= ME);
            assert!(products[0].energy <= 1e4);
        }
    }

    #[test]
    fn test_michel_endpoints() {
        assert!(sample_michel(0.0) < 1e-12);
        assert!(sample_michel(1.0) > 1.0 - 1e-12);
        assert_relative_eq!(sample_michel(0.5).powi(3) * (2.0 - sample_michel(0.5)), 0.5, epsilon = 1e-12);
    }
}
