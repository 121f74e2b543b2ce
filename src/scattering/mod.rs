//! # Multiple Scattering
//!
//! Angular deflection and lateral displacement accumulated over one
//! continuous step.
//!
//! ## Theory
//!
//! Highland's fit to Molière theory gives the width of the projected
//! scattering angle after a path x through a medium of radiation length X₀:
//!
//! θ₀ = 13.6 MeV / (β p) · |z| · √(x/X₀) · (1 + 0.038 ln(x/X₀))
//!
//! Per transverse plane the exit angle and the lateral offset are drawn
//! as correlated Gaussians from two standard normals z₁, z₂:
//!
//! θ_plane = z₂ θ₀,   y_plane = x θ₀ (z₁/√12 + z₂/2)
//!
//! ## References
//!
//! [1] Highland, V. L. "Some practical remarks on multiple scattering",
//!     Nucl. Instrum. Methods 129 (1975) 497
//! [2] Particle Data Group, "Passage of particles through matter", §34.3

use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::ScatteringModel;
use crate::medium::Medium;
use crate::particle::ParticleDef;
use crate::types::Vec3;

/// Position and direction after one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub position: Vec3,
    pub direction: Vec3,
}

// ============================================================================
// HIGHLAND
// ============================================================================

/// Gaussian small-angle scattering with the Highland width
#[derive(Debug, Clone, PartialEq)]
pub struct Highland {
    /// Rest mass (MeV)
    mass: f64,
    /// |charge| (e)
    charge: f64,
    /// Radiation length (cm)
    radiation_length: f64,
}

impl Highland {
    pub fn new(particle: &ParticleDef, medium: &Medium) -> Self {
        Self { mass: particle.mass, charge: particle.charge.abs(), radiation_length: medium.radiation_length() }
    }

    /// θ₀ (rad) for a step of `dr` cm from energy `ei` to `ef` (MeV)
    pub fn theta0(&self, dr: f64, ei: f64, ef: f64) -> f64 {
        let momentum = |e: f64| (e * e - self.mass * self.mass).max(0.0).sqrt();
        let p = (momentum(ei) * momentum(ef)).sqrt();
        let e = (ei * ef).sqrt();
        if !(p > 0.0) || !(dr > 0.0) || !self.radiation_length.is_finite() {
            return 0.0;
        }
        let beta_p = p * p / e;
        let t = dr / self.radiation_length;
        let width = 13.6 / beta_p * self.charge * t.sqrt() * (1.0 + 0.038 * t.ln());
        width.max(0.0)
    }
}

// ============================================================================
// SCATTERING
// ============================================================================

/// Deflection model of a sector
#[derive(Debug, Clone, PartialEq)]
pub enum Scattering {
    /// Straight line along the current direction
    None,
    Highland(Highland),
}

impl Scattering {
    pub fn from_model(model: ScatteringModel, particle: &ParticleDef, medium: &Medium) -> Self {
        match model {
            ScatteringModel::None => Scattering::None,
            ScatteringModel::Highland => Scattering::Highland(Highland::new(particle, medium)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scattering::None => "none",
            Scattering::Highland(_) => "highland",
        }
    }

    /// Move `dr` cm from `position` along `direction` while the energy
    /// drops from `ei` to `ef`
    pub fn scatter<R: Rng + ?Sized>(
        &self,
        dr: f64,
        ei: f64,
        ef: f64,
        position: Vec3,
        direction: Vec3,
        rng: &mut R,
    ) -> Displacement {
        let straight = Displacement { position: position + direction * dr, direction };
        let theta0 = match self {
            Scattering::None => return straight,
            Scattering::Highland(highland) => highland.theta0(dr, ei, ef),
        };
        if !(theta0 > 0.0) {
            return straight;
        }

        let mut plane = || {
            let z1: f64 = rng.sample(StandardNormal);
            let z2: f64 = rng.sample(StandardNormal);
            let offset = dr * theta0 * (z1 / 12f64.sqrt() + 0.5 * z2);
            (offset, z2 * theta0)
        };
        let (offset_x, angle_x) = plane();
        let (offset_y, angle_y) = plane();

        let lateral = offset_x.hypot(offset_y);
        let chord = dr.hypot(lateral);
        let chord_direction = direction.deflect(dr / chord, offset_y.atan2(offset_x));

        let polar = angle_x.hypot(angle_y);
        let new_direction = direction.deflect(polar.cos(), angle_y.atan2(angle_x));

        Displacement { position: position + chord_direction * chord, direction: new_direction }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn highland() -> Scattering {
        Scattering::from_model(ScatteringModel::Highland, &ParticleDef::mu_minus(), &Medium::water())
    }

    #[test]
    fn test_no_scattering_is_straight() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let scattering = Scattering::from_model(ScatteringModel::None, &ParticleDef::mu_minus(), &Medium::water());
        let out = scattering.scatter(10.0, 1e4, 9e3, Vec3::zero(), Vec3::unit_z(), &mut rng);
        assert_eq!(out.position, Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(out.direction, Vec3::unit_z());
    }

    #[test]
    fn test_theta0_scales_inverse_with_momentum() {
        let model = Highland::new(&ParticleDef::mu_minus(), &Medium::water());
        let low = model.theta0(100.0, 1e3, 1e3);
        let high = model.theta0(100.0, 1e5, 1e5);
        assert!(low > high);
        assert!((low / high - 100.0).abs() < 2.0);
        assert_eq!(model.theta0(0.0, 1e3, 1e3), 0.0);
    }

    #[test]
    fn test_highland_keeps_path_length() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let scattering = highland();
        for _ in 0..100 {
            let out = scattering.scatter(50.0, 2e3, 1.9e3, Vec3::zero(), Vec3::unit_z(), &mut rng);
            assert!((out.direction.mag() - 1.0).abs() < 1e-12);
            let travelled = out.position.mag();
            assert!(travelled >= 50.0 - 1e-9);
            assert!(out.position.z > 0.0);
            assert!(out.direction.z > 0.9);
        }
    }

    #[test]
    fn test_highland_deflects_slow_particles_more() {
        let scattering = highland();
        let mean_angle = |energy: f64| {
            let mut rng = ChaCha20Rng::seed_from_u64(11);
            let total: f64 = (0..500)
                .map(|_| {
                    scattering
                        .scatter(100.0, energy, energy, Vec3::zero(), Vec3::unit_z(), &mut rng)
                        .direction
                        .angle_to(&Vec3::unit_z())
                })
                .sum();
            total / 500.0
        };
        assert!(mean_angle(1e3) > 10.0 * mean_angle(1e5));
    }
}
