//! # LEPTOPROP-RS
//!
//! Monte Carlo propagation of high-energy leptons through matter
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          LEPTOPROP-RS                                       │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  LEVEL 1: NUMERICS      quadrature, interpolation (+ table cache)           │
//! │  LEVEL 2: PHYSICS       particle, medium, cuts, crosssection, decay         │
//! │  LEVEL 3: INTEGRALS     utility (range, tracking, time)                     │
//! │  LEVEL 4: TRANSPORT     sector (stepping), geometry, scattering             │
//! │  LEVEL 5: SETUP         config (JSON sector definitions)                    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use leptoprop_rs::{ParametrizationRegistry, Sector, SectorDefinition, Vec3};
//! use rand::SeedableRng;
//!
//! let definition = SectorDefinition::default();
//! let mut sector = Sector::from_definition(&definition, &ParametrizationRegistry::standard())?;
//! let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(42);
//!
//! sector.launch(1e6, Vec3::zero(), Vec3::unit_z());
//! let result = sector.propagate(1e5, &mut rng);
//! println!("{} after 1 km, {} losses", result.value, result.secondaries.len());
//! # Ok::<(), leptoprop_rs::PropagationError>(())
//! ```
//!
//! ## Units
//!
//! MeV, cm, s, g/cm³ throughout.

pub mod constants;
pub mod types;
pub mod error;
pub mod quadrature;
pub mod interpolation;
pub mod particle;
pub mod medium;
pub mod cuts;
pub mod crosssection;
pub mod decay;
pub mod utility;
pub mod geometry;
pub mod scattering;
pub mod sector;
pub mod config;

// Re-exports
pub use config::{InterpolationDef, ProcessDefinition, ScatteringModel, SectorDefinition};
pub use crosssection::{CrossSection, Parametrization, ParametrizationRegistry};
pub use error::{PropagationError, Result};
pub use medium::Medium;
pub use particle::{ParticleDef, ParticleState};
pub use sector::{PropagationResult, Sector, Termination};
pub use types::Vec3;
pub use utility::PropagationUtility;

/// LEPTOPROP version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Information about the library
pub fn info() -> String {
    format!(
        "LEPTOPROP-RS v{}\n\
         Lepton propagation with interpolation-accelerated cross sections",
        VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info() {
        let info = info();
        assert!(info.contains("LEPTOPROP"));
        assert!(info.contains(VERSION));
    }
}
