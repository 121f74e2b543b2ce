//! # Physical and Numerical Constants
//!
//! Energies are in MeV, lengths in cm, times in s, densities in g/cm³.

use std::f64::consts::PI;

// ============================================================================
// FUNDAMENTAL CONSTANTS
// ============================================================================

/// Speed of light (cm/s)
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e10;

/// Avogadro number (1/mol)
pub const N_A: f64 = 6.022_140_76e23;

/// Fine structure constant
pub const ALPHA: f64 = 1.0 / 137.035_999_084;

/// Classical electron radius (cm)
pub const RE: f64 = 2.817_940_326_2e-13;

/// 2π r_e² m_e, prefactor of the electron scattering cross sections (MeV·cm²)
pub const TWO_PI_RE2_ME: f64 = 2.0 * PI * RE * RE * ME;

/// Euler number, appears in the bremsstrahlung kinematic limit
pub const EULER_E: f64 = std::f64::consts::E;

// ============================================================================
// PARTICLE MASSES (MeV)
// ============================================================================

/// Electron mass (MeV)
pub const ME: f64 = 0.510_998_950;

/// Muon mass (MeV)
pub const MMU: f64 = 105.658_375_5;

/// Tau mass (MeV)
pub const MTAU: f64 = 1_776.86;

/// Charged pion mass (MeV)
pub const MPI: f64 = 139.570_39;

/// Charged kaon mass (MeV)
pub const MKAON: f64 = 493.677;

/// Charged rho meson mass (MeV)
pub const MRHO: f64 = 775.26;

// ============================================================================
// LIFETIMES (s)
// ============================================================================

/// Muon lifetime (s)
pub const LIFETIME_MU: f64 = 2.196_981_1e-6;

/// Tau lifetime (s)
pub const LIFETIME_TAU: f64 = 290.3e-15;

// ============================================================================
// MATERIAL PHYSICS
// ============================================================================

/// LPM energy scale for electrons per radiation length (MeV/cm)
pub const E_LPM_PER_CM: f64 = 7.7e6;

/// Mean excitation energy scale, I ≈ 16 eV · Z^0.9 (MeV)
pub const EXCITATION_SCALE: f64 = 1.6e-5;

// ============================================================================
// NUMERICAL SETTINGS
// ============================================================================

/// Number of Romberg extrapolation columns
pub const ROMBERG_ORDER: usize = 5;

/// Maximum refinement levels per quadrature panel
pub const MAX_STEPS: usize = 8;

/// Default relative integration precision
pub const PRECISION: f64 = 1e-6;

/// Relative precision below which two table values are treated as equal
pub const HALF_PRECISION: f64 = 1e-7;

/// Relative precision for a requested distance to count as reached
pub const COMPUTER_PRECISION: f64 = 1e-10;

/// Upper energy edge of the interpolation tables (MeV)
pub const BIG_ENERGY: f64 = 1e14;

/// Interpolation order (nodes per local fit)
pub const INTERPOLATION_ORDER: usize = 5;

/// Nodes per axis of cross-section tables
pub const NODES_CROSS_SECTION: usize = 100;

/// Nodes of the propagation utility tables
pub const NODES_UTILITY: usize = 200;
