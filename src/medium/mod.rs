//! # Medium Module
//!
//! Homogeneous media built from atomic components.
//!
//! ## Theory
//!
//! Atom number density of component i in a compound of density ρ:
//!
//! n_i = k_i · ρ N_A / Σ_j k_j A_j
//!
//! with k_i atoms per molecule. Each component carries the radiation
//! logarithm constants entering bremsstrahlung (L_rad = ln(B Z^-1/3),
//! L'_rad = ln(B' Z^-2/3)).
//!
//! ## References
//!
//! - Tsai, "Pair production and bremsstrahlung of charged leptons",
//!   Rev. Mod. Phys. 46 (1974)
//! - Kelner, Kokoulin, Petrukhin, "Bremsstrahlung from muons scattered by
//!   atomic electrons", Phys. Atom. Nucl. 60 (1997)

use std::fmt;

use crate::constants::{ALPHA, N_A, RE};
use crate::error::{PropagationError, Result};
use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource};

// ============================================================================
// COMPONENTS
// ============================================================================

/// One atomic species of a medium
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    /// Nuclear charge Z
    pub charge: f64,
    /// Atomic mass A (g/mol)
    pub atomic_mass: f64,
    /// Atoms of this species per molecule
    pub atoms_in_molecule: f64,
    /// Radiation logarithm constant B
    pub log_constant: f64,
    /// Inelastic radiation logarithm constant B'
    pub b_prime: f64,
}

impl Component {
    pub fn new(name: &str, charge: f64, atomic_mass: f64, atoms_in_molecule: f64) -> Self {
        Self {
            name: name.to_string(),
            charge,
            atomic_mass,
            atoms_in_molecule,
            log_constant: log_constant(charge),
            b_prime: if charge == 1.0 { 446.0 } else { 1429.0 },
        }
    }

    pub fn hydrogen(atoms: f64) -> Self {
        Self::new("H", 1.0, 1.00794, atoms)
    }

    pub fn carbon(atoms: f64) -> Self {
        Self::new("C", 6.0, 12.0011, atoms)
    }

    pub fn oxygen(atoms: f64) -> Self {
        Self::new("O", 8.0, 15.9994, atoms)
    }

    pub fn calcium(atoms: f64) -> Self {
        Self::new("Ca", 20.0, 40.08, atoms)
    }

    pub fn iron(atoms: f64) -> Self {
        Self::new("Fe", 26.0, 55.845, atoms)
    }

    pub fn lead(atoms: f64) -> Self {
        Self::new("Pb", 82.0, 207.2, atoms)
    }

    /// Effective component of standard rock
    pub fn standard_rock(atoms: f64) -> Self {
        Self::new("StandardRock", 11.0, 22.0, atoms)
    }

    /// Effective component of Fréjus rock
    pub fn frejus_rock(atoms: f64) -> Self {
        Self::new("FrejusRock", 10.12, 20.34, atoms)
    }

    /// L_rad = ln(B Z^-1/3)
    pub fn radiation_log(&self) -> f64 {
        (self.log_constant * self.charge.powf(-1.0 / 3.0)).ln()
    }

    /// L'_rad = ln(B' Z^-2/3)
    pub fn inelastic_radiation_log(&self) -> f64 {
        (self.b_prime * self.charge.powf(-2.0 / 3.0)).ln()
    }
}

/// Radiation logarithm constant B(Z); 182.7 for unlisted elements
fn log_constant(charge: f64) -> f64 {
    const TABLE: [(u32, f64); 32] = [
        (1, 202.4),
        (2, 151.9),
        (3, 159.9),
        (4, 172.3),
        (5, 177.9),
        (6, 178.3),
        (7, 176.6),
        (8, 173.4),
        (9, 170.0),
        (10, 165.8),
        (11, 165.8),
        (12, 167.1),
        (13, 169.1),
        (14, 170.8),
        (15, 172.2),
        (16, 173.4),
        (17, 174.3),
        (18, 174.8),
        (19, 175.1),
        (20, 175.6),
        (21, 176.2),
        (22, 176.8),
        (26, 175.8),
        (29, 173.1),
        (32, 173.0),
        (35, 173.5),
        (42, 175.9),
        (50, 177.4),
        (53, 178.6),
        (74, 177.6),
        (82, 178.0),
        (92, 179.8),
    ];
    if charge.fract() != 0.0 {
        return 182.7;
    }
    let z = charge as u32;
    TABLE
        .iter()
        .find(|(key, _)| *key == z)
        .map_or(182.7, |(_, value)| *value)
}

/// Coulomb correction f(αZ)
fn coulomb_correction(charge: f64) -> f64 {
    let a2 = (ALPHA * charge).powi(2);
    a2 * (1.0 / (1.0 + a2) + 0.20206 - 0.0369 * a2 + 0.0083 * a2 * a2 - 0.002 * a2 * a2 * a2)
}

impl FingerprintSource for Component {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        builder
            .text("component", &self.name)
            .number("z", self.charge)
            .number("a", self.atomic_mass)
            .number("atoms", self.atoms_in_molecule)
    }
}

// ============================================================================
// MEDIUM
// ============================================================================

/// Immutable homogeneous medium
#[derive(Debug, Clone, PartialEq)]
pub struct Medium {
    name: String,
    components: Vec<Component>,
    /// Mass density (g/cm³)
    density: f64,
    /// Multiplies the density
    density_correction: f64,
    /// Atom number densities (1/cm³), aligned with components
    number_densities: Vec<f64>,
    /// Mass of one mole of molecules (g/mol)
    molar_mass: f64,
}

impl Medium {
    pub fn new(name: &str, density: f64, components: Vec<Component>) -> Self {
        let mut medium = Self {
            name: name.to_string(),
            components,
            density,
            density_correction: 1.0,
            number_densities: Vec::new(),
            molar_mass: 0.0,
        };
        medium.update_densities();
        medium
    }

    pub fn with_density_correction(mut self, correction: f64) -> Self {
        self.density_correction = correction;
        self.update_densities();
        self
    }

    fn update_densities(&mut self) {
        self.molar_mass = self.components.iter().map(|c| c.atoms_in_molecule * c.atomic_mass).sum();
        let molecules = if self.molar_mass > 0.0 {
            self.mass_density() * N_A / self.molar_mass
        } else {
            0.0
        };
        self.number_densities = self.components.iter().map(|c| c.atoms_in_molecule * molecules).collect();
    }

    pub fn water() -> Self {
        Self::new("water", 1.0, vec![Component::hydrogen(2.0), Component::oxygen(1.0)])
    }

    pub fn ice() -> Self {
        Self::new("ice", 0.917, vec![Component::hydrogen(2.0), Component::oxygen(1.0)])
    }

    pub fn standard_rock() -> Self {
        Self::new("standardrock", 2.65, vec![Component::standard_rock(1.0)])
    }

    pub fn frejus_rock() -> Self {
        Self::new("frejusrock", 2.74, vec![Component::frejus_rock(1.0)])
    }

    pub fn iron() -> Self {
        Self::new("iron", 7.874, vec![Component::iron(1.0)])
    }

    pub fn lead() -> Self {
        Self::new("lead", 11.35, vec![Component::lead(1.0)])
    }

    /// CaCO₃
    pub fn calcite() -> Self {
        Self::new(
            "calcite",
            2.71,
            vec![Component::calcium(1.0), Component::carbon(1.0), Component::oxygen(3.0)],
        )
    }

    /// Look up a preset by name, case- and separator-insensitive
    pub fn by_name(name: &str) -> Result<Self> {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "water" => Ok(Self::water()),
            "ice" => Ok(Self::ice()),
            "standardrock" => Ok(Self::standard_rock()),
            "frejusrock" => Ok(Self::frejus_rock()),
            "iron" => Ok(Self::iron()),
            "lead" => Ok(Self::lead()),
            "calcite" => Ok(Self::calcite()),
            _ => Err(PropagationError::UnknownMedium(name.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Nominal mass density (g/cm³)
    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn density_correction(&self) -> f64 {
        self.density_correction
    }

    /// Effective mass density ρ · correction (g/cm³)
    pub fn mass_density(&self) -> f64 {
        self.density * self.density_correction
    }

    /// Atom number densities per component (1/cm³)
    pub fn number_densities(&self) -> &[f64] {
        &self.number_densities
    }

    /// Molar mass per molecule (g/mol)
    pub fn molar_mass(&self) -> f64 {
        self.molar_mass
    }

    /// Electrons per cm³
    pub fn electron_density(&self) -> f64 {
        self.components
            .iter()
            .zip(&self.number_densities)
            .map(|(c, n)| c.charge * n)
            .sum()
    }

    /// Radiation length (cm), Tsai with Coulomb correction
    pub fn radiation_length(&self) -> f64 {
        let inverse: f64 = self
            .components
            .iter()
            .zip(&self.number_densities)
            .map(|(c, n)| {
                let z = c.charge;
                let elastic = z * z * (c.radiation_log() - coulomb_correction(z));
                4.0 * ALPHA * RE * RE * n * (elastic + z * c.inelastic_radiation_log())
            })
            .sum();
        if inverse > 0.0 {
            1.0 / inverse
        } else {
            f64::INFINITY
        }
    }

    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.components.iter().map(|c| c.name.as_str()).collect();
        format!(
            "{}: ρ = {:.4} g/cm³ (×{:.3}), components [{}], X0 = {:.3} cm",
            self.name,
            self.density,
            self.density_correction,
            names.join(", "),
            self.radiation_length()
        )
    }
}

impl FingerprintSource for Medium {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        let builder = builder
            .text("medium", &self.name)
            .number("density", self.density)
            .number("density_correction", self.density_correction)
            .integer("components", self.components.len() as u64);
        self.components.iter().fold(builder, |b, c| c.fingerprint_into(b))
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_constants() {
        assert_relative_eq!(Component::hydrogen(1.0).log_constant, 202.4);
        assert_relative_eq!(Component::oxygen(1.0).log_constant, 173.4);
        assert_relative_eq!(Component::standard_rock(1.0).log_constant, 165.8);
        assert_relative_eq!(Component::frejus_rock(1.0).log_constant, 182.7);
        assert_relative_eq!(Component::hydrogen(1.0).b_prime, 446.0);
        assert_relative_eq!(Component::lead(1.0).b_prime, 1429.0);
    }

    #[test]
    fn test_water_number_densities() {
        let water = Medium::water();
        let molecules = N_A / (2.0 * 1.00794 + 15.9994);
        assert_relative_eq!(water.number_densities()[0], 2.0 * molecules, max_relative = 1e-12);
        assert_relative_eq!(water.number_densities()[1], molecules, max_relative = 1e-12);
        let electrons = 10.0 * molecules;
        assert_relative_eq!(water.electron_density(), electrons, max_relative = 1e-12);
    }

    #[test]
    fn test_density_correction_scales_densities() {
        let rock = Medium::standard_rock();
        let dense = Medium::standard_rock().with_density_correction(2.0);
        assert_relative_eq!(dense.number_densities()[0], 2.0 * rock.number_densities()[0], max_relative = 1e-12);
        assert_relative_eq!(dense.radiation_length(), 0.5 * rock.radiation_length(), max_relative = 1e-12);
    }

    #[test]
    fn test_radiation_length_order_of_magnitude() {
        let water = Medium::water().radiation_length();
        assert!(water > 30.0 && water < 45.0, "water X0 = {water}");
        let lead = Medium::lead().radiation_length();
        assert!(lead > 0.4 && lead < 0.7, "lead X0 = {lead}");
    }

    #[test]
    fn test_lookup() {
        assert_eq!(Medium::by_name("Standard Rock").map(|m| m.name().to_string()).ok(), Some("standardrock".into()));
        assert!(matches!(Medium::by_name("vacuum"), Err(PropagationError::UnknownMedium(_))));
    }
}
