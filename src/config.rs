//! # Configuration
//!
//! Serde records describing a propagation setup. Every field has a
//! default, so a JSON file only needs to name what it changes:
//!
//! ```json
//! {
//!   "medium": "ice",
//!   "e_cut": 500.0,
//!   "v_cut": 0.05,
//!   "processes": [{ "name": "ionization" }, { "name": "bremsstrahlung", "lpm": true }],
//!   "interpolation": { "path": "tables", "raw": true }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BIG_ENERGY, INTERPOLATION_ORDER, NODES_CROSS_SECTION, NODES_UTILITY};
use crate::cuts::EnergyCutSettings;
use crate::error::{PropagationError, Result};
use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource, TableFormat, TableStore};
use crate::interpolation::MAX_ORDER;

// ============================================================================
// INTERPOLATION
// ============================================================================

/// Layout and persistence of interpolation tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationDef {
    /// Nodes per local fit
    pub order: usize,
    /// Nodes per axis of cross-section tables
    pub nodes_cross_section: usize,
    /// Nodes of propagation utility tables
    pub nodes_utility: usize,
    /// Upper energy edge of all tables (MeV)
    pub max_node_energy: f64,
    /// Directory for table files; tables stay in memory when unset
    pub path: Option<PathBuf>,
    /// Binary instead of text table files
    pub raw: bool,
}

impl Default for InterpolationDef {
    fn default() -> Self {
        Self {
            order: INTERPOLATION_ORDER,
            nodes_cross_section: NODES_CROSS_SECTION,
            nodes_utility: NODES_UTILITY,
            max_node_energy: BIG_ENERGY,
            path: None,
            raw: false,
        }
    }
}

impl InterpolationDef {
    pub fn with_nodes(mut self, cross_section: usize, utility: usize) -> Self {
        self.nodes_cross_section = cross_section;
        self.nodes_utility = utility;
        self
    }

    pub fn with_max_node_energy(mut self, energy: f64) -> Self {
        self.max_node_energy = energy;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>, raw: bool) -> Self {
        self.path = Some(path.into());
        self.raw = raw;
        self
    }

    pub fn table_store(&self) -> TableStore {
        match &self.path {
            Some(path) => {
                let format = if self.raw { TableFormat::Raw } else { TableFormat::Text };
                TableStore::on_disk(path.clone(), format)
            }
            None => TableStore::in_memory(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.order < 2 || self.order > MAX_ORDER {
            return Err(PropagationError::InvalidDefinition(format!(
                "interpolation order {} outside [2, {MAX_ORDER}]",
                self.order
            )));
        }
        if self.nodes_cross_section < self.order || self.nodes_utility < self.order {
            return Err(PropagationError::InvalidDefinition(
                "fewer interpolation nodes than the interpolation order".into(),
            ));
        }
        if !(self.max_node_energy > 0.0) || !self.max_node_energy.is_finite() {
            return Err(PropagationError::InvalidDefinition(format!(
                "maximum node energy {}",
                self.max_node_energy
            )));
        }
        Ok(())
    }
}

impl FingerprintSource for InterpolationDef {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        builder
            .integer("order", self.order as u64)
            .integer("nodes_cross_section", self.nodes_cross_section as u64)
            .integer("nodes_utility", self.nodes_utility as u64)
            .number("max_node_energy", self.max_node_energy)
    }
}

// ============================================================================
// PROCESSES
// ============================================================================

/// One entry of the process list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDefinition {
    /// Registry identifier, e.g. `bremsstrahlung`
    pub name: String,
    pub multiplier: f64,
    /// LPM suppression (bremsstrahlung)
    pub lpm: bool,
    /// Smallest energy transfer (MeV, Bhabha and Møller)
    pub threshold: f64,
}

impl Default for ProcessDefinition {
    fn default() -> Self {
        Self { name: String::new(), multiplier: 1.0, lpm: false, threshold: 0.1 }
    }
}

impl ProcessDefinition {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_lpm(mut self, lpm: bool) -> Self {
        self.lpm = lpm;
        self
    }
}

// ============================================================================
// SECTOR
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScatteringModel {
    #[default]
    None,
    Highland,
}

impl FromStr for ScatteringModel {
    type Err = PropagationError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "noscattering" => Ok(ScatteringModel::None),
            "highland" => Ok(ScatteringModel::Highland),
            _ => Err(PropagationError::UnknownScattering(name.to_string())),
        }
    }
}

/// Full description of one propagation sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorDefinition {
    pub particle: String,
    pub medium: String,
    pub density_correction: f64,
    /// Absolute energy cut (MeV)
    pub e_cut: f64,
    /// Relative energy cut
    pub v_cut: f64,
    pub processes: Vec<ProcessDefinition>,
    /// Tables instead of direct integration
    pub do_interpolation: bool,
    pub interpolation: InterpolationDef,
    /// Integrate the particle time instead of using dr/c
    pub exact_time: bool,
    pub scattering: ScatteringModel,
    pub do_weighting: bool,
    pub weighting_order: f64,
    /// Distance after which weighting starts (cm)
    pub weighting_starts_at: f64,
    /// Radius of the sphere around the origin (cm)
    pub sphere_radius: f64,
}

impl Default for SectorDefinition {
    fn default() -> Self {
        Self {
            particle: "MuMinus".to_string(),
            medium: "standardrock".to_string(),
            density_correction: 1.0,
            e_cut: 500.0,
            v_cut: 0.05,
            processes: vec![ProcessDefinition::named("ionization"), ProcessDefinition::named("bremsstrahlung")],
            do_interpolation: true,
            interpolation: InterpolationDef::default(),
            exact_time: false,
            scattering: ScatteringModel::None,
            do_weighting: false,
            weighting_order: 0.0,
            weighting_starts_at: 0.0,
            sphere_radius: 1e20,
        }
    }
}

impl SectorDefinition {
    pub fn from_json(text: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(text)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn cuts(&self) -> EnergyCutSettings {
        EnergyCutSettings::new(self.e_cut, self.v_cut)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.density_correction > 0.0) {
            return Err(PropagationError::InvalidDefinition(format!(
                "density correction {}",
                self.density_correction
            )));
        }
        if !(self.sphere_radius > 0.0) {
            return Err(PropagationError::InvalidDefinition(format!("sphere radius {}", self.sphere_radius)));
        }
        if self.processes.iter().any(|p| p.name.is_empty()) {
            return Err(PropagationError::InvalidDefinition("process without a name".into()));
        }
        self.interpolation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let definition = SectorDefinition::from_json("{}").ok();
        assert_eq!(definition, Some(SectorDefinition::default()));
    }

    #[test]
    fn test_partial_json() {
        let text = r#"{
            "medium": "ice",
            "scattering": "highland",
            "processes": [{ "name": "bremsstrahlung", "lpm": true }],
            "interpolation": { "nodes_utility": 50, "raw": true }
        }"#;
        let definition = SectorDefinition::from_json(text).ok();
        let Some(definition) = definition else {
            panic!("definition did not parse");
        };
        assert_eq!(definition.medium, "ice");
        assert_eq!(definition.scattering, ScatteringModel::Highland);
        assert_eq!(definition.processes.len(), 1);
        assert!(definition.processes[0].lpm);
        assert_eq!(definition.processes[0].multiplier, 1.0);
        assert_eq!(definition.interpolation.nodes_utility, 50);
        assert_eq!(definition.interpolation.order, INTERPOLATION_ORDER);
        assert_eq!(definition.e_cut, 500.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SectorDefinition::from_json(r#"{ "density_correction": 0.0 }"#),
            Err(PropagationError::InvalidDefinition(_))
        ));
        assert!(matches!(
            SectorDefinition::from_json(r#"{ "interpolation": { "order": 40 } }"#),
            Err(PropagationError::InvalidDefinition(_))
        ));
        assert!(matches!(SectorDefinition::from_json("{ medium"), Err(PropagationError::Json(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let definition = SectorDefinition { exact_time: true, ..SectorDefinition::default() };
        let text = definition.to_json().unwrap_or_default();
        assert_eq!(SectorDefinition::from_json(&text).ok(), Some(definition));
    }

    #[test]
    fn test_scattering_names() {
        assert_eq!("Highland".parse::<ScatteringModel>().ok(), Some(ScatteringModel::Highland));
        assert_eq!("none".parse::<ScatteringModel>().ok(), Some(ScatteringModel::None));
        assert!(matches!("moliere".parse::<ScatteringModel>(), Err(PropagationError::UnknownScattering(_))));
    }

    #[test]
    fn test_table_store_follows_path() {
        assert_eq!(InterpolationDef::default().table_store(), TableStore::in_memory());
        let store = InterpolationDef::default().with_path("tables", true).table_store();
        assert_eq!(store.format(), TableFormat::Raw);
        assert!(store.directory().is_some());
    }
}
