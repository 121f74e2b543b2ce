//! # Propagation Utility
//!
//! Combines the cross sections of one (particle, medium, cuts) setup into
//! the integrals the stepper needs.
//!
//! ## Theory
//!
//! With the total continuous rate L(E) = Σ dE/dx:
//!
//! - displacement      x(E_i, E_f) = ∫_{E_f}^{E_i} dE / L(E)
//! - interaction hazard h_I(E)     = Σ dN/dx / L(E)
//! - decay hazard       h_D(E)     = m / (L(E) · p · c τ)
//! - particle time      t(E_i, E_f) = ∫_{E_f}^{E_i} E dE / (L(E) · p c)
//!
//! The tracking integral ∫_{low}^{E} h(E') dE' is the hazard accumulated
//! on the way from E down to the cutoff. An exponential variate ξ below it
//! fixes the energy E_f of the next event by ∫_{E_f}^{E} h = ξ.
//!
//! ## Tables
//!
//! When interpolated, each integral is stored as a cumulative table Y(E)
//! on a logarithmic grid together with its integrand. Tracking tables
//! accumulate from whichever end has the smaller boundary contribution:
//! from the cutoff, Y(E) = ∫_{low}^{E} h, or from the top node,
//! Y(E) = ∫_{E}^{top} h. Differences of close energies fall back to the
//! integrand table at the midpoint.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::info;

use crate::config::{InterpolationDef, SectorDefinition};
use crate::constants::{HALF_PRECISION, SPEED_OF_LIGHT};
use crate::crosssection::{CrossSection, ParametrizationRegistry, ProcessSetup};
use crate::decay::DecayTable;
use crate::error::Result;
use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource, Table, TableKind};
use crate::interpolation::{Axis, Interpolant1D, TableFlags};
use crate::medium::Medium;
use crate::particle::ParticleDef;
use crate::quadrature::Integrator;

/// Which hazard a tracking integral accumulates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingKind {
    Interaction,
    Decay,
}

/// End of the energy range a cumulative table starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingOrigin {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Integrand {
    Displacement,
    Interaction,
    Decay,
    Time,
}

impl From<TrackingKind> for Integrand {
    fn from(kind: TrackingKind) -> Self {
        match kind {
            TrackingKind::Interaction => Integrand::Interaction,
            TrackingKind::Decay => Integrand::Decay,
        }
    }
}

// ============================================================================
// CUMULATIVE TABLES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct CumulativeTable {
    origin: TrackingOrigin,
    values: Interpolant1D,
    integrand: Interpolant1D,
    /// Y(low)
    at_low: f64,
}

impl CumulativeTable {
    fn from_tables(origin: TrackingOrigin, values: Interpolant1D, integrand: Interpolant1D) -> Self {
        let at_low = values.evaluate(values.axis().min);
        Self { origin, values, integrand, at_low }
    }

    /// ∫_{ef}^{ei} for ei ≥ ef
    fn integral(&self, ei: f64, ef: f64) -> f64 {
        if ei <= ef {
            return 0.0;
        }
        let value = if ei - ef > ei * HALF_PRECISION {
            match self.origin {
                TrackingOrigin::Low => self.values.evaluate(ei) - self.values.evaluate(ef),
                TrackingOrigin::High => self.values.evaluate(ef) - self.values.evaluate(ei),
            }
        } else {
            self.integrand.evaluate(0.5 * (ei + ef)) * (ei - ef)
        };
        value.max(0.0)
    }

    /// ∫_{low}^{e}
    fn total(&self, energy: f64) -> f64 {
        let value = match self.origin {
            TrackingOrigin::Low => self.values.evaluate(energy) - self.at_low,
            TrackingOrigin::High => self.at_low - self.values.evaluate(energy),
        };
        value.max(0.0)
    }

    /// ef with ∫_{ef}^{ei} = amount, amount below the total
    fn inverse(&self, ei: f64, amount: f64) -> f64 {
        let stored = self.values.evaluate(ei);
        if amount > stored.abs() * HALF_PRECISION {
            let target = match self.origin {
                TrackingOrigin::Low => stored - amount,
                TrackingOrigin::High => stored + amount,
            };
            self.values.find_limit(target)
        } else {
            let midpoint = ei - amount / (2.0 * self.integrand.evaluate(ei));
            ei - amount / self.integrand.evaluate(midpoint)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct UtilityTables {
    displacement: CumulativeTable,
    interaction: CumulativeTable,
    decay: Option<CumulativeTable>,
    time: Option<CumulativeTable>,
}

// ============================================================================
// UTILITY
// ============================================================================

/// Integrals over the combined cross sections of one setup
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationUtility {
    particle: ParticleDef,
    medium: Arc<Medium>,
    cross_sections: Vec<CrossSection>,
    integrator: Integrator,
    tables: Option<UtilityTables>,
}

impl PropagationUtility {
    /// Direct integration over `cross_sections`
    pub fn new(particle: ParticleDef, medium: Arc<Medium>, cross_sections: Vec<CrossSection>) -> Self {
        Self { particle, medium, cross_sections, integrator: Integrator::default(), tables: None }
    }

    /// Assemble the utility described by `definition`
    pub fn from_definition(definition: &SectorDefinition, registry: &ParametrizationRegistry) -> Result<Self> {
        definition.validate()?;
        let particle = ParticleDef::by_name(&definition.particle)?;
        let medium = Arc::new(Medium::by_name(&definition.medium)?.with_density_correction(definition.density_correction));
        let cuts = Arc::new(definition.cuts());
        let setup = ProcessSetup::new(particle.clone(), Arc::clone(&medium), cuts);

        let mut cross_sections = Vec::with_capacity(definition.processes.len());
        for process in &definition.processes {
            let parametrization = registry.create(setup.clone(), process)?;
            cross_sections.push(if definition.do_interpolation {
                CrossSection::cached(parametrization, &definition.interpolation)
            } else {
                CrossSection::direct(parametrization)
            });
        }

        let utility = Self::new(particle, medium, cross_sections);
        Ok(if definition.do_interpolation {
            utility.interpolated(&definition.interpolation, definition.exact_time)
        } else {
            utility
        })
    }

    /// Replace direct integration by tables; the time table is built only
    /// with `with_time`
    pub fn interpolated(mut self, definition: &InterpolationDef, with_time: bool) -> Self {
        let decays = !self.particle.is_stable();
        let top = definition.max_node_energy.max(10.0 * self.particle.low);
        let interaction_origin = self.choose_origin(Integrand::Interaction, top);
        let decay_origin = self.choose_origin(Integrand::Decay, top);

        let mut builder = FingerprintBuilder::new("utility");
        builder = self.particle.fingerprint_into(builder);
        builder = builder.integer("cross_sections", self.cross_sections.len() as u64);
        for cross_section in &self.cross_sections {
            builder = cross_section.parametrization().fingerprint_into(builder);
        }
        builder = definition
            .fingerprint_into(builder)
            .flag("interaction_from_low", interaction_origin == TrackingOrigin::Low)
            .flag("decay_from_low", decay_origin == TrackingOrigin::Low)
            .flag("decay", decays)
            .flag("time", with_time);
        let fingerprint = builder.finish();

        let mut plan = vec![
            (Integrand::Displacement, TrackingOrigin::Low),
            (Integrand::Interaction, interaction_origin),
        ];
        if decays {
            plan.push((Integrand::Decay, decay_origin));
        }
        if with_time {
            plan.push((Integrand::Time, TrackingOrigin::Low));
        }
        let layout = vec![TableKind::One; 2 * plan.len()];
        let axis = Axis::logarithmic(self.particle.low, top, definition.nodes_utility);

        let store = definition.table_store();
        let tables = store.load_or_build("utility", &fingerprint, &layout, || {
            let mut tables = Vec::with_capacity(layout.len());
            for &(integrand, origin) in &plan {
                let (values, rates) = self.build_cumulative(integrand, origin, axis, definition.order);
                tables.push(Table::One(values));
                tables.push(Table::One(rates));
            }
            tables
        });

        let mut one_dimensional = tables.into_iter().filter_map(|t| match t {
            Table::One(table) => Some(table),
            Table::Two(_) => None,
        });
        let mut next = |origin| match (one_dimensional.next(), one_dimensional.next()) {
            (Some(values), Some(rates)) => Some(CumulativeTable::from_tables(origin, values, rates)),
            _ => None,
        };

        let displacement = next(TrackingOrigin::Low);
        let interaction = next(interaction_origin);
        let decay = if decays { next(decay_origin) } else { None };
        let time = if with_time { next(TrackingOrigin::Low) } else { None };

        if let (Some(displacement), Some(interaction)) = (displacement, interaction) {
            info!(particle = %self.particle.name, medium = self.medium.name(), "propagation utility interpolated");
            self.tables = Some(UtilityTables { displacement, interaction, decay, time });
        }
        self
    }

    fn build_cumulative(
        &self,
        integrand: Integrand,
        origin: TrackingOrigin,
        axis: Axis,
        order: usize,
    ) -> (Interpolant1D, Interpolant1D) {
        let nodes: Vec<f64> = (0..axis.nodes).map(|i| axis.node(i)).collect();
        let segments: Vec<f64> = nodes
            .par_windows(2)
            .map(|w| self.integrator.integrate_log(w[0], w[1], |e| self.integrand(integrand, e)))
            .collect();

        let mut values = vec![0.0; axis.nodes];
        match origin {
            TrackingOrigin::Low => {
                for i in 1..axis.nodes {
                    values[i] = values[i - 1] + segments[i - 1];
                }
            }
            TrackingOrigin::High => {
                for i in (0..axis.nodes - 1).rev() {
                    values[i] = values[i + 1] + segments[i];
                }
            }
        }

        let cumulative = Interpolant1D::from_samples(axis, order, TableFlags::default(), values);
        let rates = Interpolant1D::build(axis, order, TableFlags::default().with_log_y(), |e| {
            self.integrand(integrand, e)
        });
        (cumulative, rates)
    }

    /// Low if the hazard near the cutoff is smaller than near the top;
    /// a tie goes to the top
    fn choose_origin(&self, integrand: Integrand, top: f64) -> TrackingOrigin {
        let low = self.particle.low;
        let f = |e: f64| self.integrand(integrand, e);
        let near_low = self.integrator.integrate_log(low, 10.0 * low, f).abs();
        let near_top = self.integrator.integrate_log(top / 10.0, top, f).abs();
        if near_low < near_top {
            TrackingOrigin::Low
        } else {
            TrackingOrigin::High
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn particle(&self) -> &ParticleDef {
        &self.particle
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn cross_sections(&self) -> &[CrossSection] {
        &self.cross_sections
    }

    pub fn decay_table(&self) -> &DecayTable {
        &self.particle.decay_table
    }

    pub fn low(&self) -> f64 {
        self.particle.low
    }

    pub fn is_interpolated(&self) -> bool {
        self.tables.is_some()
    }

    pub fn tracking_origin(&self, kind: TrackingKind) -> Option<TrackingOrigin> {
        let tables = self.tables.as_ref()?;
        match kind {
            TrackingKind::Interaction => Some(tables.interaction.origin),
            TrackingKind::Decay => tables.decay.as_ref().map(|t| t.origin),
        }
    }

    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.cross_sections.iter().map(CrossSection::name).collect();
        format!(
            "{} in {} [{}], low = {:.3} MeV, {}",
            self.particle.name,
            self.medium.name(),
            names.join(", "),
            self.particle.low,
            if self.is_interpolated() { "interpolated" } else { "direct" }
        )
    }

    // ------------------------------------------------------------------------
    // Rates
    // ------------------------------------------------------------------------

    /// Σ dE/dx (MeV/cm)
    pub fn total_dedx(&self, energy: f64) -> f64 {
        self.cross_sections.iter().map(|c| c.calculate_dedx(energy)).sum()
    }

    /// Σ dN/dx (1/cm)
    pub fn total_dndx(&self, energy: f64) -> f64 {
        self.cross_sections.iter().map(|c| c.calculate_dndx(energy)).sum()
    }

    fn integrand(&self, integrand: Integrand, energy: f64) -> f64 {
        let dedx = self.total_dedx(energy);
        if !(dedx > 0.0) {
            return 0.0;
        }
        match integrand {
            Integrand::Displacement => 1.0 / dedx,
            Integrand::Interaction => self.total_dndx(energy) / dedx,
            Integrand::Decay => match self.particle.lifetime {
                Some(lifetime) if !self.particle.is_stable() => {
                    let momentum = self.particle.momentum(energy);
                    if momentum > 0.0 {
                        self.particle.mass / (dedx * momentum * SPEED_OF_LIGHT * lifetime)
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            },
            Integrand::Time => {
                let momentum = self.particle.momentum(energy);
                if momentum > 0.0 {
                    energy / (dedx * momentum * SPEED_OF_LIGHT)
                } else {
                    0.0
                }
            }
        }
    }

    fn direct_integral(&self, integrand: Integrand, ei: f64, ef: f64) -> f64 {
        if ei <= ef {
            return 0.0;
        }
        let ef = ef.max(self.particle.low);
        self.integrator.integrate_log(ef, ei, |e| self.integrand(integrand, e)).max(0.0)
    }

    /// Energy after absorbing `amount` of the integral from `ei` downward
    fn direct_inverse(&self, integrand: Integrand, ei: f64, amount: f64) -> f64 {
        let solution = self
            .integrator
            .integrate_with_limit(ei, self.particle.low, |e| self.integrand(integrand, e), amount);
        if solution.reached {
            solution.limit
        } else {
            self.particle.low
        }
    }

    fn clamp_energy(&self, energy: f64, ei: f64) -> f64 {
        if energy.is_nan() {
            return self.particle.low;
        }
        energy.clamp(self.particle.low.min(ei), ei)
    }

    // ------------------------------------------------------------------------
    // Integrals
    // ------------------------------------------------------------------------

    /// Path length (cm) of a continuous loss from `ei` to `ef`
    pub fn calculate_displacement(&self, ei: f64, ef: f64) -> f64 {
        match &self.tables {
            Some(tables) => tables.displacement.integral(ei, ef),
            None => self.direct_integral(Integrand::Displacement, ei, ef),
        }
    }

    /// Energy (MeV) after a continuous loss over `distance` cm from `ei`
    pub fn calculate_final_energy_for_distance(&self, ei: f64, distance: f64) -> f64 {
        if !(distance > 0.0) || ei <= self.particle.low {
            return ei;
        }
        let energy = match &self.tables {
            Some(tables) => {
                if distance >= tables.displacement.total(ei) {
                    self.particle.low
                } else {
                    tables.displacement.inverse(ei, distance)
                }
            }
            None => self.direct_inverse(Integrand::Displacement, ei, distance),
        };
        self.clamp_energy(energy, ei)
    }

    /// Hazard accumulated from `energy` down to the cutoff
    pub fn calculate_tracking_integral(&self, energy: f64, kind: TrackingKind) -> f64 {
        if kind == TrackingKind::Decay && self.particle.is_stable() {
            return 0.0;
        }
        match (&self.tables, kind) {
            (Some(tables), TrackingKind::Interaction) => tables.interaction.total(energy),
            (Some(tables), TrackingKind::Decay) => tables.decay.as_ref().map_or(0.0, |t| t.total(energy)),
            (None, _) => self.direct_integral(kind.into(), energy, self.particle.low),
        }
    }

    /// Energy at which the hazard accumulated from `energy` equals `rnd`;
    /// the cutoff if it is never reached
    pub fn calculate_final_energy(&self, energy: f64, rnd: f64, kind: TrackingKind) -> f64 {
        if !(rnd > 0.0) {
            return energy;
        }
        if kind == TrackingKind::Decay && self.particle.is_stable() {
            return self.particle.low;
        }
        let table = self.tables.as_ref().and_then(|tables| match kind {
            TrackingKind::Interaction => Some(&tables.interaction),
            TrackingKind::Decay => tables.decay.as_ref(),
        });
        let result = match table {
            Some(table) => {
                if rnd >= table.total(energy) {
                    self.particle.low
                } else {
                    table.inverse(energy, rnd)
                }
            }
            None => self.direct_inverse(kind.into(), energy, rnd),
        };
        self.clamp_energy(result, energy)
    }

    /// Time (s) spent losing energy continuously from `ei` to `ef`
    pub fn calculate_particle_time(&self, ei: f64, ef: f64) -> f64 {
        match self.tables.as_ref().and_then(|t| t.time.as_ref()) {
            Some(table) => table.integral(ei, ef),
            None => self.direct_integral(Integrand::Time, ei, ef),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::EnergyCutSettings;
    use crate::crosssection::Parametrization;
    use approx::assert_relative_eq;

    fn setup(particle: ParticleDef) -> ProcessSetup {
        ProcessSetup::new(particle, Arc::new(Medium::ice()), Arc::new(EnergyCutSettings::new(500.0, 0.05)))
    }

    fn direct(particle: ParticleDef) -> PropagationUtility {
        let setup = setup(particle.clone());
        let cross_sections = vec![
            CrossSection::direct(Parametrization::ionization(setup.clone())),
            CrossSection::direct(Parametrization::bremsstrahlung(setup.clone(), false)),
        ];
        PropagationUtility::new(particle, Arc::clone(&setup.medium), cross_sections)
    }

    fn small_tables() -> InterpolationDef {
        InterpolationDef::default().with_nodes(40, 60).with_max_node_energy(1e8)
    }

    fn cached(particle: ParticleDef) -> PropagationUtility {
        let setup = setup(particle.clone());
        let definition = small_tables();
        let cross_sections = vec![
            CrossSection::cached(Parametrization::ionization(setup.clone()), &definition),
            CrossSection::cached(Parametrization::bremsstrahlung(setup.clone(), false), &definition),
        ];
        PropagationUtility::new(particle, Arc::clone(&setup.medium), cross_sections).interpolated(&definition, true)
    }

    #[test]
    fn test_displacement_basics() {
        let utility = direct(ParticleDef::mu_minus());
        assert_eq!(utility.calculate_displacement(1e5, 1e5), 0.0);
        assert_eq!(utility.calculate_displacement(1e4, 1e5), 0.0);
        let short = utility.calculate_displacement(1e5, 9e4);
        let long = utility.calculate_displacement(1e5, 1e4);
        assert!(short > 0.0 && long > short);
    }

    #[test]
    fn test_displacement_of_small_step() {
        let utility = direct(ParticleDef::mu_minus());
        let energy = 1e5;
        let step = 1.0;
        let expected = step / utility.total_dedx(energy);
        assert_relative_eq!(utility.calculate_displacement(energy, energy - step), expected, max_relative = 1e-4);
    }

    #[test]
    fn test_final_energy_inverts_displacement() {
        let utility = direct(ParticleDef::mu_minus());
        let distance = utility.calculate_displacement(1e6, 2e5);
        let energy = utility.calculate_final_energy_for_distance(1e6, distance);
        assert_relative_eq!(energy, 2e5, max_relative = 1e-4);
        assert_eq!(utility.calculate_final_energy_for_distance(1e6, 1e12), utility.low());
        assert_eq!(utility.calculate_final_energy_for_distance(1e6, 0.0), 1e6);
    }

    #[test]
    fn test_tracking_inversion() {
        let utility = direct(ParticleDef::mu_minus());
        let total = utility.calculate_tracking_integral(1e6, TrackingKind::Interaction);
        assert!(total > 1.0);
        let energy = utility.calculate_final_energy(1e6, 1.0, TrackingKind::Interaction);
        assert!(energy < 1e6 && energy > utility.low());
        let above = utility.calculate_final_energy(1e6, 2.0 * total, TrackingKind::Interaction);
        assert_eq!(above, utility.low());
    }

    #[test]
    fn test_stable_particle_never_decays() {
        let utility = direct(ParticleDef::e_minus());
        assert_eq!(utility.calculate_tracking_integral(1e4, TrackingKind::Decay), 0.0);
        assert_eq!(utility.calculate_final_energy(1e4, 0.5, TrackingKind::Decay), utility.low());
    }

    #[test]
    fn test_particle_time_close_to_light_travel() {
        let utility = direct(ParticleDef::mu_minus());
        let (ei, ef) = (1e6, 5e5);
        let time = utility.calculate_particle_time(ei, ef);
        let light = utility.calculate_displacement(ei, ef) / SPEED_OF_LIGHT;
        assert!(time >= light * (1.0 - 1e-5));
        assert_relative_eq!(time, light, max_relative = 1e-5);
    }

    #[test]
    fn test_tracking_origins() {
        let utility = cached(ParticleDef::mu_minus());
        assert!(utility.is_interpolated());
        assert_eq!(utility.tracking_origin(TrackingKind::Interaction), Some(TrackingOrigin::Low));
        assert_eq!(utility.tracking_origin(TrackingKind::Decay), Some(TrackingOrigin::High));
        assert_eq!(direct(ParticleDef::mu_minus()).tracking_origin(TrackingKind::Decay), None);
    }

    #[test]
    fn test_cached_matches_direct() {
        let exact = direct(ParticleDef::mu_minus());
        let table = cached(ParticleDef::mu_minus());
        for (ei, ef) in [(1e6, 1e4), (3e7, 2e6), (5e4, 2e3)] {
            assert_relative_eq!(
                table.calculate_displacement(ei, ef),
                exact.calculate_displacement(ei, ef),
                max_relative = 1e-2
            );
            assert_relative_eq!(
                table.calculate_particle_time(ei, ef),
                exact.calculate_particle_time(ei, ef),
                max_relative = 1e-2
            );
        }
        for energy in [2e4, 1e6] {
            for kind in [TrackingKind::Interaction, TrackingKind::Decay] {
                assert_relative_eq!(
                    table.calculate_tracking_integral(energy, kind),
                    exact.calculate_tracking_integral(energy, kind),
                    max_relative = 2e-2
                );
            }
        }
        let energy = 1e6;
        let a = exact.calculate_final_energy(energy, 1.0, TrackingKind::Interaction);
        let b = table.calculate_final_energy(energy, 1.0, TrackingKind::Interaction);
        assert_relative_eq!(a, b, max_relative = 5e-2);
    }

    #[test]
    fn test_cached_final_energy_for_short_distance() {
        let utility = cached(ParticleDef::mu_minus());
        let ei = 1e6;
        let energy = utility.calculate_final_energy_for_distance(ei, 1e-6);
        assert!(energy <= ei && energy > ei - 1e-3);
    }

    #[test]
    fn test_from_definition() {
        let definition = SectorDefinition {
            medium: "water".into(),
            do_interpolation: false,
            ..SectorDefinition::default()
        };
        let utility = PropagationUtility::from_definition(&definition, &ParametrizationRegistry::standard());
        let Ok(utility) = utility else {
            panic!("utility could not be built");
        };
        assert_eq!(utility.cross_sections().len(), 2);
        assert_eq!(utility.medium().name(), "water");
        assert!(!utility.is_interpolated());
    }
}
