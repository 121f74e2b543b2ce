//! # Cross Sections
//!
//! A process bound to a particle, medium and cuts, exposing
//!
//! - the continuous rate dE/dx = E Σ_i n_i ∫_{v_min}^{v_up} v dσ_i/dv dv
//! - the stochastic rate dN/dx = Σ_i n_i ∫_{v_up}^{v_max} dσ_i/dv dv
//! - sampling of a stochastic loss above the cut
//!
//! ## Strategies
//!
//! `Direct` evaluates every integral with the quadrature engine on demand.
//! `Cached` builds interpolation tables once over [low, max node energy]:
//! a 1-D table of dE/dx, and per component a 2-D table of the cumulative
//! integral ∫_{v_up}^{v(x)} dσ/dv with v(x) = v_up (v_max/v_up)^x, x ∈ [0, 1].
//! The x = 1 column is the per-component rate. Sampling inverts the 2-D
//! table in x at fixed energy.
//!
//! The cut min(ecut/E, vcut) switches branch at E = ecut/vcut, where every
//! rate is continuous but not smooth. The energy range is split into two
//! segments there, each with its own set of tables, so the kink falls on a
//! node instead of inside a local fit.
//!
//! Sampling is two-stage: a component is drawn in proportion to its rate,
//! then the loss fraction is drawn from that component's distribution.
//! The rates of the first stage are handed back by the caller as a
//! [`ComponentRates`] value.

pub mod parametrization;
pub mod registry;

pub use parametrization::{IntegralLimits, Parametrization, ProcessSetup};
pub use registry::ParametrizationRegistry;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::config::InterpolationDef;
use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource, Table, TableKind};
use crate::interpolation::{Axis, Interpolant1D, Interpolant2D, TableFlags};
use crate::quadrature::Integrator;

// ============================================================================
// COMPONENT RATES
// ============================================================================

/// Stochastic rate of each medium component at one energy (1/cm)
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRates {
    rates: Vec<f64>,
    total: f64,
}

impl ComponentRates {
    fn new(rates: Vec<f64>) -> Self {
        let total = rates.iter().sum();
        Self { rates, total }
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Component holding the draw `rnd` in [0, 1) of the cumulative rate
    fn select(&self, rnd: f64) -> Option<usize> {
        if !(self.total > 0.0) {
            return None;
        }
        let target = rnd * self.total;
        let mut sum = 0.0;
        for (i, rate) in self.rates.iter().enumerate() {
            sum += rate;
            if sum > target {
                return Some(i);
            }
        }
        self.rates.iter().rposition(|&r| r > 0.0)
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// Tables over one energy segment
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    dedx: Interpolant1D,
    dndx: Vec<Interpolant2D>,
    /// x = 1 columns of `dndx`
    rates: Vec<Interpolant1D>,
}

/// Segments in increasing energy, sharing their edges
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTables {
    segments: Vec<Segment>,
}

/// Set once the first query above the tabulated range was logged
static ABOVE_RANGE_REPORTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Direct,
    Cached(CachedTables),
    /// Multiplier ≤ 0
    Disabled,
}

/// One process with its evaluation strategy
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSection {
    parametrization: Parametrization,
    integrator: Integrator,
    strategy: Strategy,
}

impl CrossSection {
    /// Recompute every integral on demand
    pub fn direct(parametrization: Parametrization) -> Self {
        let strategy = if parametrization.is_enabled() { Strategy::Direct } else { Strategy::Disabled };
        Self { parametrization, integrator: Integrator::default(), strategy }
    }

    /// Load or build interpolation tables for this process
    pub fn cached(parametrization: Parametrization, definition: &InterpolationDef) -> Self {
        let mut cross_section = Self::direct(parametrization);
        if cross_section.strategy == Strategy::Disabled {
            return cross_section;
        }

        let components = cross_section.parametrization.medium().components().len();
        let axes = cross_section.energy_axes(definition);
        let mut layout = Vec::with_capacity(axes.len() * (components + 1));
        for _ in &axes {
            layout.push(TableKind::One);
            layout.extend(std::iter::repeat(TableKind::Two).take(components));
        }

        let fingerprint = cross_section
            .parametrization
            .fingerprint_into(definition.fingerprint_into(FingerprintBuilder::new("crosssection")))
            .finish();
        let store = definition.table_store();
        let tables = store.load_or_build(cross_section.parametrization.name(), &fingerprint, &layout, || {
            cross_section.build_tables(&axes, definition)
        });

        cross_section.strategy = Strategy::Cached(CachedTables::from_tables(tables, components));
        cross_section
    }

    /// Energy axes of the table segments, split at the cut transition when
    /// it lies inside the tabulated range
    fn energy_axes(&self, definition: &InterpolationDef) -> Vec<Axis> {
        let low = self.parametrization.particle().low;
        let high = definition.max_node_energy.max(low * 10.0);
        let nodes = definition.nodes_cross_section;
        match self.parametrization.setup().cuts.transition_energy() {
            Some(kink) if kink > low && kink < high => {
                vec![Axis::logarithmic(low, kink, nodes), Axis::logarithmic(kink, high, nodes)]
            }
            _ => vec![Axis::logarithmic(low, high, nodes)],
        }
    }

    fn build_tables(&self, axes: &[Axis], definition: &InterpolationDef) -> Vec<Table> {
        let fraction_axis = Axis::linear(0.0, 1.0, definition.nodes_cross_section);
        let order = definition.order;
        let components = self.parametrization.medium().components().len();

        let mut tables = Vec::with_capacity(axes.len() * (components + 1));
        for &energy_axis in axes {
            let dedx = Interpolant1D::build(energy_axis, order, TableFlags::default().with_log_y(), |e| {
                self.direct_dedx(e)
            });
            tables.push(Table::One(dedx));

            for component in 0..components {
                let table = Interpolant2D::build(
                    energy_axis,
                    fraction_axis,
                    order,
                    TableFlags::default().with_rational(),
                    |e, x| self.cumulative_integral(e, x, component).max(0.0),
                );
                tables.push(Table::Two(table));
            }
        }
        tables
    }

    pub fn parametrization(&self) -> &Parametrization {
        &self.parametrization
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn name(&self) -> &'static str {
        self.parametrization.name()
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.strategy, Strategy::Cached(_))
    }

    // ------------------------------------------------------------------------
    // Rates
    // ------------------------------------------------------------------------

    /// Continuous energy loss rate at E (MeV/cm)
    pub fn calculate_dedx(&self, energy: f64) -> f64 {
        match &self.strategy {
            Strategy::Disabled => 0.0,
            Strategy::Direct => self.direct_dedx(energy),
            Strategy::Cached(tables) => tables.segment(self.name(), energy).dedx.evaluate(energy).max(0.0),
        }
    }

    /// Stochastic interaction rate at E (1/cm)
    pub fn calculate_dndx(&self, energy: f64) -> f64 {
        self.calculate_component_rates(energy).total()
    }

    /// Stochastic rate per medium component at E (1/cm)
    pub fn calculate_component_rates(&self, energy: f64) -> ComponentRates {
        let densities = self.parametrization.medium().number_densities();
        let multiplier = self.parametrization.multiplier();
        let rates = match &self.strategy {
            Strategy::Disabled => vec![0.0; densities.len()],
            Strategy::Direct => densities
                .iter()
                .enumerate()
                .map(|(i, n)| multiplier * n * self.direct_dndx(energy, i))
                .collect(),
            Strategy::Cached(tables) => densities
                .iter()
                .zip(&tables.segment(self.name(), energy).rates)
                .map(|(n, table)| multiplier * n * table.evaluate(energy).max(0.0))
                .collect(),
        };
        ComponentRates::new(rates)
    }

    /// Energy lost in one stochastic interaction at E (MeV), None if the
    /// process has no phase space above the cut at this energy
    pub fn sample_loss(&self, energy: f64, rates: &ComponentRates, rnd_component: f64, rnd_fraction: f64) -> Option<f64> {
        let Some(component) = rates.select(rnd_component) else {
            let collapsed = (0..rates.rates.len()).all(|i| self.parametrization.limits(energy, i).is_collapsed());
            debug!(
                process = self.name(),
                energy,
                collapsed,
                "no stochastic phase space, skipping interaction"
            );
            return None;
        };

        let limits = self.parametrization.limits(energy, component);
        if limits.is_collapsed() {
            return None;
        }
        let density = self.parametrization.medium().number_densities()[component];
        let per_atom = rates.rates[component] / (density * self.parametrization.multiplier());
        let target = rnd_fraction * per_atom;

        let v = match &self.strategy {
            Strategy::Disabled => return None,
            Strategy::Direct => {
                self.integrator
                    .integrate_with_limit(
                        limits.v_up,
                        limits.v_max,
                        |v| self.parametrization.differential(energy, v, component),
                        target,
                    )
                    .limit
            }
            Strategy::Cached(tables) => {
                let x = tables.segment(self.name(), energy).dndx[component].find_limit(energy, target);
                limits.v_up * (x * (limits.v_max / limits.v_up).ln()).exp()
            }
        };
        Some(energy * v.clamp(limits.v_up, limits.v_max))
    }

    // ------------------------------------------------------------------------
    // Integrals
    // ------------------------------------------------------------------------

    fn direct_dedx(&self, energy: f64) -> f64 {
        let densities = self.parametrization.medium().number_densities();
        let sum: f64 = densities
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let limits = self.parametrization.limits(energy, i);
                let integrand = |v: f64| self.parametrization.dedx_integrand(energy, v, i);
                let integral = if limits.v_min > 0.0 {
                    self.integrator.integrate_log(limits.v_min, limits.v_up, integrand)
                } else {
                    self.integrator.integrate_open(limits.v_min, limits.v_up, integrand)
                };
                n * integral
            })
            .sum();
        (self.parametrization.multiplier() * energy * sum).max(0.0)
    }

    /// ∫_{v_up}^{v_max} dσ/dv per atom of `component`
    fn direct_dndx(&self, energy: f64, component: usize) -> f64 {
        let limits = self.parametrization.limits(energy, component);
        if limits.is_collapsed() {
            return 0.0;
        }
        self.integrator
            .integrate_log(limits.v_up, limits.v_max, |v| {
                self.parametrization.differential(energy, v, component)
            })
            .max(0.0)
    }

    /// ∫_{v_up}^{v(x)} dσ/dv per atom, v(x) = v_up (v_max/v_up)^x
    fn cumulative_integral(&self, energy: f64, x: f64, component: usize) -> f64 {
        let limits = self.parametrization.limits(energy, component);
        if limits.is_collapsed() {
            return 0.0;
        }
        let v = limits.v_up * (x * (limits.v_max / limits.v_up).ln()).exp();
        self.integrator.integrate_log(limits.v_up, v.min(limits.v_max), |v| {
            self.parametrization.differential(energy, v, component)
        })
    }
}

impl Segment {
    fn new(dedx: Interpolant1D, dndx: Vec<Interpolant2D>) -> Self {
        let rates = dndx.iter().map(|t| t.column(t.axes().1.nodes - 1)).collect();
        Self { dedx, dndx, rates }
    }

    fn max_energy(&self) -> f64 {
        self.dedx.axis().max
    }
}

impl CachedTables {
    /// Group tables laid out as `[One, Two × components]` per segment
    fn from_tables(tables: Vec<Table>, components: usize) -> Self {
        let mut segments = Vec::new();
        let mut dedx = None;
        let mut dndx = Vec::with_capacity(components);
        for table in tables {
            match table {
                Table::One(table) => dedx = Some(table),
                Table::Two(table) => dndx.push(table),
            }
            if dndx.len() == components {
                if let Some(dedx) = dedx.take() {
                    segments.push(Segment::new(dedx, std::mem::take(&mut dndx)));
                }
            }
        }
        if segments.is_empty() {
            let empty = Interpolant1D::from_samples(Axis::linear(0.0, 1.0, 2), 1, TableFlags::default(), vec![0.0, 0.0]);
            segments.push(Segment::new(empty, Vec::new()));
        }
        Self { segments }
    }

    /// Segment covering E; above the last edge the tables clamp
    fn segment(&self, process: &str, energy: f64) -> &Segment {
        let last = self.segments.len() - 1;
        let index = self.segments.iter().position(|s| energy <= s.max_energy()).unwrap_or(last);
        let segment = &self.segments[index];
        if energy > segment.max_energy() && !ABOVE_RANGE_REPORTED.swap(true, Ordering::Relaxed) {
            warn!(
                process,
                energy,
                max_node_energy = segment.max_energy(),
                "energy above the tabulated range, clamping to the last node; raise max_node_energy"
            );
        }
        segment
    }

    pub fn segments(&self) -> usize {
        self.segments.len()
    }

    /// Upper edge of the tabulated range (MeV)
    pub fn max_energy(&self) -> f64 {
        self.segments.last().map_or(0.0, Segment::max_energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::EnergyCutSettings;
    use crate::medium::Medium;
    use crate::particle::ParticleDef;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn setup() -> ProcessSetup {
        ProcessSetup::new(
            ParticleDef::mu_minus(),
            Arc::new(Medium::water()),
            Arc::new(EnergyCutSettings::new(500.0, 0.05)),
        )
    }

    fn small_tables() -> InterpolationDef {
        InterpolationDef::default().with_nodes(40, 60).with_max_node_energy(1e8)
    }

    #[test]
    fn test_disabled_process() {
        let brems = Parametrization::bremsstrahlung(setup().with_multiplier(0.0), false);
        let direct = CrossSection::direct(brems.clone());
        let cached = CrossSection::cached(brems, &small_tables());
        for xs in [direct, cached] {
            assert_eq!(xs.strategy(), &Strategy::Disabled);
            assert_eq!(xs.calculate_dedx(1e5), 0.0);
            assert_eq!(xs.calculate_dndx(1e5), 0.0);
            let rates = xs.calculate_component_rates(1e5);
            assert_eq!(xs.sample_loss(1e5, &rates, 0.5, 0.5), None);
        }
    }

    #[test]
    fn test_multiplier_scales_rates() {
        let one = CrossSection::direct(Parametrization::bremsstrahlung(setup(), false));
        let two = CrossSection::direct(Parametrization::bremsstrahlung(setup().with_multiplier(2.0), false));
        assert_relative_eq!(two.calculate_dedx(1e6), 2.0 * one.calculate_dedx(1e6), max_relative = 1e-12);
        assert_relative_eq!(two.calculate_dndx(1e6), 2.0 * one.calculate_dndx(1e6), max_relative = 1e-12);
    }

    #[test]
    fn test_ionization_dedx_magnitude() {
        let ion = CrossSection::direct(Parametrization::ionization(setup()));
        let dedx = ion.calculate_dedx(1e4);
        assert!(dedx > 0.5 && dedx < 5.0, "dE/dx = {dedx}");
    }

    #[test]
    fn test_sampled_loss_above_cut() {
        let brems = CrossSection::direct(Parametrization::bremsstrahlung(setup(), false));
        let energy = 1e6;
        let rates = brems.calculate_component_rates(energy);
        assert!(rates.total() > 0.0);
        for (rc, rf) in [(0.1, 0.0), (0.5, 0.5), (0.9, 0.999)] {
            let loss = brems.sample_loss(energy, &rates, rc, rf);
            let Some(loss) = loss else {
                panic!("no loss sampled");
            };
            assert!(loss >= 500.0 * (1.0 - 1e-9) && loss < energy);
        }
    }

    #[test]
    fn test_sample_monotone_in_fraction() {
        let brems = CrossSection::direct(Parametrization::bremsstrahlung(setup(), false));
        let energy = 1e6;
        let rates = brems.calculate_component_rates(energy);
        let a = brems.sample_loss(energy, &rates, 0.5, 0.2).unwrap_or(0.0);
        let b = brems.sample_loss(energy, &rates, 0.5, 0.8).unwrap_or(0.0);
        assert!(a < b);
    }

    #[test]
    fn test_collapsed_limits_give_no_interaction() {
        let brems = CrossSection::direct(Parametrization::bremsstrahlung(setup(), false));
        let energy = 1.2 * crate::constants::MMU;
        let rates = brems.calculate_component_rates(energy);
        assert_eq!(rates.total(), 0.0);
        assert_eq!(brems.sample_loss(energy, &rates, 0.5, 0.5), None);
    }

    #[test]
    fn test_cached_matches_direct() {
        let param = Parametrization::bremsstrahlung(setup(), false);
        let direct = CrossSection::direct(param.clone());
        let cached = CrossSection::cached(param, &small_tables());
        assert!(cached.is_cached());
        for energy in [1.3e4, 4.5e4, 7e5, 2e7] {
            assert_relative_eq!(cached.calculate_dedx(energy), direct.calculate_dedx(energy), max_relative = 5e-3);
            assert_relative_eq!(cached.calculate_dndx(energy), direct.calculate_dndx(energy), max_relative = 1e-2);
        }
    }

    #[test]
    fn test_cached_dedx_across_cut_transition() {
        for param in [Parametrization::ionization(setup()), Parametrization::bremsstrahlung(setup(), false)] {
            let direct = CrossSection::direct(param.clone());
            let cached = CrossSection::cached(param, &small_tables());
            let Strategy::Cached(tables) = cached.strategy() else {
                panic!("{} not cached", cached.name());
            };
            assert_eq!(tables.segments(), 2);
            assert_eq!(tables.max_energy(), 1e8);
            for energy in [6e3, 9.3e3, 1e4, 1.07e4, 1.6e4] {
                assert_relative_eq!(cached.calculate_dedx(energy), direct.calculate_dedx(energy), max_relative = 5e-3);
                assert_relative_eq!(cached.calculate_dndx(energy), direct.calculate_dndx(energy), max_relative = 1e-2);
            }
        }
    }

    #[test]
    fn test_single_segment_without_absolute_cut() {
        let setup = ProcessSetup::new(
            ParticleDef::mu_minus(),
            Arc::new(Medium::water()),
            Arc::new(EnergyCutSettings::new(-1.0, 0.05)),
        );
        let cached = CrossSection::cached(Parametrization::bremsstrahlung(setup, false), &small_tables());
        let Strategy::Cached(tables) = cached.strategy() else {
            panic!("not cached");
        };
        assert_eq!(tables.segments(), 1);
    }

    #[test]
    fn test_cached_component_rates_and_losses_match_direct() {
        let param = Parametrization::bremsstrahlung(setup(), false);
        let direct = CrossSection::direct(param.clone());
        let cached = CrossSection::cached(param, &small_tables());
        for energy in [2e4, 1e6] {
            let exact = direct.calculate_component_rates(energy);
            let tabulated = cached.calculate_component_rates(energy);
            for (a, b) in tabulated.rates().iter().zip(exact.rates()) {
                assert!(*b > 0.0);
                assert_relative_eq!(*a, *b, max_relative = 1e-2);
            }
            for (rc, rf) in [(0.2, 0.1), (0.7, 0.5), (0.95, 0.9)] {
                let a = direct.sample_loss(energy, &exact, rc, rf).unwrap_or(0.0);
                let b = cached.sample_loss(energy, &exact, rc, rf).unwrap_or(0.0);
                assert!(a > 0.0);
                assert_relative_eq!(a, b, max_relative = 5e-2);
            }
        }
    }

    #[test]
    fn test_energy_above_tables_is_clamped() {
        let param = Parametrization::ionization(setup());
        let cached = CrossSection::cached(param, &small_tables());
        assert_eq!(cached.calculate_dedx(1e10), cached.calculate_dedx(1e8));
    }

    #[test]
    fn test_cached_sampling_close_to_direct() {
        let param = Parametrization::bremsstrahlung(setup(), false);
        let direct = CrossSection::direct(param.clone());
        let cached = CrossSection::cached(param, &small_tables());
        let energy = 1e6;
        let rates = direct.calculate_component_rates(energy);
        let a = direct.sample_loss(energy, &rates, 0.7, 0.5).unwrap_or(0.0);
        let b = cached.sample_loss(energy, &rates, 0.7, 0.5).unwrap_or(0.0);
        assert_relative_eq!(a, b, max_relative = 5e-2);
    }
}
