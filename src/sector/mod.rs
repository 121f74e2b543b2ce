//! # Sector Stepper
//!
//! Monte Carlo transport of one particle through one homogeneous region.
//!
//! ## Stepping
//!
//! Each step races the two stochastic hazards of the particle. Two
//! exponential variates ξ_D and ξ_I are turned into the energies at which
//! the accumulated decay and interaction hazards would reach them. The
//! higher energy is the next event (decay on a tie). The particle then
//! loses energy continuously down to that energy, unless the requested
//! distance runs out first:
//!
//! ```text
//!            ┌──────────── Continuous ◄────────────┐
//!            │                 │                   │
//!   distance reached      event energy        loss sampled
//!            │            ┌────┴─────┐             │
//!            ▼            ▼          ▼             │
//!         Stopped ◄──── Decay    Interaction ──────┘
//! ```
//!
//! The sign of the returned value tells the two outcomes apart: the final
//! energy (MeV, > 0) if the distance was covered, otherwise the negative
//! travelled distance (cm).

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, trace};

use crate::config::SectorDefinition;
use crate::constants::{COMPUTER_PRECISION, SPEED_OF_LIGHT};
use crate::crosssection::ParametrizationRegistry;
use crate::error::Result;
use crate::geometry::Sphere;
use crate::particle::ParticleState;
use crate::scattering::Scattering;
use crate::types::Vec3;
use crate::utility::{PropagationUtility, TrackingKind};

// ============================================================================
// WEIGHTING
// ============================================================================

/// Importance sampling of the first stochastic loss after a given distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weighting {
    pub enabled: bool,
    /// Remapping order n
    pub order: f64,
    /// Propagated distance after which the remap applies (cm)
    pub starts_at: f64,
    /// Accumulated event weight
    pub weight: f64,
}

impl Default for Weighting {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Weighting {
    pub fn disabled() -> Self {
        Self { enabled: false, order: 0.0, starts_at: 0.0, weight: 1.0 }
    }

    pub fn new(order: f64, starts_at: f64) -> Self {
        Self { enabled: true, order, starts_at, weight: 1.0 }
    }

    pub fn applies(&self, propagated_distance: f64) -> bool {
        self.enabled && propagated_distance > self.starts_at
    }

    /// Remap the loss draw `u`, record its weight and switch off
    pub fn remap(&mut self, u: f64) -> f64 {
        let n = self.order;
        let remapped = if n > 0.0 { 1.0 - u.powf(n + 1.0) } else { u.powf(n + 1.0) };
        self.weight *= (1.0 + n.abs()) * u.powf(n.abs());
        self.enabled = false;
        remapped
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SecondaryKind {
    /// Stochastic loss of the named process
    Loss(&'static str),
    /// Decay product of the named species
    DecayProduct(String),
}

/// Emitted energy deposit or decay product
#[derive(Debug, Clone, PartialEq)]
pub struct Secondary {
    pub kind: SecondaryKind,
    /// Energy (MeV)
    pub energy: f64,
    /// Position (cm)
    pub position: Vec3,
    pub direction: Vec3,
    /// Time of emission (s)
    pub time: f64,
    /// Propagated distance of the parent (cm)
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The requested distance was covered
    DistanceReached,
    /// The energy fell to the cutoff
    Stopped,
    Decayed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropagationResult {
    /// Final energy (MeV) if positive, negative travelled distance (cm) otherwise
    pub value: f64,
    pub termination: Termination,
    pub secondaries: Vec<Secondary>,
    pub weighting: Weighting,
}

impl PropagationResult {
    pub fn reached_distance(&self) -> bool {
        self.termination == Termination::DistanceReached
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Interaction,
    Decay,
}

// ============================================================================
// SECTOR
// ============================================================================

/// One particle moving through one region
#[derive(Debug, Clone)]
pub struct Sector {
    utility: Arc<PropagationUtility>,
    geometry: Sphere,
    scattering: Scattering,
    exact_time: bool,
    weighting: Weighting,
    particle: ParticleState,
}

impl Sector {
    /// Sector around `utility` with a particle at rest at the origin
    pub fn new(utility: Arc<PropagationUtility>, geometry: Sphere, scattering: Scattering) -> Self {
        let def = utility.particle();
        let particle = ParticleState::new(def, def.low, Vec3::zero(), Vec3::unit_z());
        Self { utility, geometry, scattering, exact_time: false, weighting: Weighting::disabled(), particle }
    }

    pub fn from_definition(definition: &SectorDefinition, registry: &ParametrizationRegistry) -> Result<Self> {
        let utility = Arc::new(PropagationUtility::from_definition(definition, registry)?);
        Ok(Self::with_utility(definition, utility))
    }

    /// Sector described by `definition` sharing an existing utility
    pub fn with_utility(definition: &SectorDefinition, utility: Arc<PropagationUtility>) -> Self {
        let scattering = Scattering::from_model(definition.scattering, utility.particle(), utility.medium());
        let geometry = Sphere::new(Vec3::zero(), definition.sphere_radius);
        let weighting = if definition.do_weighting {
            Weighting::new(definition.weighting_order, definition.weighting_starts_at)
        } else {
            Weighting::disabled()
        };
        Self::new(utility, geometry, scattering)
            .with_exact_time(definition.exact_time)
            .with_weighting(weighting)
    }

    pub fn with_exact_time(mut self, exact_time: bool) -> Self {
        self.exact_time = exact_time;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn utility(&self) -> &Arc<PropagationUtility> {
        &self.utility
    }

    pub fn geometry(&self) -> &Sphere {
        &self.geometry
    }

    pub fn scattering(&self) -> &Scattering {
        &self.scattering
    }

    pub fn particle(&self) -> &ParticleState {
        &self.particle
    }

    pub fn particle_mut(&mut self) -> &mut ParticleState {
        &mut self.particle
    }

    /// Replace the particle by a fresh one
    pub fn launch(&mut self, energy: f64, position: Vec3, direction: Vec3) {
        self.particle = ParticleState::new(self.utility.particle(), energy, position, direction);
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Propagate up to the border of the sector geometry
    pub fn propagate_to_border<R: Rng + ?Sized>(&mut self, rng: &mut R) -> PropagationResult {
        let distance = self.geometry.distance_to_border(&self.particle.position, &self.particle.direction);
        self.propagate(distance, rng)
    }

    /// Propagate over `distance` cm with the weighting of the sector
    pub fn propagate<R: Rng + ?Sized>(&mut self, distance: f64, rng: &mut R) -> PropagationResult {
        self.propagate_weighted(distance, self.weighting, rng)
    }

    /// Propagate over `distance` cm; the accumulator comes back in the result
    pub fn propagate_weighted<R: Rng + ?Sized>(
        &mut self,
        distance: f64,
        mut weighting: Weighting,
        rng: &mut R,
    ) -> PropagationResult {
        let distance = if distance > 0.0 { distance } else { 0.0 };
        let low = self.particle.low;
        let mut secondaries = Vec::new();
        let mut travelled = 0.0;

        if distance == 0.0 {
            return PropagationResult {
                value: self.particle.energy,
                termination: Termination::DistanceReached,
                secondaries,
                weighting,
            };
        }

        let termination = loop {
            if self.particle.is_stopped() {
                break Termination::Stopped;
            }
            let energy = self.particle.energy;

            let rnd_decay = -(1.0 - rng.gen::<f64>()).ln();
            let rnd_interaction = -(1.0 - rng.gen::<f64>()).ln();

            let decay_energy = if self.particle.lifetime.is_none() {
                low
            } else {
                self.utility.calculate_final_energy(energy, rnd_decay, TrackingKind::Decay)
            };
            let interaction_energy =
                self.utility.calculate_final_energy(energy, rnd_interaction, TrackingKind::Interaction);

            let (event, mut final_energy) = if decay_energy >= interaction_energy {
                (Event::Decay, decay_energy)
            } else {
                (Event::Interaction, interaction_energy)
            };

            let mut displacement = self.utility.calculate_displacement(energy, final_energy);
            let remaining = distance - travelled;
            let exhausted = displacement >= remaining;
            if exhausted {
                displacement = remaining;
                final_energy = self.utility.calculate_final_energy_for_distance(energy, remaining);
            }

            self.advance(displacement, energy, final_energy, rng);
            travelled += displacement;
            if (distance - travelled).abs() < distance * COMPUTER_PRECISION {
                travelled = distance;
            }
            trace!(
                energy = self.particle.energy,
                displacement,
                travelled,
                ?event,
                "continuous step"
            );

            if exhausted || travelled >= distance {
                break Termination::DistanceReached;
            }
            if final_energy <= low {
                break Termination::Stopped;
            }

            match event {
                Event::Interaction => {
                    if let Some(secondary) = self.interact(&mut weighting, rng) {
                        secondaries.push(secondary);
                    }
                }
                Event::Decay => {
                    secondaries.extend(self.decay(rng));
                    break Termination::Decayed;
                }
            }
        };

        let value = match termination {
            Termination::DistanceReached => self.particle.energy,
            Termination::Stopped | Termination::Decayed => -travelled,
        };
        PropagationResult { value, termination, secondaries, weighting }
    }

    /// Continuous step over `dr` cm from energy `ei` to `ef`
    fn advance<R: Rng + ?Sized>(&mut self, dr: f64, ei: f64, ef: f64, rng: &mut R) {
        let dt = if self.exact_time {
            self.utility.calculate_particle_time(ei, ef)
        } else {
            dr / SPEED_OF_LIGHT
        };
        let moved = self.scattering.scatter(dr, ei, ef, self.particle.position, self.particle.direction, rng);

        let particle = &mut self.particle;
        particle.energy = ef.min(particle.energy);
        particle.position = moved.position;
        particle.direction = moved.direction;
        particle.time += dt;
        particle.propagated_distance += dr;
    }

    /// Sample one stochastic loss at the current energy
    fn interact<R: Rng + ?Sized>(&mut self, weighting: &mut Weighting, rng: &mut R) -> Option<Secondary> {
        let energy = self.particle.energy;
        let rnd_process: f64 = rng.gen();
        let mut rnd_fraction: f64 = rng.gen();
        let rnd_component: f64 = rng.gen();

        let cross_sections = self.utility.cross_sections();
        let rates: Vec<_> = cross_sections.iter().map(|c| c.calculate_component_rates(energy)).collect();
        let total: f64 = rates.iter().map(|r| r.total()).sum();
        let Some(index) = select_weighted(rnd_process * total, rates.iter().map(|r| r.total())) else {
            debug!(energy, "no stochastic rate, no interaction");
            return None;
        };

        if weighting.applies(self.particle.propagated_distance) {
            rnd_fraction = weighting.remap(rnd_fraction);
        }

        let cross_section = &cross_sections[index];
        let Some(loss) = cross_section.sample_loss(energy, &rates[index], rnd_component, rnd_fraction) else {
            debug!(energy, process = cross_section.name(), "no interaction");
            return None;
        };

        let loss = loss.min(energy);
        self.particle.energy = energy - loss;
        Some(Secondary {
            kind: SecondaryKind::Loss(cross_section.name()),
            energy: loss,
            position: self.particle.position,
            direction: self.particle.direction,
            time: self.particle.time,
            distance: self.particle.propagated_distance,
        })
    }

    fn decay<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Secondary> {
        let particle = &self.particle;
        let channel = self.utility.decay_table().select_channel(rng.gen());
        debug!(energy = particle.energy, channel = channel.name(), "decay");
        channel
            .decay(particle.mass, particle.energy, particle.direction, rng)
            .into_iter()
            .map(|product| Secondary {
                kind: SecondaryKind::DecayProduct(product.name),
                energy: product.energy,
                position: particle.position,
                direction: product.direction,
                time: particle.time,
                distance: particle.propagated_distance,
            })
            .collect()
    }
}

/// Index whose cumulative weight first exceeds `target`
fn select_weighted(target: f64, weights: impl Iterator<Item = f64>) -> Option<usize> {
    let mut last_positive = None;
    let mut sum = 0.0;
    for (i, weight) in weights.enumerate() {
        if weight > 0.0 {
            last_positive = Some(i);
        }
        sum += weight;
        if sum > target && weight > 0.0 {
            return Some(i);
        }
    }
    last_positive
}
