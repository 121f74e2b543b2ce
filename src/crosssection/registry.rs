//! Process identifiers mapped to constructors.

use std::collections::HashMap;
use std::fmt;

use super::parametrization::{Parametrization, ProcessSetup};
use crate::config::ProcessDefinition;
use crate::error::{PropagationError, Result};

type Constructor = Box<dyn Fn(ProcessSetup, &ProcessDefinition) -> Result<Parametrization> + Send + Sync>;

/// Lower-case identifier → parametrization constructor
pub struct ParametrizationRegistry {
    constructors: HashMap<String, Constructor>,
}

impl Default for ParametrizationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ParametrizationRegistry {
    pub fn empty() -> Self {
        Self { constructors: HashMap::new() }
    }

    /// All built-in processes
    pub fn standard() -> Self {
        Self::empty()
            .with("ionization", |setup, _| Ok(Parametrization::ionization(setup)))
            .with("bremsstrahlung", |setup, def| Ok(Parametrization::bremsstrahlung(setup, def.lpm)))
            .with("bhabhascattering", |setup, def| Parametrization::bhabha(setup, def.threshold))
            .with("mollerscattering", |setup, def| Parametrization::moller(setup, def.threshold))
    }

    pub fn with<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn(ProcessSetup, &ProcessDefinition) -> Result<Parametrization> + Send + Sync + 'static,
    {
        self.register(name, constructor);
        self
    }

    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(ProcessSetup, &ProcessDefinition) -> Result<Parametrization> + Send + Sync + 'static,
    {
        self.constructors.insert(name.to_ascii_lowercase(), Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the process `definition.name` for `setup`; the multiplier
    /// of the definition replaces the one of the setup
    pub fn create(&self, setup: ProcessSetup, definition: &ProcessDefinition) -> Result<Parametrization> {
        let key = definition.name.to_ascii_lowercase();
        let constructor = self
            .constructors
            .get(&key)
            .ok_or_else(|| PropagationError::UnregisteredProcess(definition.name.clone()))?;
        constructor(setup.with_multiplier(definition.multiplier), definition)
    }
}

impl fmt::Debug for ParametrizationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametrizationRegistry").field("processes", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::EnergyCutSettings;
    use crate::medium::Medium;
    use crate::particle::ParticleDef;
    use std::sync::Arc;

    fn setup() -> ProcessSetup {
        ProcessSetup::new(ParticleDef::mu_minus(), Arc::new(Medium::ice()), Arc::new(EnergyCutSettings::default()))
    }

    #[test]
    fn test_standard_names() {
        let registry = ParametrizationRegistry::standard();
        assert_eq!(registry.names(), vec!["bhabhascattering", "bremsstrahlung", "ionization", "mollerscattering"]);
        assert!(registry.contains("Bremsstrahlung"));
    }

    #[test]
    fn test_create_applies_definition() {
        let registry = ParametrizationRegistry::standard();
        let definition = ProcessDefinition::named("BremsStrahlung").with_multiplier(1.5).with_lpm(true);
        let process = registry.create(setup(), &definition).ok();
        assert_eq!(process.as_ref().map(|p| p.name()), Some("bremsstrahlung"));
        assert_eq!(process.as_ref().map(|p| p.multiplier()), Some(1.5));
        assert_eq!(process.map(|p| p.lpm()), Some(true));
    }

    #[test]
    fn test_unregistered_process() {
        let registry = ParametrizationRegistry::standard();
        let result = registry.create(setup(), &ProcessDefinition::named("photonuclear"));
        assert!(matches!(result, Err(PropagationError::UnregisteredProcess(name)) if name == "photonuclear"));
    }

    #[test]
    fn test_invalid_particle_is_fatal() {
        let registry = ParametrizationRegistry::standard();
        let result = registry.create(setup(), &ProcessDefinition::named("mollerscattering"));
        assert!(matches!(result, Err(PropagationError::InvalidParticle { .. })));
    }
}
