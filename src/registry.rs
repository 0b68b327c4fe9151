//! Benchmark lookup by name.

use crate::Problem;
use crate::config::ProblemConfig;
use crate::error::{EliteError, Result};
use std::collections::BTreeMap;

/// Builds a problem from its configuration section.
pub type ProblemFactory = fn(&ProblemConfig) -> Result<Box<dyn Problem>>;

/// Name to factory table, filled once at startup.
#[derive(Default, Clone)]
pub struct ProblemRegistry {
    factories: BTreeMap<String, ProblemFactory>,
}

impl ProblemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any earlier entry.
    pub fn register(&mut self, name: impl Into<String>, factory: ProblemFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the problem named in `config`.
    ///
    /// # Errors
    ///
    /// [`EliteError::Configuration`] for an unknown name, or whatever the factory
    /// reports.
    pub fn build(&self, config: &ProblemConfig) -> Result<Box<dyn Problem>> {
        let factory = self.factories.get(&config.name).ok_or_else(|| {
            EliteError::Configuration(format!(
                "unknown problem {:?}, registered: {:?}",
                config.name,
                self.names().collect::<Vec<_>>()
            ))
        })?;
        factory(config)
    }
}
