use super::{DecisionSource, MomentumSource, RsiSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("decision source name must not be empty")]
    EmptyName,
    #[error("decision source already registered: {0}")]
    Duplicate(String),
    #[error("unknown decision source: {0}")]
    Unknown(String),
}

/// Named decision sources available to scenarios.
#[derive(Debug, Default, Clone)]
pub struct DecisionRegistry {
    sources: BTreeMap<String, Arc<dyn DecisionSource>>,
}

impl DecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the deterministic built-ins, `momentum` and `rsi`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.sources.insert(
            "momentum".to_string(),
            Arc::new(MomentumSource::default()),
        );
        registry
            .sources
            .insert("rsi".to_string(), Arc::new(RsiSource::default()));
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        source: Arc<dyn DecisionSource>,
    ) -> Result<(), RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.sources.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.sources.insert(name.to_string(), source);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DecisionSource>> {
        self.sources.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<dyn DecisionSource>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }
}
