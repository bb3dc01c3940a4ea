//! Environment-style configuration with scoped, self-restoring overrides.

use crate::config::ConfigError;
use crate::engine::{GateConfig, HedgeConfig, RunnerConfig};
use std::collections::HashMap;
use std::ops::Deref;

/// Key/value configuration owned by an orchestrator worker.
///
/// Never reads or writes the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigScope {
    vars: HashMap<String, String>,
}

impl ConfigScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Snapshot of the process environment at call time.
    pub fn from_process_env() -> Self {
        Self::from_map(std::env::vars().collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Apply overrides until the returned guard is dropped. A `None` value
    /// clears the key for the guard's lifetime.
    pub fn apply<I>(&mut self, overrides: I) -> ScopeGuard<'_>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut saved = Vec::new();
        for (key, value) in overrides {
            let previous = match value {
                Some(v) => self.vars.insert(key.clone(), v),
                None => self.vars.remove(&key),
            };
            saved.push((key, previous));
        }
        ScopeGuard { scope: self, saved }
    }

    pub fn gate_config(&self) -> Result<GateConfig, ConfigError> {
        GateConfig::from_env_map(&self.vars)
    }

    pub fn runner_config(&self) -> Result<RunnerConfig, ConfigError> {
        RunnerConfig::from_env_map(&self.vars)
    }

    pub fn hedge_config(&self) -> Result<HedgeConfig, ConfigError> {
        HedgeConfig::from_env_map(&self.vars)
    }
}

/// Restores the overridden keys, including their absence, on drop.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    scope: &'a mut ConfigScope,
    saved: Vec<(String, Option<String>)>,
}

impl Deref for ScopeGuard<'_> {
    type Target = ConfigScope;

    fn deref(&self) -> &ConfigScope {
        self.scope
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        // Reverse order so a key overridden twice ends at its original value.
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(v) => {
                    self.scope.vars.insert(key, v);
                }
                None => {
                    self.scope.vars.remove(&key);
                }
            }
        }
    }
}
