//! Plugin kind registry
//!
//! Maps a kind name to its config constructor. Building a plugin is two steps:
//! [`PluginRegistry::prepare_config`] deserialises and validates the raw
//! settings, then [`PreparedConfig::construct`] runs the kind's plugin
//! constructor with the validated config.

use super::config::{PluginConfig, PluginSpec};
use super::{GraphiteGidExtractor, Plugin, PluginError, StaticProbabilityLimiter};
use crate::error::ConfigError;
use crate::plugin::config::CommonConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A plugin kind: its name, config type and constructor.
pub trait PluginKind: 'static {
    const KIND: &'static str;

    type Config: PluginConfig;

    fn construct(config: Self::Config) -> Result<Arc<dyn Plugin>, PluginError>;
}

type Constructor = Box<dyn FnOnce() -> Result<Arc<dyn Plugin>, PluginError> + Send>;

/// A config that passed validation, ready to become a plugin.
pub struct PreparedConfig {
    kind: &'static str,
    common: CommonConfig,
    constructor: Constructor,
}

impl PreparedConfig {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn common(&self) -> &CommonConfig {
        &self.common
    }

    pub fn construct(self) -> Result<Arc<dyn Plugin>, PluginError> {
        (self.constructor)()
    }
}

impl fmt::Debug for PreparedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedConfig")
            .field("kind", &self.kind)
            .field("common", &self.common)
            .finish_non_exhaustive()
    }
}

type ConfigConstructor = fn(&PluginSpec) -> Result<PreparedConfig, ConfigError>;

fn prepare_config<K: PluginKind>(spec: &PluginSpec) -> Result<PreparedConfig, ConfigError> {
    let plugin = spec.name().unwrap_or("<unnamed>");
    let mut config: K::Config = serde_json::from_value(spec.settings_value()).map_err(|e| {
        ConfigError::Parse(format!("plugin '{plugin}' of kind '{}': {e}", K::KIND))
    })?;

    config.prepare().map_err(|e| {
        ConfigError::Validation(format!("plugin '{plugin}' of kind '{}': {e}", K::KIND))
    })?;

    Ok(PreparedConfig {
        kind: K::KIND,
        common: config.common().clone(),
        constructor: Box::new(move || K::construct(config)),
    })
}

#[derive(Default, Clone)]
pub struct PluginRegistry {
    kinds: HashMap<&'static str, ConfigConstructor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every plugin kind shipped with the gateway.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<GraphiteGidExtractor>();
        registry.register::<StaticProbabilityLimiter>();
        registry
    }

    /// Register a kind. Returns `false` if the name was already taken, in
    /// which case the existing registration is kept.
    pub fn register<K: PluginKind>(&mut self) -> bool {
        if self.kinds.contains_key(K::KIND) {
            return false;
        }
        debug!(kind = K::KIND, "Registered plugin kind");
        self.kinds.insert(K::KIND, prepare_config::<K>);
        true
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Fail fast on unknown kinds before anything is built.
    pub fn validate(&self, specs: &[PluginSpec]) -> Result<(), ConfigError> {
        for spec in specs {
            if !self.contains(&spec.kind) {
                return Err(ConfigError::UnknownPluginKind {
                    kind: spec.kind.clone(),
                    plugin: spec.name().unwrap_or("<unnamed>").to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn prepare_config(&self, spec: &PluginSpec) -> Result<PreparedConfig, ConfigError> {
        let constructor =
            self.kinds
                .get(spec.kind.as_str())
                .ok_or_else(|| ConfigError::UnknownPluginKind {
                    kind: spec.kind.clone(),
                    plugin: spec.name().unwrap_or("<unnamed>").to_string(),
                })?;
        constructor(spec)
    }
}
