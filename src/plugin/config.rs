//! Plugin configuration types
//!
//! Every plugin kind's config embeds a [`CommonConfig`] (flattened, so the
//! common fields sit next to the kind-specific ones in configuration files).

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fields shared by all plugin kinds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonConfig {
    /// Plugin name, unique within its pipeline
    pub name: String,

    /// Execution order (lower numbers execute first, ties keep declaration order)
    #[serde(default)]
    pub order: u32,

    /// Whether this plugin is scheduled at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Time budget for one run of this plugin. Overruns are reported once the
    /// stage returns; a running plugin is never interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

pub(crate) fn default_enabled() -> bool {
    true
}

impl CommonConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: 0,
            enabled: default_enabled(),
            timeout_ms: None,
        }
    }

    pub fn prepare(&mut self) -> Result<(), ConfigError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(ConfigError::Validation("invalid plugin name".into()));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Validation(format!(
                "plugin {} timeoutMs must be positive",
                self.name
            )));
        }
        Ok(())
    }

    pub fn plugin_name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Validated configuration of one plugin kind.
///
/// A config is only handed to its plugin once [`PluginConfig::prepare`] has
/// succeeded; the plugin owns it afterwards and never mutates it.
pub trait PluginConfig: DeserializeOwned + Send + Sync + 'static {
    fn common(&self) -> &CommonConfig;

    /// Normalise fields and reject out-of-range or empty required values.
    fn prepare(&mut self) -> Result<(), ConfigError>;

    fn plugin_name(&self) -> &str {
        self.common().plugin_name()
    }
}

/// Raw plugin entry as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PluginSpec {
    /// Registered plugin kind
    pub kind: String,

    /// Everything else: common and kind-specific settings
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl PluginSpec {
    /// Build a spec from a JSON object of settings. Non-object values yield no settings.
    pub fn new(kind: impl Into<String>, settings: serde_json::Value) -> Self {
        let settings = match settings {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            kind: kind.into(),
            settings,
        }
    }

    /// Configured plugin name, before validation.
    pub fn name(&self) -> Option<&str> {
        self.settings.get("name").and_then(|v| v.as_str())
    }

    pub(crate) fn settings_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_common_config_trims_name() {
        let mut common = CommonConfig::new("  limiter ");
        common.prepare().unwrap();
        assert_eq!(common.plugin_name(), "limiter");
    }

    #[test]
    fn test_common_config_rejects_blank_name() {
        let mut common = CommonConfig::new("   ");
        assert!(common.prepare().is_err());
    }

    #[test]
    fn test_common_config_defaults() {
        let common: CommonConfig = serde_json::from_value(json!({"name": "a"})).unwrap();
        assert_eq!(common.order, 0);
        assert!(common.enabled);
        assert_eq!(common.timeout(), None);
    }

    #[test]
    fn test_common_config_timeout() {
        let mut common: CommonConfig =
            serde_json::from_value(json!({"name": "a", "timeoutMs": 250})).unwrap();
        common.prepare().unwrap();
        assert_eq!(common.timeout(), Some(Duration::from_millis(250)));

        let mut zero: CommonConfig =
            serde_json::from_value(json!({"name": "a", "timeoutMs": 0})).unwrap();
        assert!(matches!(zero.prepare(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_plugin_spec_flattens_settings() {
        let spec: PluginSpec = serde_json::from_value(json!({
            "kind": "static_probability_limiter",
            "name": "limiter",
            "passPr": 0.5
        }))
        .unwrap();

        assert_eq!(spec.kind, "static_probability_limiter");
        assert_eq!(spec.name(), Some("limiter"));
        assert_eq!(spec.settings.get("passPr"), Some(&json!(0.5)));
        assert!(!spec.settings.contains_key("kind"));
    }
}
