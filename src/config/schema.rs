use crate::pipeline::ExecutionPolicy;
use crate::plugin::PluginSpec;
use crate::protocol::{AdapterKeys, ProtocolKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub random: RandomConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl Config {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }
}

/// Process-wide random source settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomConfig {
    /// Fixed seed for reproducible runs; OS entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolKind,
    #[serde(flatten)]
    pub keys: AdapterKeys,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: default_protocol(),
            keys: AdapterKeys::default(),
            timeout_ms: default_timeout_ms(),
            max_concurrency: None,
            plugins: Vec::new(),
        }
    }

    pub fn execution_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            deadline: Some(Duration::from_millis(self.timeout_ms)),
            max_concurrency: self.max_concurrency,
        }
    }
}

fn default_protocol() -> ProtocolKind {
    ProtocolKind::Http
}

fn default_timeout_ms() -> u64 {
    30000
}
