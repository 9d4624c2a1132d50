use super::schema::Config;
use crate::error::{ConfigError, Result};
use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::Figment;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

const ENV_PREFIX: &str = "GATEWAY_";

pub fn load_from_env_or_file() -> Result<Config> {
    let figment = Figment::new()
        .merge(Toml::file("gateway.toml"))
        .merge(Json::file("gateway.json"))
        .merge(Yaml::file("gateway.yaml"))
        .merge(Yaml::file("gateway.yml"))
        .merge(Env::prefixed(ENV_PREFIX).split("_"));

    finish(figment)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    if !path.exists() {
        return Err(ConfigError::Parse(format!(
            "Config file not found: {}",
            path.display()
        ))
        .into());
    }

    finish(figment.merge(Env::prefixed(ENV_PREFIX).split("_")))
}

fn finish(figment: Figment) -> Result<Config> {
    let config: Config = figment
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    apply_env_substitutions(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let mut pipelines = HashSet::new();

    for pipeline in &config.pipelines {
        let name = pipeline.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation("Pipeline name must not be empty".into()).into());
        }
        if !pipelines.insert(name) {
            return Err(
                ConfigError::Validation(format!("Duplicate pipeline name '{name}'")).into(),
            );
        }

        if pipeline.timeout_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "Pipeline '{name}' timeoutMs must be greater than 0"
            ))
            .into());
        }
        if pipeline.max_concurrency == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Pipeline '{name}' maxConcurrency must be greater than 0"
            ))
            .into());
        }

        let mut plugins = HashSet::new();
        for spec in &pipeline.plugins {
            if spec.kind.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "kind of a plugin in pipeline '{name}'"
                ))
                .into());
            }
            let plugin = spec.name().map(str::trim).ok_or_else(|| {
                ConfigError::MissingField(format!(
                    "name of a '{}' plugin in pipeline '{name}'",
                    spec.kind
                ))
            })?;
            if !plugins.insert(plugin) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate plugin name '{plugin}' in pipeline '{name}'"
                ))
                .into());
            }
        }
    }

    Ok(())
}

fn apply_env_substitutions(mut config: Config) -> Result<Config> {
    let pattern = env_pattern()?;

    for pipeline in &mut config.pipelines {
        for spec in &mut pipeline.plugins {
            for value in spec.settings.values_mut() {
                substitute_in_value(&pattern, value)?;
            }
        }
    }

    Ok(config)
}

fn env_pattern() -> Result<Regex> {
    Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Parse(e.to_string()).into())
}

fn substitute_in_value(pattern: &Regex, value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => *s = substitute_env_vars(pattern, s)?,
        Value::Array(items) => {
            for item in items {
                substitute_in_value(pattern, item)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_in_value(pattern, item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn substitute_env_vars(pattern: &Regex, input: &str) -> Result<String> {
    let mut result = input.to_string();

    for cap in pattern.captures_iter(input) {
        let reference = &cap[1];
        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (reference, None),
        };

        let value = match (std::env::var(name), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                return Err(ConfigError::EnvVar(format!(
                    "Environment variable '{name}' not found"
                ))
                .into())
            }
        };
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}
