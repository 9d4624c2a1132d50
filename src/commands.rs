use crate::config::{self, Config};
use crate::error::{ConfigError, GatewayError, PipelineError, Result};
use crate::gateway::Gateway;
use crate::plugin::PluginRegistry;
use crate::protocol::{HttpRequest, ProtocolKind, ProtocolRequest, Response};
use bytes::Bytes;
use http::{Method, Uri};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Validate `config` without serving traffic.
///
/// Every plugin config is deserialised and validated. With `build`, every
/// pipeline is also constructed, prepared and closed again.
pub fn run_config_check(config: &Config, registry: &PluginRegistry, build: bool) -> Result<()> {
    info!("Running configuration check...");
    config::validate(config)?;
    info!(
        pipelines = config.pipelines.len(),
        kinds = ?registry.kinds(),
        "Configuration is structurally valid"
    );

    let mut all_passed = true;

    for pipeline in &config.pipelines {
        info!(
            pipeline = %pipeline.name,
            protocol = %pipeline.protocol,
            timeout_ms = pipeline.timeout_ms,
            max_concurrency = ?pipeline.max_concurrency,
            "Checking pipeline"
        );

        if pipeline.plugins.is_empty() {
            warn!(pipeline = %pipeline.name, "Pipeline has no plugins, every task completes");
        }

        for spec in &pipeline.plugins {
            match registry.prepare_config(spec) {
                Ok(prepared) => info!(
                    pipeline = %pipeline.name,
                    plugin = %prepared.common().name,
                    kind = prepared.kind(),
                    order = prepared.common().order,
                    enabled = prepared.common().enabled,
                    "Plugin config is valid"
                ),
                Err(e) => {
                    error!(pipeline = %pipeline.name, error = %e, "Plugin config is invalid");
                    all_passed = false;
                }
            }
        }
    }

    if !all_passed {
        return Err(ConfigError::Validation("One or more plugins failed checks".into()).into());
    }

    if build {
        let gateway = Gateway::from_config(config, registry.clone())?;
        info!(pipelines = ?gateway.pipeline_names(), "All pipelines built");
        gateway.shutdown();
    }

    info!("All checks passed");
    Ok(())
}

/// Render the effective configuration (after env overrides and substitution) as YAML.
pub fn render_config(config: &Config) -> Result<String> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::Parse(e.to_string()).into())
}

/// Push one HTTP `POST` with `body` through `pipeline` and log the response.
///
/// Returns the response status code.
pub async fn run_send(gateway: &Gateway, pipeline: &str, path: &str, body: Bytes) -> Result<u16> {
    let uri: Uri = path
        .parse()
        .map_err(|e| ConfigError::Validation(format!("invalid request path '{path}': {e}")))?;
    let request = ProtocolRequest::from(HttpRequest::new(Method::POST, uri).with_body(body));

    let target = gateway
        .pipeline(pipeline)
        .ok_or_else(|| GatewayError::PipelineNotFound(pipeline.to_string()))?;
    let mismatch = || PipelineError::ProtocolMismatch {
        expected: target.protocol().as_str(),
        actual: ProtocolKind::Http.as_str(),
    };
    if target.protocol() != ProtocolKind::Http {
        return Err(mismatch().into());
    }

    let response = target.handle(&request, &CancellationToken::new()).await;
    let response = response.as_http().ok_or_else(mismatch)?;

    let status = response.status();
    info!(
        pipeline,
        status = status.as_u16(),
        result = ?response.headers().get("x-gateway-result"),
        body = %String::from_utf8_lossy(&response.payload()),
        "Response"
    );
    Ok(status.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::plugin::PluginSpec;
    use serde_json::json;

    fn config_with(spec: PluginSpec) -> Config {
        let mut pipeline = PipelineConfig::new("ingest");
        pipeline.plugins.push(spec);
        Config {
            pipelines: vec![pipeline],
            ..Config::default()
        }
    }

    #[test]
    fn test_check_reports_invalid_plugin_settings() {
        let registry = PluginRegistry::with_builtins();
        let config = config_with(PluginSpec::new(
            "static_probability_limiter",
            json!({"name": "limiter", "passPr": 2.0}),
        ));
        assert!(run_config_check(&config, &registry, false).is_err());
    }

    #[test]
    fn test_check_builds_valid_config() {
        let registry = PluginRegistry::with_builtins();
        let config = config_with(PluginSpec::new(
            "graphite_gid_extractor",
            json!({"name": "gid", "gidKey": "gid", "dataKey": "request.payload"}),
        ));
        assert!(run_config_check(&config, &registry, true).is_ok());
    }

    #[test]
    fn test_render_config_is_yaml() {
        let config = config_with(PluginSpec::new(
            "graphite_gid_extractor",
            json!({"name": "gid", "gidKey": "gid", "dataKey": "request.payload"}),
        ));
        let yaml = render_config(&config).unwrap();
        assert!(yaml.contains("name: ingest"));
        assert!(yaml.contains("kind: graphite_gid_extractor"));
        assert!(yaml.contains("timeoutMs: 30000"));
    }
}
