//! Built-in plugins driven through the registry and a real pipeline.

mod common;

use gateway_pipeline::config::PipelineConfig;
use gateway_pipeline::error::{ConfigError, GatewayError};
use gateway_pipeline::pipeline::{Pipeline, PipelineOutcome};
use gateway_pipeline::plugin::{PluginRegistry, PluginSpec};
use gateway_pipeline::task::{ResultCode, Task, TaskValue};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn pipeline_with(specs: Vec<PluginSpec>) -> Result<Pipeline, GatewayError> {
    let mut config = PipelineConfig::new("plugins");
    config.plugins = specs;
    Pipeline::from_config(&config, &PluginRegistry::with_builtins(), None)
}

fn limiter(pass_pr: f64) -> PluginSpec {
    PluginSpec::new(
        "static_probability_limiter",
        json!({"name": "limiter", "passPr": pass_pr}),
    )
}

fn extractor() -> PluginSpec {
    PluginSpec::new(
        "graphite_gid_extractor",
        json!({"name": "gid", "order": 1, "gidKey": "gid", "dataKey": "request.payload"}),
    )
}

fn graphite_task(line: &'static str) -> Task {
    Task::from_values([("request.payload", TaskValue::from(line.as_bytes()))])
}

#[tokio::test]
async fn test_limiter_pass_rate_converges() {
    common::init_random();
    let pipeline = pipeline_with(vec![limiter(0.3)]).unwrap();
    let cancel = CancellationToken::new();

    let trials = 20_000;
    let mut passed = 0;
    for _ in 0..trials {
        let outcome = pipeline.run(Task::new(), &cancel).await;
        match outcome.result_code() {
            Some(ResultCode::Ok) => passed += 1,
            Some(ResultCode::FlowControl) => {}
            other => panic!("unexpected result code {other:?}"),
        }
    }

    let rate = passed as f64 / trials as f64;
    assert!((rate - 0.3).abs() < 0.02, "pass rate {rate} too far from 0.3");

    let stats = pipeline.stats();
    assert_eq!(stats.completed, passed);
    assert_eq!(
        stats.short_circuited_with(ResultCode::FlowControl),
        trials - passed
    );
}

#[tokio::test]
async fn test_limiter_runs_before_extractor() {
    common::init_random();
    // Declared after the extractor, but ordered first.
    let pipeline = pipeline_with(vec![extractor(), limiter(0.0)]).unwrap();
    assert_eq!(pipeline.plugin_names(), vec!["limiter", "gid"]);

    let outcome = pipeline
        .run(
            graphite_task("billing#api#i-3#web01.cpu 1 2"),
            &CancellationToken::new(),
        )
        .await;

    match outcome {
        PipelineOutcome::ShortCircuited { task, plugin, .. } => {
            assert_eq!(plugin, "limiter");
            assert_eq!(task.result_code(), ResultCode::FlowControl);
            assert!(task.value("gid").is_none());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_extractor_writes_gid() {
    common::init_random();
    let pipeline = pipeline_with(vec![limiter(1.0), extractor()]).unwrap();

    let task = pipeline
        .run(
            graphite_task("billing#api#i-3#web01.cpu.load 0.42 1700000000"),
            &CancellationToken::new(),
        )
        .await
        .into_task()
        .unwrap();

    assert_eq!(task.result_code(), ResultCode::Ok);
    assert_eq!(
        task.value("gid").and_then(TaskValue::as_str),
        Some("billingapii-3web01")
    );
}

#[tokio::test]
async fn test_extractor_rejects_malformed_metric() {
    let pipeline = pipeline_with(vec![extractor()]).unwrap();

    let outcome = pipeline
        .run(graphite_task("billing#api.cpu 1 2"), &CancellationToken::new())
        .await;
    assert_eq!(outcome.result_code(), Some(ResultCode::BadInput));

    let outcome = pipeline.run(Task::new(), &CancellationToken::new()).await;
    assert_eq!(outcome.result_code(), Some(ResultCode::MissingInput));
}

#[test]
fn test_invalid_config_never_reaches_a_pipeline() {
    let err = pipeline_with(vec![limiter(1.5)]).unwrap_err();
    assert!(matches!(err, GatewayError::Config(ConfigError::Validation(_))));

    let err = pipeline_with(vec![PluginSpec::new(
        "graphite_gid_extractor",
        json!({"name": "gid", "gidKey": "gid"}),
    )])
    .unwrap_err();
    assert!(matches!(err, GatewayError::Config(ConfigError::Validation(_))));
}

#[test]
fn test_disabled_plugin_is_not_scheduled() {
    let spec = PluginSpec::new(
        "static_probability_limiter",
        json!({"name": "limiter", "passPr": 0.0, "enabled": false}),
    );
    let pipeline = pipeline_with(vec![spec, extractor()]).unwrap();
    assert_eq!(pipeline.plugin_names(), vec!["gid"]);
}
