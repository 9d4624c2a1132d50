//! Derives a grouping identifier from a graphite plaintext line.
//!
//! The metric path of the first line carries four `#`-separated fields
//! (system, application, instance and host); the last field ends where the
//! `.`-separated metric name begins:
//!
//! ```text
//! billing#api#i-3#10.0.0.7.cpu.load 0.42 1700000000
//! ```

use super::config::{CommonConfig, PluginConfig};
use super::registry::PluginKind;
use super::{Plugin, PluginError};
use crate::error::ConfigError;
use crate::pipeline::PipelineContext;
use crate::task::{ResultCode, Task, TaskValue};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const FIELD_SEPARATOR: char = '#';
const METRIC_SEPARATOR: char = '.';
const GID_FIELDS: usize = 4;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphiteGidExtractorConfig {
    #[serde(flatten)]
    pub common: CommonConfig,

    /// Task key the derived identifier is written to
    #[serde(default)]
    pub gid_key: String,

    /// Task key holding the raw graphite bytes
    #[serde(default)]
    pub data_key: String,
}

impl PluginConfig for GraphiteGidExtractorConfig {
    fn common(&self) -> &CommonConfig {
        &self.common
    }

    fn prepare(&mut self) -> Result<(), ConfigError> {
        self.common.prepare()?;

        self.gid_key = self.gid_key.trim().to_string();
        self.data_key = self.data_key.trim().to_string();

        if self.gid_key.is_empty() {
            return Err(ConfigError::Validation("invalid gid key".into()));
        }
        if self.data_key.is_empty() {
            return Err(ConfigError::Validation("invalid data key".into()));
        }

        Ok(())
    }
}

/// Split a metric path into its identifier fields.
///
/// The path is split on `#`; the last field is then cut at its first `.`,
/// dropping the metric name. Fields themselves may contain dots (an IPv4
/// host, for instance) as long as they are not the last one.
pub fn graphite_split(path: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = path.split(FIELD_SEPARATOR).collect();
    if let Some(last) = fields.last_mut() {
        if let Some((head, _metric)) = last.split_once(METRIC_SEPARATOR) {
            *last = head;
        }
    }
    fields
}

pub struct GraphiteGidExtractor {
    config: GraphiteGidExtractorConfig,
}

impl GraphiteGidExtractor {
    pub fn new(config: GraphiteGidExtractorConfig) -> Self {
        Self { config }
    }

    fn extract(&self, task: &Task) -> Result<Task, (anyhow::Error, ResultCode)> {
        let key = &self.config.data_key;
        let data = match task.value(key) {
            Some(TaskValue::Bytes(data)) => data,
            other => {
                let got = other.map(TaskValue::kind).unwrap_or("nothing");
                return Err((
                    anyhow!("input {key} got wrong value: {got}"),
                    ResultCode::MissingInput,
                ));
            }
        };

        let line = match data.split(|b| *b == b'\n').next() {
            Some(line) if !data.is_empty() => line,
            _ => return Err((anyhow!("unexpected EOF"), ResultCode::BadInput)),
        };
        let line = std::str::from_utf8(line)
            .map_err(|e| (anyhow!("graphite line is not valid UTF-8: {e}"), ResultCode::BadInput))?;
        let line = line.strip_suffix('\r').unwrap_or(line);

        let path = line.split_whitespace().next().unwrap_or_default();
        let fields = graphite_split(path);
        if fields.len() != GID_FIELDS {
            return Err((
                anyhow!(
                    "graphite data want {GID_FIELDS} fields('#'-splitted) got {}",
                    fields.len()
                ),
                ResultCode::BadInput,
            ));
        }

        // system application instance host
        let gid = [fields[0], "", fields[1], fields[2], fields[3]].concat();
        debug!(plugin = %self.config.common.name, gid = %gid, "Extracted graphite gid");

        task.with_value(self.config.gid_key.clone(), gid)
            .map_err(|e| (anyhow!(e), ResultCode::InternalServerError))
    }
}

#[async_trait]
impl Plugin for GraphiteGidExtractor {
    async fn run(&self, _ctx: &PipelineContext, task: Task) -> Result<Task, PluginError> {
        if task.result_code().is_terminal() {
            return Ok(task);
        }
        match self.extract(&task) {
            Ok(task) => Ok(task),
            Err((error, code)) => {
                let mut task = task;
                task.set_error(error, code)?;
                Ok(task)
            }
        }
    }

    fn name(&self) -> &str {
        self.config.plugin_name()
    }

    fn kind(&self) -> &'static str {
        <Self as PluginKind>::KIND
    }
}

impl PluginKind for GraphiteGidExtractor {
    const KIND: &'static str = "graphite_gid_extractor";

    type Config = GraphiteGidExtractorConfig;

    fn construct(config: Self::Config) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Arc::new(GraphiteGidExtractor::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> GraphiteGidExtractor {
        let mut config = GraphiteGidExtractorConfig {
            common: CommonConfig::new("gid"),
            gid_key: "gid".into(),
            data_key: "data".into(),
        };
        config.prepare().unwrap();
        GraphiteGidExtractor::new(config)
    }

    async fn run_with(value: Option<TaskValue>) -> Task {
        let task = match value {
            Some(value) => Task::from_values([("data", value)]),
            None => Task::new(),
        };
        let ctx = PipelineContext::new("test");
        extractor().run(&ctx, task).await.unwrap()
    }

    #[test]
    fn test_split_keeps_dotted_inner_fields() {
        assert_eq!(
            graphite_split("billing#api#10.0.0.7#host-1.cpu.load"),
            vec!["billing", "api", "10.0.0.7", "host-1"]
        );
        assert_eq!(graphite_split("a.b.c"), vec!["a"]);
    }

    #[tokio::test]
    async fn test_four_fields_produce_gid() {
        let task = run_with(Some(TaskValue::from(
            b"billing#api#i-3#web01.cpu.load 0.42 1700000000\nnext line".to_vec(),
        )))
        .await;

        assert_eq!(task.result_code(), ResultCode::Ok);
        assert_eq!(
            task.value("gid").and_then(TaskValue::as_str),
            Some("billingapii-3web01")
        );
    }

    #[tokio::test]
    async fn test_wrong_field_count_is_bad_input() {
        let task = run_with(Some(TaskValue::from(b"a#b#c.metric 1 2".to_vec()))).await;

        assert_eq!(task.result_code(), ResultCode::BadInput);
        assert!(task.value("gid").is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_bad_input() {
        let task = run_with(Some(TaskValue::from(b"a\xff#b#c#d.m 1 2".to_vec()))).await;

        assert_eq!(task.result_code(), ResultCode::BadInput);
        assert!(task.value("gid").is_none());
    }

    #[tokio::test]
    async fn test_only_first_line_is_decoded() {
        let task = run_with(Some(TaskValue::from(
            b"a#b#c#d.m 1 2\r\n\xff\xfe".to_vec(),
        )))
        .await;

        assert_eq!(task.result_code(), ResultCode::Ok);
        assert_eq!(task.value("gid").and_then(TaskValue::as_str), Some("abcd"));
    }

    #[tokio::test]
    async fn test_failed_task_passes_through() {
        let mut task = Task::from_values([("data", TaskValue::from(b"a#b#c#d.m 1 2".to_vec()))]);
        task.set_error(anyhow!("limited"), ResultCode::FlowControl)
            .unwrap();

        let ctx = PipelineContext::new("test");
        let task = extractor().run(&ctx, task).await.unwrap();
        assert_eq!(task.result_code(), ResultCode::FlowControl);
        assert!(task.value("gid").is_none());
    }

    #[tokio::test]
    async fn test_empty_data_is_bad_input() {
        let task = run_with(Some(TaskValue::from(Vec::<u8>::new()))).await;
        assert_eq!(task.result_code(), ResultCode::BadInput);
        assert_eq!(task.error().unwrap().to_string(), "unexpected EOF");
    }

    #[tokio::test]
    async fn test_missing_or_wrong_shape_is_missing_input() {
        let task = run_with(None).await;
        assert_eq!(task.result_code(), ResultCode::MissingInput);

        let task = run_with(Some(TaskValue::from("a#b#c#d.m 1 2"))).await;
        assert_eq!(task.result_code(), ResultCode::MissingInput);
    }

    #[test]
    fn test_config_requires_keys() {
        let mut config = GraphiteGidExtractorConfig {
            common: CommonConfig::new("gid"),
            gid_key: "  ".into(),
            data_key: "data".into(),
        };
        assert!(config.prepare().is_err());

        config.gid_key = " gid ".into();
        config.data_key = String::new();
        assert!(config.prepare().is_err());
    }
}
