use super::config::{CommonConfig, PluginConfig};
use super::registry::PluginKind;
use super::{Plugin, PluginError};
use crate::error::ConfigError;
use crate::pipeline::PipelineContext;
use crate::random;
use crate::task::{ResultCode, Task};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticProbabilityLimiterConfig {
    #[serde(flatten)]
    pub common: CommonConfig,

    /// Probability in `[0, 1]` that a task is let through
    pub pass_pr: f64,
}

impl PluginConfig for StaticProbabilityLimiterConfig {
    fn common(&self) -> &CommonConfig {
        &self.common
    }

    fn prepare(&mut self) -> Result<(), ConfigError> {
        self.common.prepare()?;

        if !(0.0..=1.0).contains(&self.pass_pr) {
            return Err(ConfigError::Validation(format!(
                "invalid passing probability {}",
                self.pass_pr
            )));
        }

        if self.pass_pr == 0.0 {
            warn!(
                plugin = %self.common.name,
                "ZERO passing probability has been applied, no request could be processed"
            );
        }

        if self.pass_pr == 1.0 {
            warn!(
                plugin = %self.common.name,
                "1.0 passing probability has been applied, no request could be limited"
            );
        }

        Ok(())
    }
}

/// Admission control that rejects a fixed fraction of tasks at random.
pub struct StaticProbabilityLimiter {
    config: StaticProbabilityLimiterConfig,
}

impl StaticProbabilityLimiter {
    pub fn new(config: StaticProbabilityLimiterConfig) -> Self {
        Self { config }
    }

    pub fn pass_probability(&self) -> f64 {
        self.config.pass_pr
    }
}

#[async_trait]
impl Plugin for StaticProbabilityLimiter {
    async fn run(&self, _ctx: &PipelineContext, mut task: Task) -> Result<Task, PluginError> {
        if task.result_code().is_terminal() {
            return Ok(task);
        }
        let sample = random::sample()?;
        if sample < 1.0 - self.config.pass_pr {
            debug!(plugin = %self.config.common.name, sample, "Task rejected by probability limit");
            task.set_error(
                anyhow!("service is unavailable caused by probability limit"),
                ResultCode::FlowControl,
            )?;
        }
        Ok(task)
    }

    fn name(&self) -> &str {
        self.config.plugin_name()
    }

    fn kind(&self) -> &'static str {
        <Self as PluginKind>::KIND
    }
}

impl PluginKind for StaticProbabilityLimiter {
    const KIND: &'static str = "static_probability_limiter";

    type Config = StaticProbabilityLimiterConfig;

    fn construct(config: Self::Config) -> Result<Arc<dyn Plugin>, PluginError> {
        Ok(Arc::new(StaticProbabilityLimiter::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pass_pr: f64) -> StaticProbabilityLimiterConfig {
        StaticProbabilityLimiterConfig {
            common: CommonConfig::new("limiter"),
            pass_pr,
        }
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        assert!(config(-0.1).prepare().is_err());
        assert!(config(1.01).prepare().is_err());
        assert!(config(f64::NAN).prepare().is_err());
    }

    #[test]
    fn test_degenerate_probabilities_are_legal() {
        assert!(config(0.0).prepare().is_ok());
        assert!(config(1.0).prepare().is_ok());
        assert!(config(0.25).prepare().is_ok());
    }

    #[tokio::test]
    async fn test_extremes() {
        let _ = random::init(Some(11));
        let ctx = PipelineContext::new("test");

        let reject_all = StaticProbabilityLimiter::new(config(0.0));
        let pass_all = StaticProbabilityLimiter::new(config(1.0));

        for _ in 0..500 {
            let task = reject_all.run(&ctx, Task::new()).await.unwrap();
            assert_eq!(task.result_code(), ResultCode::FlowControl);

            let task = pass_all.run(&ctx, Task::new()).await.unwrap();
            assert_eq!(task.result_code(), ResultCode::Ok);
        }
    }

    #[tokio::test]
    async fn test_failed_task_passes_through() {
        let _ = random::init(Some(11));
        let ctx = PipelineContext::new("test");
        let reject_all = StaticProbabilityLimiter::new(config(0.0));

        let mut task = Task::new();
        task.set_error(anyhow!("bad"), ResultCode::BadInput).unwrap();

        let task = reject_all.run(&ctx, task).await.unwrap();
        assert_eq!(task.result_code(), ResultCode::BadInput);
        assert_eq!(task.error().unwrap().to_string(), "bad");
    }
}
