//! Plugin contract and built-in plugin kinds
//!
//! A plugin is a single configured processing stage. Its lifecycle is:
//!
//! - **Construction**: the [`registry`] deserialises raw settings into the
//!   kind's config, runs the config's `prepare` validation, then calls the
//!   kind's constructor. Invalid configs never reach a pipeline.
//! - **`prepare`**: called once when the plugin joins a pipeline, with the
//!   pipeline's shared [`PipelineContext`].
//! - **`run`**: the per-task step.
//! - **`close`**: called exactly once when the plugin leaves its pipeline.
//!
//! Two error channels are kept apart. A plugin that wants to fail the *task*
//! records a [`ResultCode`](crate::task::ResultCode) with
//! [`Task::set_error`] and returns `Ok(task)`. A plugin that itself
//! malfunctioned returns `Err`, which aborts the invocation.
//!
//! # Modules
//!
//! - `config`: common plugin config and the raw plugin spec
//! - `registry`: kind name to factory table
//! - `graphite_gid_extractor`: field-extraction plugin
//! - `static_probability_limiter`: admission-control plugin

pub mod config;
pub mod graphite_gid_extractor;
pub mod registry;
pub mod static_probability_limiter;

pub use config::{CommonConfig, PluginConfig, PluginSpec};
pub use graphite_gid_extractor::GraphiteGidExtractor;
pub use registry::{PluginKind, PluginRegistry, PreparedConfig};
pub use static_probability_limiter::StaticProbabilityLimiter;

use crate::error::{RandomError, TaskError};
use crate::pipeline::PipelineContext;
use crate::task::Task;
use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// One-time setup against shared pipeline state.
    ///
    /// Built-in plugins are idempotent here, so a reloaded pipeline may call
    /// it again on the same instance.
    fn prepare(&self, _ctx: &PipelineContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Process one task, returning the (possibly new) task.
    async fn run(&self, ctx: &PipelineContext, task: Task) -> Result<Task, PluginError>;

    /// Stable identifier, equal to the configured plugin name.
    fn name(&self) -> &str;

    /// Kind name the plugin was built from.
    fn kind(&self) -> &'static str;

    /// Release plugin-held resources. Must be safe without a prior `prepare`.
    fn close(&self) {}
}

/// Infrastructure failures of a plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin constructor rejected its prepared config
    #[error("Failed to construct plugin '{name}': {reason}")]
    ConstructionFailed { name: String, reason: String },

    /// Task could not be updated
    #[error("Task update failed: {0}")]
    Task(#[from] TaskError),

    /// Shared random source unavailable
    #[error("Random source unavailable: {0}")]
    Random(#[from] RandomError),

    /// Any other fault inside the plugin
    #[error("Plugin internal error: {reason}")]
    Internal { reason: String },
}
