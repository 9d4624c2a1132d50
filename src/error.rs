use crate::task::ResultCode;
use std::io;
use thiserror::Error;

pub use crate::plugin::PluginError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Random source error: {0}")]
    Random(#[from] RandomError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),

    #[error("Unknown plugin kind '{kind}' for plugin '{plugin}'")]
    UnknownPluginKind { kind: String, plugin: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task has already finished")]
    Finished,

    #[error("task has already started")]
    AlreadyStarted,

    #[error("task already failed with result code {code}")]
    AlreadyFailed { code: ResultCode },

    #[error("task is terminated with result code {code}, further writes are rejected")]
    Terminated { code: ResultCode },

    #[error("result code OK does not describe a failure")]
    OkIsNotAFailure,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invocation cancelled before stage {stage}")]
    Cancelled { stage: usize },

    #[error("Invocation deadline exceeded before stage {stage}")]
    DeadlineExceeded { stage: usize },

    #[error("Plugin '{plugin}' failed: {source}")]
    Stage {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("Plugin '{plugin}' failed to prepare: {source}")]
    Prepare {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("Duplicate plugin name '{0}'")]
    DuplicatePlugin(String),

    #[error("Task rejected by pipeline: {0}")]
    Task(#[from] TaskError),

    #[error("Pipeline '{0}' is closed")]
    Closed(String),

    #[error("Protocol mismatch: pipeline expects {expected} got {actual}")]
    ProtocolMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RandomError {
    #[error("random source has already been initialised")]
    AlreadyInitialised,

    #[error("random source has not been initialised")]
    Uninitialised,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback '{name}' has unexpected type, want {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

pub type Result<T> = std::result::Result<T, GatewayError>;
