pub mod callback;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod plugin;
pub mod protocol;
pub mod random;
pub mod task;
