//! Scripted plugins shared by the integration tests.

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use gateway_pipeline::error::PluginError;
use gateway_pipeline::pipeline::PipelineContext;
use gateway_pipeline::plugin::{CommonConfig, Plugin};
use gateway_pipeline::task::{ResultCode, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What a [`Scripted`] plugin does with each task.
#[derive(Clone)]
pub enum Action {
    /// Record the plugin's name under `visited.<name>` and pass the task on
    Pass,
    /// Set the given result code
    Fail(ResultCode),
    /// Return an infrastructure error
    Crash,
    /// Bind `response.payload` to the given text
    Respond(&'static str),
    /// Cancel the token after running
    Cancel(CancellationToken),
    /// Sleep before passing the task on
    Sleep(std::time::Duration),
    /// Signal `entered`, then block until `release` is notified
    Hold {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    },
    /// Count concurrent runs in `active`, keeping the high-water mark in `peak`
    Track {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        pause: std::time::Duration,
    },
}

pub struct Scripted {
    name: String,
    action: Action,
    runs: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl Scripted {
    pub fn new(name: &str, action: Action) -> Self {
        Self {
            name: name.to_string(),
            action,
            runs: Arc::default(),
            closes: Arc::default(),
            journal: None,
        }
    }

    /// Append the plugin name to `journal` on every run.
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn runs(&self) -> Arc<AtomicUsize> {
        self.runs.clone()
    }

    pub fn closes(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }

    pub fn common(&self) -> CommonConfig {
        CommonConfig::new(&self.name)
    }
}

#[async_trait]
impl Plugin for Scripted {
    async fn run(&self, _ctx: &PipelineContext, mut task: Task) -> Result<Task, PluginError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(self.name.clone());
        }

        match &self.action {
            Action::Pass => Ok(task.with_value(format!("visited.{}", self.name), true)?),
            Action::Fail(code) => {
                task.set_error(anyhow!("{} rejected the task", self.name), *code)?;
                Ok(task)
            }
            Action::Crash => Err(PluginError::Internal {
                reason: format!("{} lost its backend", self.name),
            }),
            Action::Respond(text) => Ok(task.with_value("response.payload", *text)?),
            Action::Cancel(token) => {
                token.cancel();
                Ok(task)
            }
            Action::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(task)
            }
            Action::Hold { entered, release } => {
                entered.notify_one();
                release.notified().await;
                Ok(task)
            }
            Action::Track {
                active,
                peak,
                pause,
            } => {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(*pause).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(task)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Seed the process-wide random source once per test binary.
pub fn init_random() {
    let _ = gateway_pipeline::random::init(Some(42));
}
