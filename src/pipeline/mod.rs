//! Pipeline execution engine
//!
//! A [`Pipeline`] owns an ordered list of plugins and drives one [`Task`] per
//! invocation through them. Each invocation moves through
//! `Idle -> Running(stage) -> {Completed | ShortCircuited | InfrastructureFailed}`:
//!
//! - a plugin returning `Err` fails the invocation; no later stage runs
//! - a plugin leaving a terminal [`ResultCode`] on the task short-circuits it
//! - running off the end of the chain completes it
//!
//! Cancellation and the invocation deadline are observed between stages only,
//! never inside a running plugin.
//!
//! Closing a pipeline stops new invocations immediately. Plugins and context
//! close callbacks are torn down once the last in-flight invocation returns.

mod context;
mod stats;

pub use context::{CloseCallback, PipelineContext};
pub use stats::PipelineStats;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PluginError};
use crate::metrics::Metrics;
use crate::plugin::{CommonConfig, Plugin, PluginRegistry};
use crate::protocol::{
    create_adapter, AdapterKeys, ProtocolAdapter, ProtocolKind, ProtocolRequest,
    ProtocolResponse, Request,
};
use crate::task::{ResultCode, Task};
use stats::StatsRecorder;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Limits applied to every invocation of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Budget for one invocation, checked at stage boundaries
    pub deadline: Option<Duration>,
    /// Maximum number of invocations in flight at once
    pub max_concurrency: Option<usize>,
}

/// Terminal state of one invocation.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every stage ran and left the task `Ok`
    Completed(Task),
    /// Stage `stage` (zero-based) set a terminal result code. A task that
    /// arrives already failed stops before stage 0 with an empty `plugin`.
    ShortCircuited {
        task: Task,
        stage: usize,
        plugin: String,
    },
    /// The invocation was aborted without a trustworthy task
    InfrastructureFailed { error: PipelineError },
}

impl PipelineOutcome {
    pub fn state(&self) -> &'static str {
        match self {
            PipelineOutcome::Completed(_) => "completed",
            PipelineOutcome::ShortCircuited { .. } => "short_circuited",
            PipelineOutcome::InfrastructureFailed { .. } => "infrastructure_failed",
        }
    }

    pub fn task(&self) -> Option<&Task> {
        match self {
            PipelineOutcome::Completed(task) | PipelineOutcome::ShortCircuited { task, .. } => {
                Some(task)
            }
            PipelineOutcome::InfrastructureFailed { .. } => None,
        }
    }

    pub fn into_task(self) -> Result<Task, PipelineError> {
        match self {
            PipelineOutcome::Completed(task) | PipelineOutcome::ShortCircuited { task, .. } => {
                Ok(task)
            }
            PipelineOutcome::InfrastructureFailed { error } => Err(error),
        }
    }

    /// Result code of the final task, `None` on infrastructure failure.
    pub fn result_code(&self) -> Option<ResultCode> {
        self.task().map(Task::result_code)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed(_))
    }
}

struct Stage {
    plugin: Arc<dyn Plugin>,
    common: CommonConfig,
}

pub struct PipelineBuilder {
    name: String,
    protocol: ProtocolKind,
    keys: AdapterKeys,
    policy: ExecutionPolicy,
    stages: Vec<Stage>,
    metrics: Option<Arc<Metrics>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: ProtocolKind::Http,
            keys: AdapterKeys::default(),
            policy: ExecutionPolicy::default(),
            stages: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_keys(mut self, keys: AdapterKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append a constructed plugin. `common` carries its order and enabled flag.
    pub fn with_plugin(mut self, common: CommonConfig, plugin: Arc<dyn Plugin>) -> Self {
        self.stages.push(Stage { plugin, common });
        self
    }

    /// Order the stages, prepare every plugin and assemble the pipeline.
    ///
    /// If any plugin fails to prepare, every plugin handed to the builder is
    /// closed and no pipeline is produced.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let context = Arc::new(PipelineContext::new(&self.name));

        let (mut stages, disabled): (Vec<_>, Vec<_>) =
            self.stages.into_iter().partition(|s| s.common.enabled);
        for stage in &disabled {
            debug!(pipeline = %self.name, plugin = stage.plugin.name(), "Skipping disabled plugin");
        }
        // Stable: equal orders keep declaration order.
        stages.sort_by_key(|s| s.common.order);

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.plugin.name()) {
                let duplicate = stage.plugin.name().to_string();
                close_all(&stages);
                return Err(PipelineError::DuplicatePlugin(duplicate));
            }
        }

        for stage in &stages {
            if let Err(source) = stage.plugin.prepare(&context) {
                error!(
                    pipeline = %self.name,
                    plugin = stage.plugin.name(),
                    error = %source,
                    "Plugin prepare failed"
                );
                context.run_close_callbacks();
                close_all(&stages);
                return Err(PipelineError::Prepare {
                    plugin: stage.plugin.name().to_string(),
                    source,
                });
            }
        }

        let limiter = self.policy.max_concurrency.map(Semaphore::new);

        info!(
            pipeline = %self.name,
            protocol = %self.protocol,
            stages = stages.len(),
            "Pipeline built"
        );

        Ok(Pipeline {
            name: self.name,
            adapter: create_adapter(self.protocol, self.keys),
            stages,
            context,
            policy: self.policy,
            limiter,
            metrics: self.metrics,
            stats: StatsRecorder::new(),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            torn_down: AtomicBool::new(false),
            drained: Notify::new(),
        })
    }
}

fn close_all(stages: &[Stage]) {
    for stage in stages {
        stage.plugin.close();
    }
}

pub struct Pipeline {
    name: String,
    adapter: Arc<dyn ProtocolAdapter>,
    stages: Vec<Stage>,
    context: Arc<PipelineContext>,
    policy: ExecutionPolicy,
    limiter: Option<Semaphore>,
    metrics: Option<Arc<Metrics>>,
    stats: StatsRecorder,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    torn_down: AtomicBool,
    drained: Notify,
}

/// Marks one invocation as in flight for as long as it is alive.
struct InFlight<'a>(&'a Pipeline);

impl<'a> InFlight<'a> {
    fn enter(pipeline: &'a Pipeline) -> Self {
        pipeline.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(pipeline)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let pipeline = self.0;
        if pipeline.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 && pipeline.is_closed() {
            pipeline.teardown();
        }
    }
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Build a pipeline from configuration, constructing plugins through `registry`.
    ///
    /// Disabled plugins are neither constructed nor scheduled.
    pub fn from_config(
        config: &PipelineConfig,
        registry: &PluginRegistry,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Pipeline, crate::error::GatewayError> {
        registry.validate(&config.plugins)?;

        let mut prepared = Vec::with_capacity(config.plugins.len());
        for spec in &config.plugins {
            prepared.push(registry.prepare_config(spec)?);
        }

        let mut builder = PipelineBuilder::new(&config.name)
            .with_protocol(config.protocol)
            .with_keys(config.keys.clone())
            .with_policy(config.execution_policy());
        if let Some(metrics) = metrics {
            builder = builder.with_metrics(metrics);
        }

        let mut constructed: Vec<Arc<dyn Plugin>> = Vec::new();
        for config in prepared {
            if !config.common().enabled {
                debug!(plugin = %config.common().name, "Plugin disabled, not constructed");
                continue;
            }
            let common = config.common().clone();
            match config.construct() {
                Ok(plugin) => {
                    constructed.push(plugin.clone());
                    builder = builder.with_plugin(common, plugin);
                }
                Err(e) => {
                    for plugin in &constructed {
                        plugin.close();
                    }
                    return Err(PluginError::ConstructionFailed {
                        name: common.name,
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(builder.build()?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.adapter.kind()
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Plugin names in execution order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.plugin.name()).collect()
    }

    /// Whether the pipeline stopped accepting invocations.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Invocations currently between admission and their outcome.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether plugins and context close callbacks have been torn down.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Wait until a closed pipeline has drained and been torn down.
    pub async fn drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.is_torn_down() {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Drive `task` through every stage.
    pub async fn run(&self, task: Task, cancel: &CancellationToken) -> PipelineOutcome {
        let started = Instant::now();
        let span = tracing::info_span!(
            "pipeline_invocation",
            pipeline = %self.name,
            task = %task.id(),
        );

        let outcome = self.execute(task, cancel, started).instrument(span).await;
        self.record(&outcome, started.elapsed());
        outcome
    }

    /// Translate `request` into a task, run it, and translate the outcome back.
    pub async fn handle(
        &self,
        request: &ProtocolRequest,
        cancel: &CancellationToken,
    ) -> ProtocolResponse {
        let task = match self.adapter.request_to_task(request) {
            Ok(task) => task,
            Err(error) => {
                warn!(
                    pipeline = %self.name,
                    protocol = %request.protocol(),
                    error = %error,
                    "Request rejected by adapter"
                );
                let response = self.adapter.failure_response(&error);
                self.record(&failed(error), Duration::ZERO);
                return response;
            }
        };

        match self.run(task, cancel).await {
            PipelineOutcome::Completed(task) | PipelineOutcome::ShortCircuited { task, .. } => {
                self.adapter.task_to_response(&task)
            }
            PipelineOutcome::InfrastructureFailed { error } => self.adapter.failure_response(&error),
        }
    }

    async fn execute(
        &self,
        mut task: Task,
        cancel: &CancellationToken,
        started: Instant,
    ) -> PipelineOutcome {
        let _in_flight = InFlight::enter(self);
        if self.is_closed() {
            return failed(PipelineError::Closed(self.name.clone()));
        }

        let deadline = self.policy.deadline.map(|budget| started + budget);

        let _permit = match self.acquire(cancel, deadline).await {
            Ok(permit) => permit,
            Err(error) => return failed(error),
        };

        if let Err(e) = task.start() {
            return failed(e.into());
        }

        let code = task.result_code();
        if code.is_terminal() {
            warn!(code = %code, "Task arrived with a terminal result code");
            task.finish();
            return PipelineOutcome::ShortCircuited {
                task,
                stage: 0,
                plugin: String::new(),
            };
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if cancel.is_cancelled() {
                task.finish();
                return failed(PipelineError::Cancelled { stage: index });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                task.finish();
                return failed(PipelineError::DeadlineExceeded { stage: index });
            }

            let plugin = stage.plugin.name();
            debug!(stage = index, plugin, "Running stage");

            let stage_started = Instant::now();
            let result = stage.plugin.run(&self.context, task).await;
            if let Some(budget) = stage.common.timeout() {
                let elapsed = stage_started.elapsed();
                if elapsed > budget {
                    warn!(stage = index, plugin, ?elapsed, ?budget, "Plugin exceeded its time budget");
                    self.stats.record_over_budget();
                }
            }

            task = match result {
                Ok(task) => task,
                Err(source) => {
                    error!(stage = index, plugin, error = %source, "Plugin failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_plugin_failure(&self.name, plugin);
                    }
                    return failed(PipelineError::Stage {
                        plugin: plugin.to_string(),
                        source,
                    });
                }
            };

            let code = task.result_code();
            if code.is_terminal() {
                let reason = task.error().map(ToString::to_string).unwrap_or_default();
                warn!(stage = index, plugin, code = %code, reason = %reason, "Pipeline short-circuited");
                task.finish();
                return PipelineOutcome::ShortCircuited {
                    task,
                    stage: index,
                    plugin: plugin.to_string(),
                };
            }
        }

        debug!(stages = self.stages.len(), "Pipeline completed");
        task.finish();
        PipelineOutcome::Completed(task)
    }

    async fn acquire(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Option<SemaphorePermit<'_>>, PipelineError> {
        let Some(limiter) = &self.limiter else {
            return Ok(None);
        };

        let expiry = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage: 0 }),
            _ = expiry => Err(PipelineError::DeadlineExceeded { stage: 0 }),
            permit = limiter.acquire() => permit
                .map(Some)
                .map_err(|_| PipelineError::Closed(self.name.clone())),
        }
    }

    fn record(&self, outcome: &PipelineOutcome, elapsed: Duration) {
        let code = match outcome {
            PipelineOutcome::Completed(_) => {
                self.stats.record_completed();
                ResultCode::Ok.as_str()
            }
            PipelineOutcome::ShortCircuited { task, .. } => {
                let code = task.result_code();
                self.stats.record_short_circuit(code);
                code.as_str()
            }
            PipelineOutcome::InfrastructureFailed { .. } => {
                self.stats.record_infrastructure_failure();
                ""
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_invocation(&self.name, outcome.state(), code, elapsed);
        }
    }

    /// Stop accepting invocations. Only the first call has any effect.
    ///
    /// New invocations, including those waiting for a concurrency permit, fail
    /// with [`PipelineError::Closed`]. In-flight invocations run to completion;
    /// the last one to return tears the pipeline down. Teardown runs context
    /// close callbacks in registration order, then closes every plugin once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(limiter) = &self.limiter {
            limiter.close();
        }

        let in_flight = self.in_flight();
        if in_flight == 0 {
            self.teardown();
        } else {
            info!(pipeline = %self.name, in_flight, "Pipeline closing, waiting for in-flight invocations");
        }
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.context.run_close_callbacks();
        close_all(&self.stages);
        self.drained.notify_waiters();
        info!(pipeline = %self.name, "Pipeline closed");
    }
}

fn failed(error: PipelineError) -> PipelineOutcome {
    PipelineOutcome::InfrastructureFailed { error }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("protocol", &self.adapter.kind())
            .field("plugins", &self.plugin_names())
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
