//! The set of live pipelines, keyed by name.
//!
//! The table is swapped atomically on reload, so in-flight invocations keep
//! the pipeline they started with while new ones see the replacement.

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::metrics::Metrics;
use crate::pipeline::{Pipeline, PipelineStats};
use crate::plugin::PluginRegistry;
use crate::protocol::{ProtocolRequest, ProtocolResponse};
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

type PipelineTable = HashMap<String, Arc<Pipeline>>;

pub struct Gateway {
    registry: PluginRegistry,
    pipelines: ArcSwap<PipelineTable>,
    metrics: Arc<Metrics>,
}

impl Gateway {
    pub fn new(registry: PluginRegistry, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            pipelines: ArcSwap::from_pointee(HashMap::new()),
            metrics,
        }
    }

    /// Build every configured pipeline.
    ///
    /// All plugin kinds are checked before the first pipeline is built.
    pub fn from_config(config: &Config, registry: PluginRegistry) -> Result<Self> {
        let gateway = Self::new(registry, Arc::new(Metrics::new()));
        gateway.reload(config)?;
        Ok(gateway)
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.load().get(name).cloned()
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pipelines.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Route `request` to the named pipeline.
    pub async fn handle(
        &self,
        pipeline: &str,
        request: &ProtocolRequest,
        cancel: &CancellationToken,
    ) -> Result<ProtocolResponse> {
        let pipeline = self
            .pipeline(pipeline)
            .ok_or_else(|| GatewayError::PipelineNotFound(pipeline.to_string()))?;
        Ok(pipeline.handle(request, cancel).await)
    }

    /// Replace the whole pipeline table with one built from `config`.
    ///
    /// The configuration is validated first. Nothing changes if it is invalid
    /// or any pipeline fails to build; pipelines already built for the new
    /// table are closed in that case. Replaced pipelines are closed after the
    /// swap and tear down once their in-flight invocations return.
    pub fn reload(&self, config: &Config) -> Result<()> {
        crate::config::validate(config)?;
        for pipeline in &config.pipelines {
            self.registry.validate(&pipeline.plugins)?;
        }

        let mut table = PipelineTable::new();
        for pipeline_config in &config.pipelines {
            match Pipeline::from_config(pipeline_config, &self.registry, Some(self.metrics.clone()))
            {
                Ok(pipeline) => {
                    table.insert(pipeline_config.name.clone(), Arc::new(pipeline));
                }
                Err(e) => {
                    for pipeline in table.values() {
                        pipeline.close();
                    }
                    return Err(e);
                }
            }
        }

        let names: Vec<_> = table.keys().cloned().collect();
        let previous = self.pipelines.swap(Arc::new(table));
        for pipeline in previous.values() {
            pipeline.close();
        }

        info!(pipelines = ?names, "Pipelines loaded");
        Ok(())
    }

    /// Take a pipeline out of service and close it.
    pub fn remove(&self, name: &str) -> Option<Arc<Pipeline>> {
        let mut removed = None;
        self.pipelines.rcu(|table| {
            let mut table = PipelineTable::clone(table);
            removed = table.remove(name);
            table
        });

        if let Some(pipeline) = &removed {
            pipeline.close();
            info!(pipeline = name, "Pipeline removed");
        }
        removed
    }

    pub fn stats(&self) -> BTreeMap<String, PipelineStats> {
        self.pipelines
            .load()
            .iter()
            .map(|(name, pipeline)| (name.clone(), pipeline.stats()))
            .collect()
    }

    /// Close every pipeline and empty the table.
    pub fn shutdown(&self) {
        let previous = self.pipelines.swap(Arc::new(PipelineTable::new()));
        for pipeline in previous.values() {
            pipeline.close();
        }
        info!(pipelines = previous.len(), "Gateway shut down");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("kinds", &self.registry.kinds())
            .field("pipelines", &self.pipeline_names())
            .finish()
    }
}
