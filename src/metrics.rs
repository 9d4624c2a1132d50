use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Prometheus collectors shared by every pipeline of a gateway.
pub struct Metrics {
    registry: Registry,

    pub invocations_total: IntCounterVec,
    pub invocation_duration: HistogramVec,
    pub plugin_failures_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let invocations_total = IntCounterVec::new(
            Opts::new(
                "gateway_pipeline_invocations_total",
                "Total number of pipeline invocations by outcome",
            ),
            &["pipeline", "outcome", "code"],
        )
        .expect("metric creation failed");
        let invocation_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_pipeline_invocation_duration_seconds",
                "Pipeline invocation duration in seconds",
            ),
            &["pipeline"],
        )
        .expect("metric creation failed");
        let plugin_failures_total = IntCounterVec::new(
            Opts::new(
                "gateway_plugin_failures_total",
                "Total number of plugin infrastructure failures",
            ),
            &["pipeline", "plugin"],
        )
        .expect("metric creation failed");

        registry
            .register(Box::new(invocations_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(invocation_duration.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(plugin_failures_total.clone()))
            .expect("metric registration failed");

        Self {
            registry,
            invocations_total,
            invocation_duration,
            plugin_failures_total,
        }
    }

    /// Record one finished invocation. `code` is empty for infrastructure failures.
    pub fn record_invocation(&self, pipeline: &str, outcome: &str, code: &str, duration: Duration) {
        self.invocations_total
            .with_label_values(&[pipeline, outcome, code])
            .inc();
        self.invocation_duration
            .with_label_values(&[pipeline])
            .observe(duration.as_secs_f64());
    }

    pub fn record_plugin_failure(&self, pipeline: &str, plugin: &str) {
        self.plugin_failures_total
            .with_label_values(&[pipeline, plugin])
            .inc();
    }

    pub fn gather_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Render all collectors in the Prometheus text exposition format.
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather_metrics(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocations_are_labelled() {
        let metrics = Metrics::new();
        metrics.record_invocation("ingest", "short_circuited", "flow_control", Duration::ZERO);
        metrics.record_invocation("ingest", "short_circuited", "flow_control", Duration::ZERO);
        metrics.record_plugin_failure("ingest", "gid");

        assert_eq!(
            metrics
                .invocations_total
                .with_label_values(&["ingest", "short_circuited", "flow_control"])
                .get(),
            2
        );

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("gateway_pipeline_invocations_total"));
        assert!(text.contains("gateway_plugin_failures_total"));
    }
}
