use crate::task::ResultCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-pipeline invocation counters.
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    since: DateTime<Utc>,
    completed: AtomicU64,
    missing_input: AtomicU64,
    bad_input: AtomicU64,
    flow_control: AtomicU64,
    internal_server_error: AtomicU64,
    infrastructure_failed: AtomicU64,
    over_budget: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn new() -> Self {
        Self {
            since: Utc::now(),
            completed: AtomicU64::default(),
            missing_input: AtomicU64::default(),
            bad_input: AtomicU64::default(),
            flow_control: AtomicU64::default(),
            internal_server_error: AtomicU64::default(),
            infrastructure_failed: AtomicU64::default(),
            over_budget: AtomicU64::default(),
        }
    }

    fn counter(&self, code: ResultCode) -> &AtomicU64 {
        match code {
            ResultCode::Ok => &self.completed,
            ResultCode::MissingInput => &self.missing_input,
            ResultCode::BadInput => &self.bad_input,
            ResultCode::FlowControl => &self.flow_control,
            ResultCode::InternalServerError => &self.internal_server_error,
        }
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_short_circuit(&self, code: ResultCode) {
        self.counter(code).fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_infrastructure_failure(&self) {
        self.infrastructure_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_over_budget(&self) {
        self.over_budget.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PipelineStats {
        let short_circuited = ResultCode::ALL
            .into_iter()
            .filter(|code| code.is_terminal())
            .map(|code| (code, self.counter(code).load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        PipelineStats {
            since: self.since,
            completed: self.completed.load(Ordering::Relaxed),
            short_circuited,
            infrastructure_failed: self.infrastructure_failed.load(Ordering::Relaxed),
            over_budget: self.over_budget.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a pipeline's invocation outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    /// When counting started (pipeline build time)
    pub since: DateTime<Utc>,
    pub completed: u64,
    pub short_circuited: BTreeMap<ResultCode, u64>,
    pub infrastructure_failed: u64,
    /// Stages that returned after their plugin's `timeoutMs` budget
    pub over_budget: u64,
}

impl PipelineStats {
    pub fn total(&self) -> u64 {
        self.completed + self.short_circuited.values().sum::<u64>() + self.infrastructure_failed
    }

    pub fn short_circuited_with(&self, code: ResultCode) -> u64 {
        self.short_circuited.get(&code).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_by_code() {
        let stats = StatsRecorder::new();
        stats.record_completed();
        stats.record_completed();
        stats.record_short_circuit(ResultCode::FlowControl);
        stats.record_infrastructure_failure();
        stats.record_over_budget();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.short_circuited_with(ResultCode::FlowControl), 1);
        assert_eq!(snapshot.short_circuited_with(ResultCode::BadInput), 0);
        assert_eq!(snapshot.infrastructure_failed, 1);
        assert_eq!(snapshot.over_budget, 1);
        assert_eq!(snapshot.total(), 4);
    }
}
