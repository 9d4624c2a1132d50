//! State shared by every plugin and every task of one pipeline.

use crate::callback::NamedCallbacks;
use crate::task::TaskValue;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Teardown hook registered by a plugin, run when the pipeline closes.
pub type CloseCallback = Arc<dyn Fn(&PipelineContext) + Send + Sync>;

/// Pipeline-scoped bag passed to every `prepare` and `run`.
///
/// Unlike a task's values, entries here outlive a single invocation and may be
/// read and written concurrently by invocations running in parallel.
pub struct PipelineContext {
    pipeline: String,
    store: DashMap<String, TaskValue>,
    close_callbacks: Mutex<NamedCallbacks<CloseCallback>>,
}

impl PipelineContext {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            store: DashMap::new(),
            close_callbacks: Mutex::new(NamedCallbacks::new()),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    pub fn get(&self, key: &str) -> Option<TaskValue> {
        self.store.get(key).map(|v| v.value().clone())
    }

    /// Bind `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<TaskValue>) -> Option<TaskValue> {
        self.store.insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<TaskValue> {
        self.store.remove(key).map(|(_, v)| v)
    }

    /// Atomically add `delta` to an integer counter, creating it at zero.
    ///
    /// A non-integer value under `key` is replaced. The counter saturates at
    /// `i64::MIN` and `i64::MAX` instead of wrapping.
    pub fn increment(&self, key: &str, delta: i64) -> i64 {
        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert(TaskValue::Integer(0));
        let next = entry.as_i64().unwrap_or(0).saturating_add(delta);
        *entry = TaskValue::Integer(next);
        next
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn callbacks(&self) -> MutexGuard<'_, NamedCallbacks<CloseCallback>> {
        self.close_callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a hook run when the pipeline closes.
    ///
    /// Same semantics as [`NamedCallbacks::add`]: with `rewrite == false` an
    /// existing hook under `name` is kept.
    pub fn add_close_callback(
        &self,
        name: &str,
        callback: CloseCallback,
        rewrite: bool,
    ) -> (Option<CloseCallback>, bool) {
        self.callbacks().add(name, callback, rewrite)
    }

    pub fn delete_close_callback(&self, name: &str) -> Option<CloseCallback> {
        self.callbacks().delete(name)
    }

    pub fn close_callback_names(&self) -> Vec<String> {
        self.callbacks()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Run and drop all close hooks, in registration order.
    pub(crate) fn run_close_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks());
        for entry in callbacks.iter() {
            debug!(pipeline = %self.pipeline, callback = entry.name(), "Running close callback");
            (entry.callback())(self);
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("pipeline", &self.pipeline)
            .field("entries", &self.store.len())
            .finish_non_exhaustive()
    }
}
