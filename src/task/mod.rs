//! The unit of work carried through a pipeline.
//!
//! A [`Task`] is a copy-on-write key/value bag plus a terminal outcome slot.
//! Deriving a task with [`Task::with_value`] never mutates the receiver, so two
//! in-flight handlings of the same logical request cannot observe each other's
//! writes.
//!
//! Once a failure has been recorded with [`Task::set_error`] the result code is
//! terminal: it cannot be replaced, and further writes are rejected with
//! [`TaskError::Terminated`].

mod result_code;

pub use result_code::{ResultClass, ResultCode};

use crate::error::TaskError;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Payload kinds a task can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    Bytes(Bytes),
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Record(serde_json::Value),
}

impl TaskValue {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            TaskValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TaskValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TaskValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TaskValue::Float(f) => Some(*f),
            TaskValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TaskValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&serde_json::Value> {
        match self {
            TaskValue::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskValue::Bytes(_) => "bytes",
            TaskValue::Text(_) => "text",
            TaskValue::Integer(_) => "integer",
            TaskValue::Float(_) => "float",
            TaskValue::Bool(_) => "bool",
            TaskValue::Record(_) => "record",
        }
    }

    /// Render the value as bytes for a protocol payload.
    pub fn to_payload(&self) -> Bytes {
        match self {
            TaskValue::Bytes(b) => b.clone(),
            TaskValue::Text(s) => Bytes::from(s.clone()),
            TaskValue::Integer(i) => Bytes::from(i.to_string()),
            TaskValue::Float(f) => Bytes::from(f.to_string()),
            TaskValue::Bool(b) => Bytes::from(b.to_string()),
            TaskValue::Record(v) => Bytes::from(v.to_string()),
        }
    }
}

impl From<Bytes> for TaskValue {
    fn from(value: Bytes) -> Self {
        TaskValue::Bytes(value)
    }
}

impl From<Vec<u8>> for TaskValue {
    fn from(value: Vec<u8>) -> Self {
        TaskValue::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for TaskValue {
    fn from(value: &'static [u8]) -> Self {
        TaskValue::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for TaskValue {
    fn from(value: String) -> Self {
        TaskValue::Text(value)
    }
}

impl From<&str> for TaskValue {
    fn from(value: &str) -> Self {
        TaskValue::Text(value.to_string())
    }
}

impl From<i64> for TaskValue {
    fn from(value: i64) -> Self {
        TaskValue::Integer(value)
    }
}

impl From<f64> for TaskValue {
    fn from(value: f64) -> Self {
        TaskValue::Float(value)
    }
}

impl From<bool> for TaskValue {
    fn from(value: bool) -> Self {
        TaskValue::Bool(value)
    }
}

impl From<serde_json::Value> for TaskValue {
    fn from(value: serde_json::Value) -> Self {
        TaskValue::Record(value)
    }
}

/// A recorded business failure: the error and the code classifying it.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    code: ResultCode,
    error: Arc<anyhow::Error>,
}

impl TaskFailure {
    pub fn code(&self) -> ResultCode {
        self.code
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    id: Uuid,
    values: Arc<HashMap<String, TaskValue>>,
    failure: Option<TaskFailure>,
    started: bool,
    finished: bool,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            values: Arc::new(HashMap::new()),
            failure: None,
            started: false,
            finished: false,
        }
    }

    /// Create a task seeded with initial bindings.
    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TaskValue>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: Arc::new(values),
            ..Self::new()
        }
    }

    /// Identifier shared by every task derived from the same inbound message.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn value(&self, key: &str) -> Option<&TaskValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Derive a new task with `key` bound to `value`.
    ///
    /// The receiver is left untouched. Fails on a finished task or one that
    /// already carries a terminal result code.
    pub fn with_value(
        &self,
        key: impl Into<String>,
        value: impl Into<TaskValue>,
    ) -> Result<Task, TaskError> {
        if self.finished {
            return Err(TaskError::Finished);
        }
        if let Some(failure) = &self.failure {
            return Err(TaskError::Terminated { code: failure.code });
        }

        let mut values = HashMap::clone(&self.values);
        values.insert(key.into(), value.into());

        Ok(Task {
            id: self.id,
            values: Arc::new(values),
            failure: None,
            started: self.started,
            finished: false,
        })
    }

    /// Record a business failure. The first failure wins.
    pub fn set_error(
        &mut self,
        error: impl Into<anyhow::Error>,
        code: ResultCode,
    ) -> Result<(), TaskError> {
        if self.finished {
            return Err(TaskError::Finished);
        }
        if code == ResultCode::Ok {
            return Err(TaskError::OkIsNotAFailure);
        }
        if let Some(failure) = &self.failure {
            return Err(TaskError::AlreadyFailed { code: failure.code });
        }

        self.failure = Some(TaskFailure {
            code,
            error: Arc::new(error.into()),
        });
        Ok(())
    }

    pub fn result_code(&self) -> ResultCode {
        self.failure
            .as_ref()
            .map(|f| f.code)
            .unwrap_or(ResultCode::Ok)
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.failure.as_ref().map(|f| f.error())
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    /// Mark the task as handed to a pipeline invocation.
    pub fn start(&mut self) -> Result<(), TaskError> {
        if self.finished {
            return Err(TaskError::Finished);
        }
        if self.started {
            return Err(TaskError::AlreadyStarted);
        }
        self.started = true;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Mark the owning invocation as done. Later writes fail.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_with_value_does_not_mutate_receiver() {
        let t0 = Task::new();
        let t1 = t0.with_value("k", "v").unwrap();

        assert!(t0.value("k").is_none());
        assert_eq!(t1.value("k").and_then(TaskValue::as_str), Some("v"));
        assert_eq!(t0.id(), t1.id());
    }

    #[test]
    fn test_with_value_keeps_original_binding() {
        let t0 = Task::from_values([("k", "old")]);
        let t1 = t0.with_value("k", "new").unwrap();

        assert_eq!(t0.value("k").and_then(TaskValue::as_str), Some("old"));
        assert_eq!(t1.value("k").and_then(TaskValue::as_str), Some("new"));
    }

    #[test]
    fn test_result_code_defaults_to_ok() {
        let t = Task::new();
        assert_eq!(t.result_code(), ResultCode::Ok);
        assert!(t.error().is_none());
    }

    #[test]
    fn test_first_error_wins() {
        let mut t = Task::new();
        t.set_error(anyhow!("bad line"), ResultCode::BadInput).unwrap();

        let err = t
            .set_error(anyhow!("later"), ResultCode::InternalServerError)
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::AlreadyFailed {
                code: ResultCode::BadInput
            }
        );
        assert_eq!(t.result_code(), ResultCode::BadInput);
        assert_eq!(t.error().unwrap().to_string(), "bad line");
    }

    #[test]
    fn test_ok_is_not_a_failure() {
        let mut t = Task::new();
        assert_eq!(
            t.set_error(anyhow!("nothing"), ResultCode::Ok),
            Err(TaskError::OkIsNotAFailure)
        );
        assert_eq!(t.result_code(), ResultCode::Ok);
    }

    #[test]
    fn test_writes_after_error_are_rejected() {
        let mut t = Task::new();
        t.set_error(anyhow!("limited"), ResultCode::FlowControl).unwrap();

        let err = t.with_value("k", 1i64).unwrap_err();
        assert_eq!(
            err,
            TaskError::Terminated {
                code: ResultCode::FlowControl
            }
        );
    }

    #[test]
    fn test_finished_task_rejects_writes() {
        let mut t = Task::new();
        t.start().unwrap();
        t.finish();

        assert_eq!(t.with_value("k", "v").unwrap_err(), TaskError::Finished);
        assert_eq!(
            t.set_error(anyhow!("late"), ResultCode::BadInput),
            Err(TaskError::Finished)
        );
    }

    #[test]
    fn test_reentrant_start_detected() {
        let mut t = Task::new();
        t.start().unwrap();
        assert_eq!(t.start(), Err(TaskError::AlreadyStarted));

        // Derived tasks inherit the started flag.
        let mut derived = t.with_value("k", "v").unwrap();
        assert_eq!(derived.start(), Err(TaskError::AlreadyStarted));
    }

    #[test]
    fn test_value_accessors() {
        let t = Task::from_values([
            ("bytes", TaskValue::from(b"raw".to_vec())),
            ("int", TaskValue::from(7i64)),
            ("record", TaskValue::from(serde_json::json!({"a": 1}))),
        ]);

        assert_eq!(
            t.value("bytes").and_then(TaskValue::as_bytes).map(|b| &b[..]),
            Some(&b"raw"[..])
        );
        assert_eq!(t.value("int").and_then(TaskValue::as_i64), Some(7));
        assert_eq!(t.value("int").and_then(TaskValue::as_f64), Some(7.0));
        assert!(t.value("int").and_then(TaskValue::as_str).is_none());
        assert_eq!(t.value("record").unwrap().kind(), "record");
        assert_eq!(t.len(), 3);
    }
}
