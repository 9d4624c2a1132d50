//! Translation between protocol messages and tasks.

use super::{
    HttpResponse, MqttResponse, ProtocolKind, ProtocolRequest, ProtocolResponse, Request,
    Response,
};
use crate::error::PipelineError;
use crate::task::{ResultCode, Task, TaskValue};
use ::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use ::http::StatusCode;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_INPUT_KEY: &str = "request.payload";
pub const DEFAULT_OUTPUT_KEY: &str = "response.payload";

/// Seconds a flow-controlled HTTP client is asked to wait.
const RETRY_AFTER_SECS: &str = "1";

/// Response header naming the task's result code.
const RESULT_HEADER: &str = "x-gateway-result";

/// Task keys an adapter reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterKeys {
    /// Key the inbound payload is stored under
    #[serde(default = "default_input_key")]
    pub input_key: String,

    /// Key the response payload is read from
    #[serde(default = "default_output_key")]
    pub output_key: String,
}

fn default_input_key() -> String {
    DEFAULT_INPUT_KEY.to_string()
}

fn default_output_key() -> String {
    DEFAULT_OUTPUT_KEY.to_string()
}

impl Default for AdapterKeys {
    fn default() -> Self {
        Self {
            input_key: default_input_key(),
            output_key: default_output_key(),
        }
    }
}

pub trait ProtocolAdapter: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Build the initial task for an inbound message.
    fn request_to_task(&self, request: &ProtocolRequest) -> Result<Task, PipelineError>;

    /// Translate a completed or short-circuited task into a response.
    fn task_to_response(&self, task: &Task) -> ProtocolResponse;

    /// Generic internal-error response for infrastructure failures.
    fn failure_response(&self, error: &PipelineError) -> ProtocolResponse;
}

pub fn create_adapter(kind: ProtocolKind, keys: AdapterKeys) -> Arc<dyn ProtocolAdapter> {
    match kind {
        ProtocolKind::Http => Arc::new(HttpAdapter::new(keys)),
        ProtocolKind::Mqtt => Arc::new(MqttAdapter::new(keys)),
    }
}

fn mismatch(expected: ProtocolKind, request: &ProtocolRequest) -> PipelineError {
    PipelineError::ProtocolMismatch {
        expected: expected.as_str(),
        actual: request.protocol().as_str(),
    }
}

fn output_payload(task: &Task, key: &str) -> Bytes {
    task.value(key)
        .map(TaskValue::to_payload)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default)]
pub struct HttpAdapter {
    keys: AdapterKeys,
}

impl HttpAdapter {
    pub fn new(keys: AdapterKeys) -> Self {
        Self { keys }
    }
}

impl ProtocolAdapter for HttpAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Http
    }

    fn request_to_task(&self, request: &ProtocolRequest) -> Result<Task, PipelineError> {
        let request = request
            .as_http()
            .ok_or_else(|| mismatch(ProtocolKind::Http, request))?;

        Ok(Task::from_values([
            (
                self.keys.input_key.clone(),
                TaskValue::Bytes(request.body().clone()),
            ),
            (
                "http.method".to_string(),
                TaskValue::from(request.method().as_str()),
            ),
            ("http.path".to_string(), TaskValue::from(request.path())),
        ]))
    }

    fn task_to_response(&self, task: &Task) -> ProtocolResponse {
        let mut response = HttpResponse::new();
        let code = task.result_code();
        response.set_status(code.http_status());

        let payload = match task.error() {
            Some(error) => Bytes::from(error.to_string()),
            None => output_payload(task, &self.keys.output_key),
        };
        response.set_payload(payload);

        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static(RESULT_HEADER),
            HeaderValue::from_static(code.as_str()),
        );
        if code == ResultCode::FlowControl {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }

        ProtocolResponse::Http(response)
    }

    fn failure_response(&self, _error: &PipelineError) -> ProtocolResponse {
        let mut response = HttpResponse::new();
        response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.set_payload(Bytes::from_static(b"internal server error"));
        ProtocolResponse::Http(response)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MqttAdapter {
    keys: AdapterKeys,
}

impl MqttAdapter {
    pub fn new(keys: AdapterKeys) -> Self {
        Self { keys }
    }
}

impl ProtocolAdapter for MqttAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Mqtt
    }

    fn request_to_task(&self, request: &ProtocolRequest) -> Result<Task, PipelineError> {
        let request = request
            .as_mqtt()
            .ok_or_else(|| mismatch(ProtocolKind::Mqtt, request))?;

        let mut values = vec![
            (
                self.keys.input_key.clone(),
                TaskValue::Bytes(Bytes::copy_from_slice(request.payload())),
            ),
            (
                "mqtt.client_id".to_string(),
                TaskValue::from(request.client_id()),
            ),
            (
                "mqtt.packet_type".to_string(),
                TaskValue::from(request.packet().packet_type()),
            ),
        ];
        if let Some(topic) = request.topic() {
            values.push(("mqtt.topic".to_string(), TaskValue::from(topic)));
        }
        if !request.topics().is_empty() {
            values.push((
                "mqtt.topics".to_string(),
                TaskValue::Record(serde_json::json!(request.topics())),
            ));
        }

        Ok(Task::from_values(values))
    }

    fn task_to_response(&self, task: &Task) -> ProtocolResponse {
        let mut response = MqttResponse::new();
        match task.result_code() {
            ResultCode::Ok => {
                response.set_payload(output_payload(task, &self.keys.output_key));
            }
            ResultCode::MissingInput | ResultCode::BadInput | ResultCode::FlowControl => {
                response.set_drop();
            }
            ResultCode::InternalServerError => {
                response.set_drop();
                response.set_disconnect();
            }
        }
        ProtocolResponse::Mqtt(response)
    }

    fn failure_response(&self, _error: &PipelineError) -> ProtocolResponse {
        let mut response = MqttResponse::new();
        response.set_drop();
        response.set_disconnect();
        ProtocolResponse::Mqtt(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HttpRequest, MqttPacket, MqttRequest};
    use ::http::{Method, Uri};
    use anyhow::anyhow;

    fn http_request() -> ProtocolRequest {
        HttpRequest::new(Method::POST, Uri::from_static("/ingest"))
            .with_body("payload")
            .into()
    }

    #[test]
    fn test_http_request_to_task() {
        let adapter = HttpAdapter::default();
        let task = adapter.request_to_task(&http_request()).unwrap();

        assert_eq!(
            task.value(DEFAULT_INPUT_KEY)
                .and_then(TaskValue::as_bytes)
                .map(|b| &b[..]),
            Some(&b"payload"[..])
        );
        assert_eq!(
            task.value("http.method").and_then(TaskValue::as_str),
            Some("POST")
        );
        assert_eq!(
            task.value("http.path").and_then(TaskValue::as_str),
            Some("/ingest")
        );
    }

    #[test]
    fn test_http_rejects_mqtt_request() {
        let adapter = HttpAdapter::default();
        let request: ProtocolRequest = MqttRequest::new("c", MqttPacket::Connect).into();
        let err = adapter.request_to_task(&request).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ProtocolMismatch {
                expected: "http",
                actual: "mqtt"
            }
        ));
    }

    #[test]
    fn test_http_response_for_ok_task() {
        let adapter = HttpAdapter::default();
        let task = Task::new().with_value(DEFAULT_OUTPUT_KEY, "done").unwrap();

        let response = adapter.task_to_response(&task);
        let response = response.as_http().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.raw_payload(), b"done");
    }

    #[test]
    fn test_http_flow_control_maps_to_503() {
        let adapter = HttpAdapter::default();
        let mut task = Task::new();
        task.set_error(anyhow!("limited"), ResultCode::FlowControl)
            .unwrap();

        let response = adapter.task_to_response(&task);
        let response = response.as_http().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.raw_payload(), b"limited");
        assert_eq!(
            response.header().unwrap().get("retry-after").as_deref(),
            Some(RETRY_AFTER_SECS)
        );
        assert_eq!(
            response.headers().get(RESULT_HEADER).unwrap(),
            "flow_control"
        );
    }

    #[test]
    fn test_http_result_header_on_every_code() {
        let adapter = HttpAdapter::default();
        for code in [
            ResultCode::MissingInput,
            ResultCode::BadInput,
            ResultCode::InternalServerError,
        ] {
            let mut task = Task::new();
            task.set_error(anyhow!("stop"), code).unwrap();

            let response = adapter.task_to_response(&task);
            let headers = response.as_http().unwrap().headers();
            assert_eq!(headers.get(RESULT_HEADER).unwrap(), code.as_str());
            assert!(headers.get(RETRY_AFTER).is_none());
        }
    }

    #[test]
    fn test_mqtt_result_code_flags() {
        let adapter = MqttAdapter::default();

        let mut bad = Task::new();
        bad.set_error(anyhow!("bad"), ResultCode::BadInput).unwrap();
        let response = adapter.task_to_response(&bad);
        let mqtt = response.as_mqtt().unwrap();
        assert!(mqtt.drop());
        assert!(!mqtt.disconnect());

        let mut internal = Task::new();
        internal
            .set_error(anyhow!("boom"), ResultCode::InternalServerError)
            .unwrap();
        let response = adapter.task_to_response(&internal);
        let mqtt = response.as_mqtt().unwrap();
        assert!(mqtt.drop());
        assert!(mqtt.disconnect());
    }

    #[test]
    fn test_mqtt_subscribe_task_keys() {
        let adapter = MqttAdapter::default();
        let request: ProtocolRequest = MqttRequest::new(
            "client-7",
            MqttPacket::Subscribe {
                topics: vec!["a/b".into(), "c/#".into()],
            },
        )
        .into();

        let task = adapter.request_to_task(&request).unwrap();
        assert_eq!(
            task.value("mqtt.packet_type").and_then(TaskValue::as_str),
            Some("subscribe")
        );
        assert_eq!(
            task.value("mqtt.topics").and_then(TaskValue::as_record),
            Some(&serde_json::json!(["a/b", "c/#"]))
        );
        assert!(task.value("mqtt.topic").is_none());
    }
}
