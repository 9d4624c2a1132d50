//! Protocol message pairs.
//!
//! Every protocol supplies a request and a response type. The pipeline and
//! generic plugins only use the [`Request`] / [`Response`] capability sets;
//! protocol-aware plugins match on [`ProtocolResponse`] to reach extended
//! controls such as the MQTT `drop` and `disconnect` flags.

use bytes::buf::Reader;
use bytes::{Buf, Bytes};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod adapter;
pub mod http;
pub mod mqtt;

pub use adapter::{create_adapter, AdapterKeys, HttpAdapter, MqttAdapter, ProtocolAdapter};
pub use self::http::{HttpRequest, HttpResponse};
pub use mqtt::{MqttPacket, MqttRequest, MqttResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Http,
    Mqtt,
}

impl ProtocolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::Http => "http",
            ProtocolKind::Mqtt => "mqtt",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid value for header '{0}'")]
    InvalidHeaderValue(String),
}

/// Generic header access. Values are exposed as strings.
pub trait Header: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ProtocolError>;
    fn add(&mut self, key: &str, value: &str) -> Result<(), ProtocolError>;
    fn del(&mut self, key: &str);
    fn keys(&self) -> Vec<String>;
}

pub trait Request: Send + Sync {
    fn protocol(&self) -> ProtocolKind;
    fn payload(&self) -> &[u8];
    fn header(&self) -> Option<&dyn Header>;
}

pub trait Response: Send + Sync {
    fn protocol(&self) -> ProtocolKind;

    /// Protocols without headers return `None`.
    fn header(&self) -> Option<&dyn Header>;
    fn header_mut(&mut self) -> Option<&mut dyn Header>;

    fn set_payload(&mut self, payload: Bytes);

    /// Cheap handle to the payload.
    fn payload(&self) -> Bytes;

    /// The payload as a slice; callers must not rely on it after `close`.
    fn raw_payload(&self) -> &[u8];

    fn payload_reader(&self) -> Reader<Bytes> {
        self.payload().reader()
    }

    fn payload_len(&self) -> usize {
        self.raw_payload().len()
    }

    /// Release held resources. Safe to call repeatedly, or when nothing was acquired.
    fn close(&mut self);
}

/// Closed set of inbound messages the engine understands.
#[derive(Debug, Clone)]
pub enum ProtocolRequest {
    Http(HttpRequest),
    Mqtt(MqttRequest),
}

impl ProtocolRequest {
    pub fn as_http(&self) -> Option<&HttpRequest> {
        match self {
            ProtocolRequest::Http(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_mqtt(&self) -> Option<&MqttRequest> {
        match self {
            ProtocolRequest::Mqtt(r) => Some(r),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Request {
        match self {
            ProtocolRequest::Http(r) => r,
            ProtocolRequest::Mqtt(r) => r,
        }
    }
}

impl Request for ProtocolRequest {
    fn protocol(&self) -> ProtocolKind {
        self.inner().protocol()
    }

    fn payload(&self) -> &[u8] {
        self.inner().payload()
    }

    fn header(&self) -> Option<&dyn Header> {
        self.inner().header()
    }
}

/// Closed set of responses the engine produces.
#[derive(Debug, Clone)]
pub enum ProtocolResponse {
    Http(HttpResponse),
    Mqtt(MqttResponse),
}

impl ProtocolResponse {
    pub fn as_http(&self) -> Option<&HttpResponse> {
        match self {
            ProtocolResponse::Http(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_http_mut(&mut self) -> Option<&mut HttpResponse> {
        match self {
            ProtocolResponse::Http(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_mqtt(&self) -> Option<&MqttResponse> {
        match self {
            ProtocolResponse::Mqtt(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_mqtt_mut(&mut self) -> Option<&mut MqttResponse> {
        match self {
            ProtocolResponse::Mqtt(r) => Some(r),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Response {
        match self {
            ProtocolResponse::Http(r) => r,
            ProtocolResponse::Mqtt(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Response {
        match self {
            ProtocolResponse::Http(r) => r,
            ProtocolResponse::Mqtt(r) => r,
        }
    }
}

impl Response for ProtocolResponse {
    fn protocol(&self) -> ProtocolKind {
        self.inner().protocol()
    }

    fn header(&self) -> Option<&dyn Header> {
        self.inner().header()
    }

    fn header_mut(&mut self) -> Option<&mut dyn Header> {
        self.inner_mut().header_mut()
    }

    fn set_payload(&mut self, payload: Bytes) {
        self.inner_mut().set_payload(payload)
    }

    fn payload(&self) -> Bytes {
        self.inner().payload()
    }

    fn raw_payload(&self) -> &[u8] {
        self.inner().raw_payload()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }
}

impl From<HttpRequest> for ProtocolRequest {
    fn from(request: HttpRequest) -> Self {
        ProtocolRequest::Http(request)
    }
}

impl From<MqttRequest> for ProtocolRequest {
    fn from(request: MqttRequest) -> Self {
        ProtocolRequest::Mqtt(request)
    }
}
