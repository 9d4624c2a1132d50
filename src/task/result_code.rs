//! Outcome classification attached to a finished [`Task`](super::Task).

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why processing stopped, or that it did not.
///
/// `Ok` is the only non-terminal code. Any other code halts the pipeline
/// invocation that observes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// Stage succeeded, no anomaly
    #[default]
    Ok,
    /// A required value was absent or of the wrong shape
    MissingInput,
    /// A value was present but malformed
    BadInput,
    /// An admission-control stage rejected the task on purpose
    FlowControl,
    /// A stage failed because of an internal processing fault
    InternalServerError,
}

/// Coarse class a [`ResultCode`] is surfaced as by protocol adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultClass {
    Success,
    ClientError,
    ServiceUnavailable,
    ServerError,
}

impl ResultCode {
    pub const ALL: [ResultCode; 5] = [
        ResultCode::Ok,
        ResultCode::MissingInput,
        ResultCode::BadInput,
        ResultCode::FlowControl,
        ResultCode::InternalServerError,
    ];

    /// Whether the pipeline must stop forwarding once this code is set.
    pub fn is_terminal(self) -> bool {
        self != ResultCode::Ok
    }

    pub fn class(self) -> ResultClass {
        match self {
            ResultCode::Ok => ResultClass::Success,
            ResultCode::MissingInput | ResultCode::BadInput => ResultClass::ClientError,
            ResultCode::FlowControl => ResultClass::ServiceUnavailable,
            ResultCode::InternalServerError => ResultClass::ServerError,
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self.class() {
            ResultClass::Success => StatusCode::OK,
            ResultClass::ClientError => StatusCode::BAD_REQUEST,
            ResultClass::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ResultClass::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::MissingInput => "missing_input",
            ResultCode::BadInput => "bad_input",
            ResultCode::FlowControl => "flow_control",
            ResultCode::InternalServerError => "internal_server_error",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
