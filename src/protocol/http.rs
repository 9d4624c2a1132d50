use super::{Header, ProtocolError, ProtocolKind, Request, Response};
use ::http::header::{HeaderName, HeaderValue};
use ::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;

impl Header for HeaderMap {
    fn get(&self, key: &str) -> Option<String> {
        HeaderMap::get(self, key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ProtocolError> {
        let (name, value) = parse_header(key, value)?;
        self.insert(name, value);
        Ok(())
    }

    fn add(&mut self, key: &str, value: &str) -> Result<(), ProtocolError> {
        let (name, value) = parse_header(key, value)?;
        self.append(name, value);
        Ok(())
    }

    fn del(&mut self, key: &str) {
        self.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        HeaderMap::keys(self).map(|k| k.as_str().to_string()).collect()
    }
}

fn parse_header(key: &str, value: &str) -> Result<(HeaderName, HeaderValue), ProtocolError> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|_| ProtocolError::InvalidHeaderName(key.to_string()))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| ProtocolError::InvalidHeaderValue(key.to_string()))?;
    Ok((name, value))
}

/// Inbound HTTP request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, ProtocolError> {
        Header::add(&mut self.headers, key, value)?;
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl Request for HttpRequest {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Http
    }

    fn payload(&self) -> &[u8] {
        &self.body
    }

    fn header(&self) -> Option<&dyn Header> {
        Some(&self.headers)
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    payload: Bytes,
    closed: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            payload: Bytes::new(),
            closed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Response for HttpResponse {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Http
    }

    fn header(&self) -> Option<&dyn Header> {
        Some(&self.headers)
    }

    fn header_mut(&mut self) -> Option<&mut dyn Header> {
        Some(&mut self.headers)
    }

    fn set_payload(&mut self, payload: Bytes) {
        self.payload = payload;
    }

    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    fn raw_payload(&self) -> &[u8] {
        &self.payload
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.payload = Bytes::new();
        self.closed = true;
    }
}
