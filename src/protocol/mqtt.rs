use super::{Header, ProtocolKind, Request, Response};
use bytes::Bytes;

/// Control packets the gateway hands to pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttPacket {
    Connect,
    Publish {
        topic: String,
        payload: Bytes,
        qos: u8,
    },
    Subscribe {
        topics: Vec<String>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
    Disconnect,
}

impl MqttPacket {
    pub fn packet_type(&self) -> &'static str {
        match self {
            MqttPacket::Connect => "connect",
            MqttPacket::Publish { .. } => "publish",
            MqttPacket::Subscribe { .. } => "subscribe",
            MqttPacket::Unsubscribe { .. } => "unsubscribe",
            MqttPacket::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MqttRequest {
    client_id: String,
    packet: MqttPacket,
}

impl MqttRequest {
    pub fn new(client_id: impl Into<String>, packet: MqttPacket) -> Self {
        Self {
            client_id: client_id.into(),
            packet,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn packet(&self) -> &MqttPacket {
        &self.packet
    }

    /// Topic of a publish packet.
    pub fn topic(&self) -> Option<&str> {
        match &self.packet {
            MqttPacket::Publish { topic, .. } => Some(topic.as_str()),
            _ => None,
        }
    }

    /// Topics named by a subscribe or unsubscribe packet.
    pub fn topics(&self) -> &[String] {
        match &self.packet {
            MqttPacket::Subscribe { topics } | MqttPacket::Unsubscribe { topics } => {
                topics.as_slice()
            }
            _ => &[],
        }
    }
}

impl Request for MqttRequest {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Mqtt
    }

    fn payload(&self) -> &[u8] {
        match &self.packet {
            MqttPacket::Publish { payload, .. } => &payload[..],
            _ => &[],
        }
    }

    fn header(&self) -> Option<&dyn Header> {
        None
    }
}

/// MQTT response with its protocol-specific control flags.
#[derive(Debug, Clone, Default)]
pub struct MqttResponse {
    drop: bool,
    disconnect: bool,
    payload: Bytes,
}

impl MqttResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// The packet in context will be dropped.
    pub fn set_drop(&mut self) {
        self.drop = true;
    }

    /// Whether the packet in context will be dropped.
    ///
    /// For a subscribe packet this means the proxy must not subscribe the
    /// topics it names.
    pub fn drop(&self) -> bool {
        self.drop
    }

    /// The client connection will be terminated after this response is delivered.
    pub fn set_disconnect(&mut self) {
        self.disconnect = true;
    }

    pub fn disconnect(&self) -> bool {
        self.disconnect
    }
}

impl Response for MqttResponse {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Mqtt
    }

    fn header(&self) -> Option<&dyn Header> {
        None
    }

    fn header_mut(&mut self) -> Option<&mut dyn Header> {
        None
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

    fn close(&mut self) {}
}
