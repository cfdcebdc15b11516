/*!
 * JSON messages exchanged with the platform.
 */
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use lorabridge_devices::TelemetryRecord;

use crate::topics;

/// A message waiting to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination topic
    pub topic: String,
    /// JSON text
    pub payload: String,
}

impl OutboundMessage {
    /// Create a message from a JSON value
    pub fn json<S: Into<String>>(topic: S, value: &Value) -> Self {
        Self {
            topic: topic.into(),
            payload: value.to_string(),
        }
    }

    /// Parse the payload back into JSON
    pub fn payload_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.payload)
    }
}

/// A command for a device behind the gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayRequest {
    /// Device name
    pub device: String,
    /// Command body
    pub data: GatewayRequestData,
}

/// Body of a device command
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayRequestData {
    /// Field name
    pub method: String,
    /// Value to set
    #[serde(default)]
    pub params: Value,
    /// Correlation id, echoed in the reply
    #[serde(default)]
    pub id: Value,
}

/// Reply to a device command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayReply {
    /// Correlation id of the request
    pub id: Value,
    /// Device name
    pub device: String,
    /// Outcome
    pub data: ReplyData,
}

/// Outcome carried by a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplyData {
    /// Whether the command was accepted for delivery
    pub success: bool,
}

/// A command addressed to the gateway itself
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelfRequest {
    /// Command name
    pub method: String,
    /// Command argument
    #[serde(default)]
    pub params: Value,
}

/// Whether a gateway RPC message is one of our own replies
///
/// Replies travel on the same topic as requests; they carry `data.success`.
pub fn is_gateway_reply(value: &Value) -> bool {
    value
        .get("data")
        .and_then(|data| data.get("success"))
        .is_some()
}

/// Telemetry for one decoded packet
///
/// `{"<device>": [{<field>: value, ..., "RSSI": n, "SNR": n}]}`
pub fn telemetry(
    device: &str,
    mut record: TelemetryRecord,
    rssi: Option<i16>,
    snr: Option<f32>,
) -> OutboundMessage {
    if let Some(rssi) = rssi {
        record.insert("RSSI".to_string(), Value::from(rssi));
    }
    if let Some(snr) = snr {
        record.insert("SNR".to_string(), Value::from(snr));
    }

    let mut body = serde_json::Map::new();
    body.insert(device.to_string(), Value::Array(vec![Value::Object(record)]));
    OutboundMessage::json(topics::TELEMETRY, &Value::Object(body))
}

/// Announcement of a device behind the gateway
pub fn device_connect(device: &str) -> OutboundMessage {
    OutboundMessage::json(topics::DEVICE_CONNECT, &json!({ "device": device }))
}

/// A single client attribute of the gateway
pub fn attribute(key: &str, value: Value) -> OutboundMessage {
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), value);
    OutboundMessage::json(topics::ATTRIBUTES, &Value::Object(body))
}
