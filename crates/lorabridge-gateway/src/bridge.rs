/*!
 * Translation between radio packets and platform messages.
 *
 * Uplink: a packet from a known device becomes one telemetry message.
 * Downlink: a device command marks a field dirty and is answered with an
 * "accepted" reply; the transmit scheduler delivers the value later.
 * Commands addressed to the gateway itself drive the alarm and restart.
 */
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

use lorabridge_devices::packet::PacketBytes;
use lorabridge_devices::{DecodeOutcome, Named};

use crate::alarm::AlarmState;
use crate::context::AppContext;
use crate::message::{self, GatewayReply, GatewayRequest, OutboundMessage, ReplyData, SelfRequest};
use crate::topics;
use crate::transport::RadioPacket;

/// How the gateway reaches the platform, reported in the version attribute
pub const CONNECTION_METHOD: &str = "mqtt";

/// A command addressed to the gateway itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfCommand {
    /// Alarm level change
    Alarm(AlarmState),
    /// Delayed restart
    Reset,
}

/// Translates between the radio and the platform
#[derive(Clone)]
pub struct GatewayBridge {
    ctx: Arc<AppContext>,
}

impl GatewayBridge {
    /// Create a bridge over the shared context
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Turn a received packet into telemetry
    ///
    /// Returns `None` if the sender is unknown. A packet that decodes to
    /// nothing is still published, carrying only its signal quality.
    pub fn handle_packet(&self, packet: &RadioPacket) -> Option<DecodeOutcome> {
        let decoded = match self
            .ctx
            .devices()
            .decode_packet(packet.sender, &packet.payload)
        {
            Ok(decoded) => decoded,
            Err(e) => {
                info!(
                    "Discarding packet {}: {}",
                    PacketBytes(&packet.payload),
                    e
                );
                return None;
            }
        };

        let name = decoded.device.name();
        match decoded.outcome {
            DecodeOutcome::Empty => {
                warn!(
                    "Could not decode any fields of packet {} from '{}'",
                    PacketBytes(&packet.payload),
                    name
                );
            }
            DecodeOutcome::Partial => info!(
                "Only part of packet {} from '{}' could be decoded",
                PacketBytes(&packet.payload),
                name
            ),
            DecodeOutcome::Complete => debug!("Decoded packet from '{}'", name),
        }

        self.ctx.queue().publish(message::telemetry(
            name,
            decoded.record,
            packet.rssi,
            packet.snr,
        ));
        Some(decoded.outcome)
    }

    /// Route a message received from the broker
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let max_len = self.ctx.config().get().gateway.max_message_len;
        if payload.len() >= max_len {
            warn!(
                "Got a {} byte message on '{}', longer than the {} supported. Discarding",
                payload.len(),
                topic,
                max_len
            );
            return;
        }

        debug!(
            "MQTT message on '{}': {}",
            topic,
            String::from_utf8_lossy(payload)
        );

        if topic.starts_with(topics::RPC_GATEWAY) {
            self.handle_gateway_command(payload);
        } else if topic.starts_with(topics::RPC_ME) {
            match topics::request_id(topic) {
                Some(request_id) => {
                    self.handle_self_command(request_id, payload);
                }
                None => warn!("No request id in topic '{}'. Discarding", topic),
            }
        } else {
            debug!("Ignoring message on unrelated topic '{}'", topic);
        }
    }

    /// Apply a command for a device behind the gateway
    ///
    /// Returns the reply that was queued, or `None` if the command was
    /// discarded without a reply.
    pub fn handle_gateway_command(&self, payload: &[u8]) -> Option<GatewayReply> {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not parse gateway command: {}. Discarding", e);
                return None;
            }
        };

        if message::is_gateway_reply(&value) {
            trace!("Ignoring our own reply on the gateway RPC topic");
            return None;
        }

        let request: GatewayRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed gateway command: {}. Discarding", e);
                return None;
            }
        };

        let Some(device) = self.ctx.devices().find_by_name(&request.device) else {
            info!("Device '{}' not recognised. Discarding", request.device);
            return None;
        };

        let Some(field) = device.field_by_name(&request.data.method) else {
            info!(
                "Device '{}' has no field '{}'. Discarding",
                request.device, request.data.method
            );
            return None;
        };

        let success = match field.handle_command(&request.data.params) {
            Ok(ack) => {
                info!(
                    "Accepted '{}' = {} for '{}'",
                    request.data.method, ack.value, request.device
                );
                true
            }
            Err(e) => {
                info!("Refused command for '{}': {}", request.device, e);
                false
            }
        };

        let reply = GatewayReply {
            id: request.data.id,
            device: request.device,
            data: ReplyData { success },
        };

        match serde_json::to_value(&reply) {
            Ok(body) => {
                self.ctx
                    .queue()
                    .publish(OutboundMessage::json(topics::RPC_GATEWAY, &body));
            }
            Err(e) => warn!("Could not serialize reply: {}", e),
        }

        Some(reply)
    }

    /// Apply a command addressed to the gateway itself
    ///
    /// Recognised commands are answered with `{}` on the reply topic for
    /// `request_id`.
    pub fn handle_self_command(&self, request_id: &str, payload: &[u8]) -> Option<SelfCommand> {
        let request: SelfRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Could not parse gateway request: {}. Discarding", e);
                return None;
            }
        };

        let command = match request.method.as_str() {
            "alarm" => {
                let state = AlarmState::from_severity(request.params.as_str());
                info!("Alarm level {} requested", state);
                self.ctx.set_alarm(state);
                SelfCommand::Alarm(state)
            }
            "reset" => {
                info!(
                    "Reset requested, restarting in {:?}",
                    self.ctx.config().get().gateway.restart_delay()
                );
                SelfCommand::Reset
            }
            other => {
                info!("Unrecognised method '{}' for the gateway", other);
                return None;
            }
        };

        self.ctx.queue().publish(OutboundMessage::json(
            topics::rpc_me_response(request_id),
            &json!({}),
        ));

        if command == SelfCommand::Reset {
            self.schedule_restart();
        }

        Some(command)
    }

    fn schedule_restart(&self) {
        let ctx = self.ctx.clone();
        let delay = ctx.config().get().gateway.restart_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!("Restarting after reset request");
            ctx.request_restart();
        });
    }

    /// Announce every device to the platform
    pub fn announce_devices(&self) {
        for device in self.ctx.devices().devices() {
            debug!("Announcing device '{}'", device.name());
            self.ctx
                .queue()
                .publish(message::device_connect(device.name()));
        }
    }

    /// Publish a client attribute of the gateway
    pub fn set_attribute(&self, key: &str, value: Value) {
        self.ctx.queue().publish(message::attribute(key, value));
    }

    /// Publish the gateway version attribute
    pub fn announce_version(&self) {
        self.set_attribute(
            "version",
            json!({
                "version": lorabridge_core::VERSION,
                "method": CONNECTION_METHOD,
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }),
        );
    }
}
