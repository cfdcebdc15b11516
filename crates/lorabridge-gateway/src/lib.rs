/*!
 * LoRaBridge Gateway
 *
 * This crate connects the LoRa sensor network to a ThingsBoard-style MQTT
 * broker: the radio transports, the packet/message bridge, the transmit
 * scheduler and the tasks that tie them together.
 */

#![warn(missing_docs)]

pub mod alarm;
pub mod bridge;
pub mod context;
pub mod error;
pub mod listener;
pub mod message;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod queue;
pub mod scheduler;
pub mod simulate;
pub mod topics;
pub mod transport;

// Re-export main types for convenience
pub use alarm::AlarmState;
pub use bridge::{GatewayBridge, SelfCommand};
pub use context::{Activity, AppContext};
pub use error::{Error, Result};
pub use listener::RadioListener;
pub use message::OutboundMessage;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttLink;
pub use queue::PublishQueue;
pub use scheduler::{CycleReport, TransmitScheduler};
pub use transport::{LoopbackHandle, LoopbackRadio, Radio, RadioPacket, SharedRadio, UdpRadio};

/// LoRaBridge gateway crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
