/*!
 * LoRaBridge Devices
 *
 * This crate provides the binary field codec, the symbol/name registry and
 * the device model used by the LoRaBridge gateway.
 */

#![warn(missing_docs)]

pub mod catalog;
pub mod device;
pub mod error;
pub mod field;
pub mod manager;
pub mod packet;
pub mod registry;

pub use device::{DecodeOutcome, Device, TxPacket};
pub use error::{DeviceError, Result};
pub use field::{Acceptance, CommandAck, Field, FieldKind, Reading, TelemetryRecord, TxPhase};
pub use manager::{DecodedPacket, DeviceManager};
pub use registry::{Named, Registry};
