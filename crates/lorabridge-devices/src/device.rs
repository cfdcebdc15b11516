/*!
 * Remote devices for LoRaBridge.
 *
 * A device is one remote radio endpoint, addressed by a single-byte symbol and
 * owning a fixed set of fields. It turns report packets into telemetry and
 * collects its dirty settable fields into outbound set packets.
 */
use std::fmt;

use tracing::{debug, info};

use crate::error::Result;
use crate::field::{Field, TelemetryRecord};
use crate::packet::PacketBytes;
use crate::registry::{Named, Registry};

/// How much of a packet could be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Every symbol resolved and every payload was complete
    Complete,
    /// Some fields decoded before an unknown symbol or truncated payload
    Partial,
    /// Nothing decoded
    Empty,
}

impl fmt::Display for DecodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeOutcome::Complete => write!(f, "complete"),
            DecodeOutcome::Partial => write!(f, "partial"),
            DecodeOutcome::Empty => write!(f, "empty"),
        }
    }
}

/// A set packet ready for the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPacket {
    destination: u8,
    bytes: Vec<u8>,
    sent: Vec<(u8, i8)>,
}

impl TxPacket {
    /// Symbol of the device the packet is addressed to
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Packet payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no field needed sending
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `(field symbol, value)` pairs carried by the packet
    pub fn fields_sent(&self) -> &[(u8, i8)] {
        &self.sent
    }
}

/// A remote device and its fields
#[derive(Debug)]
pub struct Device {
    name: String,
    symbol: u8,
    fields: Registry<Field>,
}

impl Device {
    /// Create a device, rejecting duplicate field symbols or names
    pub fn new<S: Into<String>>(name: S, symbol: u8, fields: Vec<Field>) -> Result<Self> {
        let name = name.into();
        let fields = Registry::new(format!("fields of '{}'", name), fields)?;
        Ok(Self {
            name,
            symbol,
            fields,
        })
    }

    /// The device's fields in definition order
    pub fn fields(&self) -> &Registry<Field> {
        &self.fields
    }

    /// Look up a field by display name
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.find_by_name(name)
    }

    /// Look up a field by wire symbol
    pub fn field_by_symbol(&self, symbol: u8) -> Option<&Field> {
        self.fields.find_by_symbol(symbol)
    }

    /// Decode a report packet into telemetry
    ///
    /// Decoding stops at the first unknown symbol or truncated payload;
    /// whatever was decoded before it is returned.
    pub fn decode_packet(&self, bytes: &[u8]) -> (TelemetryRecord, DecodeOutcome) {
        let mut record = TelemetryRecord::new();
        let mut offset = 0;
        let mut decoded = 0;

        while offset < bytes.len() {
            let symbol = bytes[offset];
            let Some(field) = self.fields.find_by_symbol(symbol) else {
                info!(
                    "Device '{}' has no field with symbol {:#04x} at offset {}",
                    self.name, symbol, offset
                );
                break;
            };

            match field.decode(&bytes[offset + 1..], &mut record) {
                Ok(consumed) => {
                    offset += 1 + consumed;
                    decoded += 1;
                }
                Err(e) => {
                    info!("Stopped decoding packet from '{}': {}", self.name, e);
                    break;
                }
            }
        }

        let outcome = if bytes.is_empty() || decoded == 0 {
            DecodeOutcome::Empty
        } else if offset == bytes.len() {
            DecodeOutcome::Complete
        } else {
            DecodeOutcome::Partial
        };

        debug!(
            "Decoded {} field(s) from '{}' ({})",
            decoded, self.name, outcome
        );
        (record, outcome)
    }

    /// Whether any field owes a transmission
    pub fn has_pending_transmission(&self) -> bool {
        self.fields.iter().any(Field::is_dirty)
    }

    /// Number of fields owing a transmission
    pub fn pending_field_count(&self) -> usize {
        self.fields.iter().filter(|field| field.is_dirty()).count()
    }

    /// Collect every dirty field into one set packet of at most `max_len` bytes
    ///
    /// Fails without producing a packet if the dirty fields do not all fit;
    /// the fields stay dirty for the next attempt.
    pub fn generate_packet(&self, max_len: usize) -> Result<TxPacket> {
        let mut buf = vec![0u8; max_len];
        let mut len = 0;
        let mut sent = Vec::new();

        for field in &self.fields {
            if let Some((written, value)) = field.encode_pending(&mut buf[len..])? {
                len += written;
                sent.push((field.symbol(), value));
            }
        }

        buf.truncate(len);
        if !buf.is_empty() {
            debug!(
                "Generated packet for '{}': {}",
                self.name,
                PacketBytes(&buf)
            );
        }

        Ok(TxPacket {
            destination: self.symbol,
            bytes: buf,
            sent,
        })
    }

    /// Record that `packet` went out; its fields now await confirmation
    pub fn mark_sent(&self, packet: &TxPacket) {
        for &(symbol, value) in packet.fields_sent() {
            if let Some(field) = self.fields.find_by_symbol(symbol) {
                field.mark_sent(value);
            }
        }
    }
}

impl Named for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> u8 {
        self.symbol
    }
}
