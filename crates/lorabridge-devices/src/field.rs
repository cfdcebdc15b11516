/*!
 * Field codec for LoRaBridge.
 *
 * A field is the smallest unit on the wire: a symbol byte followed by a fixed
 * number of payload bytes determined by the field's kind. Report fields only
 * decode. Settable fields additionally hold the value an operator asked for
 * (pending) and the value the remote last reported (observed); while they
 * differ the field is dirty and owed a transmission.
 */
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Number, Value};
use tracing::{debug, trace};

use crate::error::{DeviceError, Result};
use crate::packet::write_symbol;
use crate::registry::Named;

/// Decoded telemetry for one packet, keyed by field name
pub type TelemetryRecord = Map<String, Value>;

/// The closed set of wire encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 1-byte unsigned integer
    Byte,
    /// 1-byte signed value in tenths
    TenthsByte,
    /// 2-byte little-endian signed value in tenths
    Tenths,
    /// 2-byte little-endian count of half seconds, reported in seconds
    HalfSeconds,
    /// 2-byte little-endian unsigned integer
    UInt,
    /// 4-byte little-endian unsigned integer
    LongUInt,
    /// Presence flag with no payload
    Flag,
    /// 1-byte signed integer that can be commanded
    SettableByte,
    /// Presence flag that can be commanded
    SettableFlag,
}

const KIND_NAMES: [(FieldKind, &str); 9] = [
    (FieldKind::Byte, "byte"),
    (FieldKind::TenthsByte, "tenths_byte"),
    (FieldKind::Tenths, "tenths"),
    (FieldKind::HalfSeconds, "half_seconds"),
    (FieldKind::UInt, "uint"),
    (FieldKind::LongUInt, "long_uint"),
    (FieldKind::Flag, "flag"),
    (FieldKind::SettableByte, "settable_byte"),
    (FieldKind::SettableFlag, "settable_flag"),
];

impl FieldKind {
    /// Payload bytes following the symbol
    pub const fn encoded_length(self) -> usize {
        match self {
            FieldKind::Flag | FieldKind::SettableFlag => 0,
            FieldKind::Byte | FieldKind::TenthsByte | FieldKind::SettableByte => 1,
            FieldKind::Tenths | FieldKind::HalfSeconds | FieldKind::UInt => 2,
            FieldKind::LongUInt => 4,
        }
    }

    /// Whether fields of this kind accept commands
    pub const fn is_settable(self) -> bool {
        matches!(self, FieldKind::SettableByte | FieldKind::SettableFlag)
    }

    /// Configuration name of the kind
    pub fn as_str(self) -> &'static str {
        KIND_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Interpret a payload that is at least `encoded_length` bytes long
    fn read(self, payload: &[u8]) -> Reading {
        match self {
            FieldKind::Byte => Reading::Integer(i64::from(payload[0])),
            FieldKind::TenthsByte => Reading::Tenths(i64::from(payload[0] as i8)),
            FieldKind::Tenths => {
                Reading::Tenths(i64::from(i16::from_le_bytes([payload[0], payload[1]])))
            }
            FieldKind::HalfSeconds => {
                Reading::Tenths(i64::from(u16::from_le_bytes([payload[0], payload[1]])) * 5)
            }
            FieldKind::UInt => Reading::Integer(i64::from(u16::from_le_bytes([
                payload[0], payload[1],
            ]))),
            FieldKind::LongUInt => Reading::Integer(i64::from(u32::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ]))),
            FieldKind::SettableByte => Reading::Integer(i64::from(payload[0] as i8)),
            FieldKind::Flag | FieldKind::SettableFlag => Reading::Present,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        KIND_NAMES
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| DeviceError::invalid_catalog(format!("Unknown field kind '{}'", s)))
    }
}

/// A decoded field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Plain integer
    Integer(i64),
    /// Fixed-point value, ten times the reported number
    Tenths(i64),
    /// Flag present
    Present,
}

impl Reading {
    /// JSON form used in telemetry
    pub fn to_json(self) -> Value {
        match self {
            Reading::Integer(value) => Value::from(value),
            Reading::Present => Value::from(1),
            Reading::Tenths(_) => {
                // Text is built digit by digit, so the parsed float is the
                // nearest double to an exact one-decimal number.
                let text = self.to_string();
                text.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::String(text))
            }
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Integer(value) => write!(f, "{}", value),
            Reading::Present => f.write_str("1"),
            Reading::Tenths(tenths) => {
                let sign = if *tenths < 0 { "-" } else { "" };
                let magnitude = tenths.unsigned_abs();
                write!(f, "{}{}.{}", sign, magnitude / 10, magnitude % 10)
            }
        }
    }
}

/// Acceptance predicate for commanded values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Acceptance {
    min: Option<i64>,
    max: Option<i64>,
}

impl Acceptance {
    /// Accept every value the encoding can carry
    pub const fn any() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Accept values within the inclusive bounds; a missing bound is open
    pub const fn range(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    /// Explain why `value` is not acceptable, if it is not
    pub fn check(&self, value: i64) -> std::result::Result<(), String> {
        if let Some(min) = self.min {
            if value < min {
                return Err(format!("{} is below the minimum of {}", value, min));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(format!("{} is above the maximum of {}", value, max));
            }
        }
        Ok(())
    }
}

/// Transmission phase of a settable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxPhase {
    /// Nothing owed to the remote
    #[default]
    Clean,
    /// Operator value accepted but not yet sent
    Dirty,
    /// Sent; waiting for the remote to report it back
    AwaitingConfirmation,
}

/// Outcome of an accepted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    /// The new pending value
    pub value: i8,
    /// Whether the field now owes a transmission
    pub dirty: bool,
}

#[derive(Debug, Default)]
struct SettableState {
    pending: Option<i8>,
    observed: Option<i8>,
    phase: TxPhase,
}

impl SettableState {
    fn is_dirty(&self) -> bool {
        self.pending.is_some() && self.pending != self.observed
    }

    fn refresh(&mut self) {
        if !self.is_dirty() {
            self.phase = TxPhase::Clean;
        } else if self.phase == TxPhase::Clean {
            self.phase = TxPhase::Dirty;
        }
    }

    fn set_pending(&mut self, value: Option<i8>) {
        self.pending = value;
        self.phase = if self.is_dirty() {
            TxPhase::Dirty
        } else {
            TxPhase::Clean
        };
    }

    fn observe(&mut self, value: i8) {
        self.observed = Some(value);
        self.refresh();
    }

    /// A flag report closes out the request; the next command re-arms it
    fn confirm_flag(&mut self) {
        self.pending = None;
        self.observed = None;
        self.phase = TxPhase::Clean;
    }

    fn mark_sent(&mut self, value: i8) {
        if self.is_dirty() && self.pending == Some(value) {
            self.phase = TxPhase::AwaitingConfirmation;
        }
    }
}

/// A named, symbol-tagged wire field
#[derive(Debug)]
pub struct Field {
    name: String,
    symbol: u8,
    kind: FieldKind,
    acceptance: Acceptance,
    state: Mutex<SettableState>,
}

impl Field {
    /// Create a new field
    pub fn new<S: Into<String>>(name: S, symbol: u8, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            symbol,
            kind,
            acceptance: Acceptance::any(),
            state: Mutex::new(SettableState::default()),
        }
    }

    /// Restrict the values commands may set
    pub fn with_acceptance(mut self, acceptance: Acceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// The field's encoding
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Payload bytes following the symbol
    pub fn encoded_length(&self) -> usize {
        self.kind.encoded_length()
    }

    /// Whether the field accepts commands
    pub fn is_settable(&self) -> bool {
        self.kind.is_settable()
    }

    /// The acceptance predicate for commands
    pub fn acceptance(&self) -> Acceptance {
        self.acceptance
    }

    fn state(&self) -> MutexGuard<'_, SettableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode this field's payload and add it to `out`
    ///
    /// `payload` starts just after the symbol byte. Returns the payload bytes
    /// consumed. Nothing is written when the payload is too short.
    pub fn decode(&self, payload: &[u8], out: &mut TelemetryRecord) -> Result<usize> {
        let needed = self.encoded_length();
        if payload.len() < needed {
            return Err(DeviceError::InsufficientData {
                field: self.name.clone(),
                needed,
                available: payload.len(),
            });
        }

        let reading = self.kind.read(&payload[..needed]);
        trace!("Decoded field '{}' as {}", self.name, reading);

        match self.kind {
            FieldKind::SettableByte => self.state().observe(payload[0] as i8),
            FieldKind::SettableFlag => self.state().confirm_flag(),
            _ => {}
        }

        out.insert(self.name.clone(), reading.to_json());
        Ok(needed)
    }

    /// Encode the pending value as a set command into `buf`
    ///
    /// Returns the bytes written, symbol included. Fields that are not
    /// settable, or not dirty, write nothing.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.encode_pending(buf)?.map_or(0, |(written, _)| written))
    }

    /// Like `encode`, also reporting the value that was written
    pub(crate) fn encode_pending(&self, buf: &mut [u8]) -> Result<Option<(usize, i8)>> {
        if !self.is_settable() {
            return Ok(None);
        }

        let state = self.state();
        let value = match state.pending {
            Some(value) if state.is_dirty() => value,
            _ => return Ok(None),
        };

        let needed = self.encoded_length() + 1;
        if buf.len() < needed {
            return Err(DeviceError::InsufficientCapacity {
                field: self.name.clone(),
                needed,
                available: buf.len(),
            });
        }

        buf[0] = write_symbol(self.symbol);
        if self.kind == FieldKind::SettableByte {
            buf[1] = value as u8;
        }

        Ok(Some((needed, value)))
    }

    /// Apply an operator command
    ///
    /// Integers, numeric strings and booleans (as 1/0) are accepted. For
    /// settable flags a non-zero value arms the flag and zero disarms it.
    pub fn handle_command(&self, params: &Value) -> Result<CommandAck> {
        if !self.is_settable() {
            return Err(DeviceError::NotSettable(self.name.clone()));
        }

        let candidate = self.candidate(params)?;

        let mut state = self.state();
        let value = if self.kind == FieldKind::SettableFlag {
            let armed = candidate != 0;
            state.set_pending(armed.then_some(1));
            i8::from(armed)
        } else {
            let value = i8::try_from(candidate).map_err(|_| {
                DeviceError::rejected(&self.name, format!("{} does not fit in one byte", candidate))
            })?;
            self.acceptance
                .check(candidate)
                .map_err(|reason| DeviceError::rejected(&self.name, reason))?;
            state.set_pending(Some(value));
            value
        };

        let dirty = state.is_dirty();
        debug!(
            "Field '{}' pending value set to {} (dirty: {})",
            self.name, value, dirty
        );

        Ok(CommandAck { value, dirty })
    }

    fn candidate(&self, params: &Value) -> Result<i64> {
        match params {
            Value::Bool(flag) => Ok(i64::from(*flag)),
            Value::Number(number) => number.as_i64().ok_or_else(|| {
                DeviceError::rejected(&self.name, format!("{} is not an integer", number))
            }),
            Value::String(text) => text.trim().parse::<i64>().map_err(|_| {
                DeviceError::rejected(&self.name, format!("'{}' is not an integer", text))
            }),
            other => Err(DeviceError::rejected(
                &self.name,
                format!("expected an integer or boolean, got {}", other),
            )),
        }
    }

    /// Whether the field owes a transmission
    pub fn is_dirty(&self) -> bool {
        self.is_settable() && self.state().is_dirty()
    }

    /// Current transmission phase
    pub fn phase(&self) -> TxPhase {
        self.state().phase
    }

    /// Value the operator last asked for
    pub fn pending(&self) -> Option<i8> {
        self.state().pending
    }

    /// Value the remote last reported
    pub fn observed(&self) -> Option<i8> {
        self.state().observed
    }

    /// Record that `value` went out over the radio
    ///
    /// Ignored if the pending value changed since it was encoded.
    pub fn mark_sent(&self, value: i8) {
        self.state().mark_sent(value);
    }
}

impl Named for Field {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> u8 {
        self.symbol
    }
}
