/*!
 * Error types for the LoRaBridge device layer.
 */
use thiserror::Error;

/// Errors raised while decoding, encoding or commanding device fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No device is registered under the given symbol or name
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// No field is registered under the given symbol or name
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The packet ended before the field's payload
    #[error("Insufficient data for field '{field}': need {needed} bytes, {available} available")]
    InsufficientData {
        /// Field being decoded
        field: String,
        /// Payload length of the field
        needed: usize,
        /// Bytes left in the packet
        available: usize,
    },

    /// The outbound buffer cannot hold the field
    #[error("Insufficient capacity for field '{field}': need {needed} bytes, {available} available")]
    InsufficientCapacity {
        /// Field being encoded
        field: String,
        /// Bytes the field needs, symbol included
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// The field refused a commanded value
    #[error("Value rejected by field '{field}': {reason}")]
    Rejected {
        /// Field that was commanded
        field: String,
        /// Why the value was refused
        reason: String,
    },

    /// The field only reports values and cannot be commanded
    #[error("Field '{0}' is not settable")]
    NotSettable(String),

    /// Two registry entries share a symbol
    #[error("Duplicate symbol {symbol:#04x} in {registry}")]
    DuplicateSymbol {
        /// Registry being built
        registry: String,
        /// Symbol used twice
        symbol: u8,
    },

    /// Two registry entries share a name
    #[error("Duplicate name '{name}' in {registry}")]
    DuplicateName {
        /// Registry being built
        registry: String,
        /// Name used twice
        name: String,
    },

    /// A device description could not be turned into a device
    #[error("Invalid device catalog: {0}")]
    InvalidCatalog(String),
}

impl DeviceError {
    /// Create a new rejection error
    pub fn rejected<F: AsRef<str>, S: AsRef<str>>(field: F, reason: S) -> Self {
        DeviceError::Rejected {
            field: field.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        }
    }

    /// Create a new catalog error
    pub fn invalid_catalog<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::InvalidCatalog(msg.as_ref().to_string())
    }
}

impl From<lorabridge_core::error::Error> for DeviceError {
    fn from(err: lorabridge_core::error::Error) -> Self {
        DeviceError::InvalidCatalog(err.to_string())
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;
