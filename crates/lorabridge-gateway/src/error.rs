/*!
 * Error types for the LoRaBridge gateway crate.
 */
use thiserror::Error;

/// Error type for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    /// Device layer error
    #[error("Device error: {0}")]
    Device(#[from] lorabridge_devices::DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] lorabridge_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Radio transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new transport error
    pub fn transport<S: AsRef<str>>(msg: S) -> Self {
        Error::Transport(msg.as_ref().to_string())
    }
}
