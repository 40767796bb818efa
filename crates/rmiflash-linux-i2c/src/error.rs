//! Error types for Linux I2C operations

use thiserror::Error;

/// Linux I2C specific errors
#[derive(Debug, Error)]
pub enum LinuxI2cError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind the slave address
    #[error("Failed to set slave address 0x{addr:02X}: {source}")]
    SetAddressFailed {
        addr: u16,
        #[source]
        source: std::io::Error,
    },

    /// I2C transfer failed
    #[error("I2C transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Fewer bytes were transferred than requested
    #[error("Short I2C transfer: {done} of {expected} bytes")]
    ShortTransfer { done: usize, expected: usize },

    /// The adapter completed only part of a combined transfer
    #[error("Combined I2C transfer stopped after {done} of {expected} messages")]
    IncompleteMessages { done: usize, expected: usize },

    /// F01 not found while looking for the reset register
    #[error("F01 not found in PDT")]
    NoDeviceControl,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Device not specified
    #[error("No device specified. Use dev=/dev/i2c-N")]
    NoDevice,
}

/// Result type for Linux I2C operations
pub type Result<T> = std::result::Result<T, LinuxI2cError>;
