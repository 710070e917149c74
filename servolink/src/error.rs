//! Common error types for servolink.
//!
//! This module provides a centralized Error enum using thiserror,
//! with conversions from underlying error types used throughout the crate.

use thiserror::Error;

/// Main error type for servolink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from the underlying channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The channel could not be claimed (busy, missing, permission denied)
    #[error("Failed to open port {port}: {source}")]
    PortClaim {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Read or write attempted while the transport is closed
    #[error("Port {port} is not open")]
    NotOpen { port: String },

    /// Baud rate not in the supported table
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// CAN identifier does not fit the selected frame format
    #[error("Invalid CAN ID 0x{id:X} for {format} frame")]
    InvalidCanId { id: u32, format: String },

    /// Packet value that does not fit in a byte
    #[error("Invalid packet value {value} at index {index}")]
    InvalidPacket { index: usize, value: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
