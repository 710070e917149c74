//! Transport layer for servo bus protocols.
//!
//! A packet engine talking to bus-connected servos only needs to read and
//! write bytes and know how long a byte takes on the wire. This crate
//! provides that contract ([`transport::Transport`]) and its
//! implementations: a direct serial port and a tunnel through a
//! CAN-to-serial bridge running in transparent conversion mode.

pub mod config;
pub mod diag;
pub mod error;
pub mod tracing;
pub mod transport;

pub use error::{Error, Result};
pub use transport::{
    can::{CanTunnelConfig, CanTunnelTransport, FrameFormat},
    serial::SerialTransport,
    PacketTimer, Transport,
};
