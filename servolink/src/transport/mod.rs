//! Physical transport layer for servo buses.
//!
//! A transport owns a serial-like byte channel and knows nothing about
//! packets. The protocol engine above it writes whole packets, polls for
//! reply bytes, and sizes its timeouts from [`Transport::msec_per_byte`].
//!
//! Implementations:
//! - [`serial::SerialTransport`]: a local serial port (USB-TTL, RS-485)
//! - [`can::CanTunnelTransport`]: a CAN bus reached through a
//!   CAN-to-serial bridge in transparent conversion mode
//! - [`mock::MockTransport`]: in-memory channel for tests

use std::time::Duration;

use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

use crate::config::TransportConfig;
use crate::error::{Error, Result};

pub mod can;
pub mod mock;
pub mod serial;
mod timing;

pub use timing::{PacketTimer, LATENCY_TIMER_MS};

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Baud rates a transport accepts.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 500_000, 576_000, 921_600,
    1_000_000, 1_152_000, 2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// Bit times per byte on the wire: start bit, 8 data bits, stop bit.
const BITS_PER_BYTE: f64 = 10.0;

/// Milliseconds needed to transmit one byte at `baud_rate`.
///
/// The protocol engine multiplies this by packet lengths to build its
/// timeout windows, so every transport must use exactly this value.
pub fn msec_per_byte(baud_rate: u32) -> f64 {
    (1000.0 / baud_rate as f64) * BITS_PER_BYTE
}

/// Check a baud rate against [`SUPPORTED_BAUD_RATES`].
pub fn check_baud_rate(baud_rate: u32) -> Result<u32> {
    if SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        Ok(baud_rate)
    } else {
        Err(Error::UnsupportedBaudRate(baud_rate))
    }
}

/// Line settings applied when a channel is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// How long a read may wait for data. Zero makes reads non-blocking.
    pub read_timeout: Duration,
}

impl PortSettings {
    /// 8 data bits, no parity, 1 stop bit, non-blocking reads.
    pub const fn eight_n_one() -> Self {
        Self {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout: Duration::ZERO,
        }
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self::eight_n_one()
    }
}

/// Byte channel consumed by a servo protocol engine.
///
/// Every I/O method is non-blocking: reads return whatever is buffered
/// (possibly nothing) and writes hand bytes to the driver immediately.
/// Callers poll and account for time themselves, usually with a
/// [`PacketTimer`] from [`Transport::packet_timer`].
///
/// Reads and writes on a closed transport fail with [`Error::NotOpen`] and
/// touch no hardware.
pub trait Transport: Send {
    /// Name of the underlying channel, e.g. `/dev/ttyUSB0`.
    fn port_name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Claim the channel with the given line settings.
    ///
    /// An already open channel is closed first and fully set up again.
    fn open_with(&mut self, settings: &PortSettings) -> Result<()>;

    /// Claim the channel with 8N1 non-blocking settings.
    fn open(&mut self) -> Result<()> {
        self.open_with(&PortSettings::eight_n_one())
    }

    /// Release the channel. Does nothing if already closed.
    fn close(&mut self);

    fn baud_rate(&self) -> u32;

    /// Change the baud rate and recompute [`Transport::msec_per_byte`].
    ///
    /// On a closed transport the rate is recorded and applied by the next
    /// open. Unsupported rates leave the previous rate in force.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Milliseconds to transmit one byte at the current baud rate.
    fn msec_per_byte(&self) -> f64;

    /// Number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Discard pending input.
    fn clear_input(&mut self) -> Result<()>;

    /// Read up to `max_len` bytes without waiting.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>>;

    /// Write `bytes`, returning how many the driver accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Start the timeout window for a reply of `packet_len` bytes.
    fn packet_timer(&self, packet_len: usize) -> PacketTimer {
        PacketTimer::for_packet(self.msec_per_byte(), packet_len)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn open_with(&mut self, settings: &PortSettings) -> Result<()> {
        (**self).open_with(settings)
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        (**self).set_baud_rate(baud_rate)
    }

    fn msec_per_byte(&self) -> f64 {
        (**self).msec_per_byte()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        (**self).read(max_len)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        (**self).write(bytes)
    }

    fn packet_timer(&self, packet_len: usize) -> PacketTimer {
        (**self).packet_timer(packet_len)
    }
}

/// Build the transport described by `config`.
///
/// The returned transport is closed; call [`Transport::open`] on it.
pub fn create_transport(config: &TransportConfig) -> Result<Box<dyn Transport>> {
    match config {
        TransportConfig::Serial(cfg) => {
            let transport = serial::SerialTransport::with_baud_rate(&cfg.port, cfg.baud_rate)?;
            Ok(Box::new(transport))
        }
        TransportConfig::CanTunnel(cfg) => {
            let transport = can::CanTunnelTransport::serial(cfg)?;
            Ok(Box::new(transport))
        }
    }
}
