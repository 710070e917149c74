//! Direct serial port transport.
//!
//! The plain transport for servos wired to a USB-TTL or RS-485 adapter, and
//! the byte channel the CAN tunnel rides on.

use std::io::{self, Read, Write};

use tokio_serial::{ClearBuffer, SerialPort};

use super::{check_baud_rate, msec_per_byte, PortSettings, Transport, DEFAULT_BAUD_RATE};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Transport over a local serial device.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    msec_per_byte: f64,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a closed transport at [`DEFAULT_BAUD_RATE`].
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            msec_per_byte: msec_per_byte(DEFAULT_BAUD_RATE),
            port: None,
        }
    }

    /// Create a closed transport at `baud_rate`.
    pub fn with_baud_rate(port_name: impl Into<String>, baud_rate: u32) -> Result<Self> {
        let baud_rate = check_baud_rate(baud_rate)?;
        Ok(Self {
            baud_rate,
            msec_per_byte: msec_per_byte(baud_rate),
            ..Self::new(port_name)
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(Error::NotOpen {
                port: self.port_name.clone(),
            }),
        }
    }
}

// A zero read/write timeout surfaces "nothing to do right now" as one of
// these instead of blocking.
fn is_would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Transport for SerialTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open_with(&mut self, settings: &PortSettings) -> Result<()> {
        if self.is_open() {
            debug!(port = %self.port_name, "Port already open, reopening");
            self.close();
        }

        let port = tokio_serial::new(self.port_name.as_str(), self.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|source| Error::PortClaim {
                port: self.port_name.clone(),
                source,
            })?;

        port.clear(ClearBuffer::Input)?;
        self.port = Some(port);
        self.msec_per_byte = msec_per_byte(self.baud_rate);

        debug!(
            port = %self.port_name,
            baud = self.baud_rate,
            "Opened serial port"
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "Closed serial port");
        }
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let baud_rate = check_baud_rate(baud_rate)?;
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(baud_rate)?;
        }
        self.baud_rate = baud_rate;
        self.msec_per_byte = msec_per_byte(baud_rate);
        trace!(port = %self.port_name, baud = baud_rate, "Baud rate set");
        Ok(())
    }

    fn msec_per_byte(&self) -> f64 {
        self.msec_per_byte
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port_mut()?.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let port = self.port_mut()?;
        if max_len == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; max_len];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_would_block(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let port = self.port_mut()?;
        if bytes.is_empty() {
            return Ok(0);
        }

        match port.write(bytes) {
            Ok(n) => {
                if n < bytes.len() {
                    debug!(written = n, requested = bytes.len(), "Short write");
                }
                Ok(n)
            }
            Err(e) if is_would_block(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
