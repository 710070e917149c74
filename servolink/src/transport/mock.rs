//! Mock transport for testing.
//!
//! Behaves like an always-present serial port backed by memory. Tests keep
//! a [`MockHandle`] to feed received bytes and inspect what was written after
//! the transport itself has been moved into a wrapper such as the CAN tunnel.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_baud_rate, msec_per_byte, PortSettings, Transport, DEFAULT_BAUD_RATE};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    fail_open: bool,
    fail_clear: bool,
    open_count: usize,
    close_count: usize,
    io_calls: usize,
    last_settings: Option<PortSettings>,
    written: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
}

/// In-memory transport.
pub struct MockTransport {
    port_name: String,
    baud_rate: u32,
    msec_per_byte: f64,
    state: Arc<Mutex<MockState>>,
}

/// Inspection and injection handle for a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(port_name: impl Into<String>) -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let transport = Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            msec_per_byte: msec_per_byte(DEFAULT_BAUD_RATE),
            state: state.clone(),
        };
        (transport, MockHandle { state })
    }

    fn not_open(&self) -> Error {
        Error::NotOpen {
            port: self.port_name.clone(),
        }
    }
}

impl MockHandle {
    /// Queue bytes as if the device had sent them.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Every successful write, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Reads, writes, and buffer operations that reached the open channel.
    pub fn io_calls(&self) -> usize {
        self.state.lock().io_calls
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Times an open channel was released.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn last_settings(&self) -> Option<PortSettings> {
        self.state.lock().last_settings
    }

    /// Make subsequent opens fail as if the device were missing.
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Make `clear_input` fail while open.
    pub fn set_fail_clear(&self, fail: bool) {
        self.state.lock().fail_clear = fail;
    }
}

impl Transport for MockTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn open_with(&mut self, settings: &PortSettings) -> Result<()> {
        self.close();

        let mut state = self.state.lock();
        if state.fail_open {
            return Err(Error::PortClaim {
                port: self.port_name.clone(),
                source: tokio_serial::Error::new(
                    tokio_serial::ErrorKind::NoDevice,
                    "mock port unavailable",
                ),
            });
        }
        state.open = true;
        state.open_count += 1;
        state.last_settings = Some(*settings);
        self.msec_per_byte = msec_per_byte(self.baud_rate);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            state.close_count += 1;
        }
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = check_baud_rate(baud_rate)?;
        self.msec_per_byte = msec_per_byte(baud_rate);
        Ok(())
    }

    fn msec_per_byte(&self) -> f64 {
        self.msec_per_byte
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(self.not_open());
        }
        state.io_calls += 1;
        Ok(state.rx.len())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(self.not_open());
        }
        state.io_calls += 1;
        if state.fail_clear {
            return Err(Error::Io(io::Error::other("mock flush failed")));
        }
        state.rx.clear();
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(self.not_open());
        }
        state.io_calls += 1;
        let n = max_len.min(state.rx.len());
        Ok(state.rx.drain(..n).collect())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(self.not_open());
        }
        state.io_calls += 1;
        state.written.push(bytes.to_vec());
        Ok(bytes.len())
    }
}
