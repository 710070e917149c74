//! CAN bus tunnel through a CAN-to-serial bridge.
//!
//! The bridge runs in transparent conversion mode: bytes written to its
//! serial side leave as CAN frame payloads with a fixed identifier, and
//! payloads received from the bus come back as plain serial bytes. The host
//! never builds CAN frames, so this transport is a thin layer over a serial
//! transport that
//! - opens the line with the framing the bridge expects (8N1, non-blocking),
//! - optionally hex-dumps traffic,
//! - tells the operator how the bridge must be configured.
//!
//! A CAN payload holds 8 bytes. Longer packets are written in one piece and
//! the bridge splits and reassembles them. Whether a given bridge preserves
//! order across frames is not something this side can observe.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::serial::SerialTransport;
use super::{PortSettings, Transport, DEFAULT_BAUD_RATE};
use crate::diag::{self, Direction};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

mod bridge;

pub use bridge::{BridgeInstructions, BridgeSettings};

/// Identifier the bridge ships with.
pub const DEFAULT_CAN_ID: u32 = 0x60;

/// CAN bus bit rate matching the bridge's factory setting.
pub const DEFAULT_CAN_BAUD_RATE: u32 = 1_000_000;

/// Payload bytes in one classic CAN frame.
pub const CAN_MAX_PAYLOAD: usize = 8;

/// Line settings the bridge requires in transparent mode.
const BRIDGE_LINE: PortSettings = PortSettings::eight_n_one();

/// Width of the CAN identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FrameFormat {
    /// 11-bit identifier
    #[default]
    Standard,
    /// 29-bit identifier
    Extended,
}

impl FrameFormat {
    pub fn from_extended(extended: bool) -> Self {
        if extended {
            Self::Extended
        } else {
            Self::Standard
        }
    }

    pub fn max_id(self) -> u32 {
        match self {
            Self::Standard => 0x7FF,
            Self::Extended => 0x1FFF_FFFF,
        }
    }

    /// Label used by the bridge vendor tool.
    pub fn vendor_label(self) -> &'static str {
        match self {
            Self::Standard => "Standard Frame",
            Self::Extended => "Extended Frame",
        }
    }

    fn check_id(self, id: u32) -> Result<u32> {
        if id <= self.max_id() {
            Ok(id)
        } else {
            Err(Error::InvalidCanId {
                id,
                format: self.to_string(),
            })
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_can_id() -> u32 {
    DEFAULT_CAN_ID
}

fn default_can_baud_rate() -> u32 {
    DEFAULT_CAN_BAUD_RATE
}

/// Construction parameters for a [`CanTunnelTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanTunnelConfig {
    /// Serial device the bridge is attached to
    pub port: String,

    /// Host-side serial baud rate; the bridge's serial side must match
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_can_id")]
    pub can_id: u32,

    #[serde(default)]
    pub frame_format: FrameFormat,

    /// Bus bit rate, only reported to the operator
    #[serde(default = "default_can_baud_rate")]
    pub can_baud_rate: u32,

    #[serde(default)]
    pub diagnostics: bool,
}

impl Default for CanTunnelConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            can_id: DEFAULT_CAN_ID,
            frame_format: FrameFormat::Standard,
            can_baud_rate: DEFAULT_CAN_BAUD_RATE,
            diagnostics: false,
        }
    }
}

/// Convert a sequence of small integers into packet bytes.
///
/// Fails on the first value outside `0..=255`.
pub fn packet_from_values<I, V>(values: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = V>,
    V: TryInto<u8> + Copy + fmt::Display,
{
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            value.try_into().map_err(|_| Error::InvalidPacket {
                index,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Transport that reaches servos on a CAN bus through a transparent
/// CAN-to-serial bridge.
pub struct CanTunnelTransport<T = SerialTransport> {
    base: T,
    can_id: u32,
    frame_format: FrameFormat,
    can_baud_rate: u32,
    diagnostics: bool,
    // Reserved for reassembly should a bridge ever deliver fragments;
    // transparent mode hands over complete byte streams.
    recv_buffer: Vec<u8>,
}

impl CanTunnelTransport<SerialTransport> {
    /// Tunnel over a local serial port, configured from `config`.
    pub fn serial(config: &CanTunnelConfig) -> Result<Self> {
        let base = SerialTransport::with_baud_rate(&config.port, config.baud_rate)?;
        Self::with_config(base, config)
    }
}

impl<T: Transport> CanTunnelTransport<T> {
    /// Wrap `base`, which must be closed or will be reopened on [`Transport::open`].
    pub fn new(base: T, can_id: u32, frame_format: FrameFormat, can_baud_rate: u32) -> Result<Self> {
        let can_id = frame_format.check_id(can_id)?;
        Ok(Self {
            base,
            can_id,
            frame_format,
            can_baud_rate,
            diagnostics: false,
            recv_buffer: Vec::new(),
        })
    }

    /// Wrap `base` using the CAN side of `config`. The port name and baud
    /// rate in `config` are ignored; they belong to `base`.
    pub fn with_config(base: T, config: &CanTunnelConfig) -> Result<Self> {
        let mut transport =
            Self::new(base, config.can_id, config.frame_format, config.can_baud_rate)?;
        transport.set_diagnostics(config.diagnostics);
        Ok(transport)
    }

    pub fn can_id(&self) -> u32 {
        self.can_id
    }

    pub fn frame_format(&self) -> FrameFormat {
        self.frame_format
    }

    pub fn can_baud_rate(&self) -> u32 {
        self.can_baud_rate
    }

    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    /// Mirror subsequent writes and non-empty reads as hex dumps.
    pub fn set_diagnostics(&mut self, enable: bool) {
        self.diagnostics = enable;
    }

    pub fn base(&self) -> &T {
        &self.base
    }

    pub fn into_inner(self) -> T {
        self.base
    }

    /// What the bridge must be set to for this transport to work.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            can_baud_rate: self.can_baud_rate,
            serial_baud_rate: self.base.baud_rate(),
            can_id: self.can_id,
            frame_format: self.frame_format,
        }
    }

    /// Setup instructions for the operator configuring the bridge.
    pub fn describe_bridge_configuration(&self) -> BridgeInstructions {
        BridgeInstructions::new(self.bridge_settings())
    }

    /// Write a packet given as small integers, e.g. a `Vec<u16>` built by a
    /// protocol engine.
    pub fn write_values<I, V>(&mut self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: TryInto<u8> + Copy + fmt::Display,
    {
        self.ensure_open()?;
        let packet = packet_from_values(values)?;
        self.write(&packet)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.base.is_open() {
            Ok(())
        } else {
            Err(Error::NotOpen {
                port: self.base.port_name().to_string(),
            })
        }
    }

    fn log_configuration(&self) {
        info!(
            port = %self.base.port_name(),
            serial_baud = self.base.baud_rate(),
            can_id = %format!("0x{:X}", self.can_id),
            frame = %self.frame_format,
            can_baud = self.can_baud_rate,
            "CAN tunnel open; the bridge must be configured with these settings"
        );
    }
}

impl<T: Transport> Transport for CanTunnelTransport<T> {
    fn port_name(&self) -> &str {
        self.base.port_name()
    }

    fn is_open(&self) -> bool {
        self.base.is_open()
    }

    fn open_with(&mut self, settings: &PortSettings) -> Result<()> {
        if *settings != BRIDGE_LINE {
            warn!(
                ?settings,
                "Bridge transparent mode requires 8N1 non-blocking; ignoring requested settings"
            );
        }

        if self.base.is_open() {
            self.close();
        }

        if let Err(e) = self.base.open_with(&BRIDGE_LINE) {
            warn!(port = %self.base.port_name(), error = %e, "Error opening port");
            return Err(e);
        }

        self.recv_buffer.clear();
        if let Err(e) = self.base.clear_input() {
            warn!(port = %self.base.port_name(), error = %e, "Error clearing input");
            self.base.close();
            return Err(e);
        }

        if self.diagnostics {
            self.log_configuration();
        }
        Ok(())
    }

    fn close(&mut self) {
        self.base.close();
        self.recv_buffer.clear();
    }

    fn baud_rate(&self) -> u32 {
        self.base.baud_rate()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.base.set_baud_rate(baud_rate)
    }

    fn msec_per_byte(&self) -> f64 {
        self.base.msec_per_byte()
    }

    fn bytes_available(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.base.bytes_available()
    }

    fn clear_input(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.recv_buffer.clear();
        self.base.clear_input()
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let data = self.base.read(max_len)?;
        if self.diagnostics && !data.is_empty() {
            diag::trace_traffic(self.base.port_name(), Direction::DeviceToHost, &data);
        }
        Ok(data)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        if bytes.is_empty() {
            return Ok(0);
        }

        if self.diagnostics {
            diag::trace_traffic(self.base.port_name(), Direction::HostToDevice, bytes);
            if bytes.len() > CAN_MAX_PAYLOAD {
                trace!(
                    len = bytes.len(),
                    frames = bytes.len().div_ceil(CAN_MAX_PAYLOAD),
                    "Packet spans several CAN frames; bridge splits it"
                );
            }
        }
        self.base.write(bytes)
    }
}
