//! Configuration management for servolink.
//!
//! Transports are described in TOML and may be adjusted through environment
//! variables:
//!
//! ```toml
//! [transport]
//! kind = "can-tunnel"
//! port = "/dev/ttyUSB0"
//! baud_rate = 57600
//! can_id = 0x60
//! frame_format = "standard"
//! ```
//!
//! - `SERVOLINK_PORT` replaces the port name
//! - `SERVOLINK_DIAGNOSTICS` (`1`/`true`/`0`/`false`) toggles traffic dumps
//!   on a CAN tunnel

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::transport::{can::CanTunnelConfig, DEFAULT_BAUD_RATE};

/// Environment variable overriding the port name.
pub const ENV_PORT: &str = "SERVOLINK_PORT";

/// Environment variable toggling diagnostics.
pub const ENV_DIAGNOSTICS: &str = "SERVOLINK_DIAGNOSTICS";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub transport: TransportConfig,
}

/// Which transport to build and how.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Servos wired directly to a serial adapter
    Serial(SerialConfig),
    /// Servos on a CAN bus behind a transparent bridge
    CanTunnel(CanTunnelConfig),
}

/// Direct serial transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SerialConfig {
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl TransportConfig {
    pub fn port(&self) -> &str {
        match self {
            Self::Serial(cfg) => &cfg.port,
            Self::CanTunnel(cfg) => &cfg.port,
        }
    }

    pub fn set_port(&mut self, port: impl Into<String>) {
        match self {
            Self::Serial(cfg) => cfg.port = port.into(),
            Self::CanTunnel(cfg) => cfg.port = port.into(),
        }
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) {
        match self {
            Self::Serial(cfg) => cfg.baud_rate = baud_rate,
            Self::CanTunnel(cfg) => cfg.baud_rate = baud_rate,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SERVOLINK_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    ///
    /// The result is not validated, so callers that fill in the port later
    /// may start from an empty one.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(ENV_PORT) {
            self.transport.set_port(port);
        }

        if let Some(value) = lookup(ENV_DIAGNOSTICS) {
            let enable = parse_flag(&value).ok_or_else(|| {
                Error::Config(format!("{}: expected true or false, got {:?}", ENV_DIAGNOSTICS, value))
            })?;
            if let TransportConfig::CanTunnel(cfg) = &mut self.transport {
                cfg.diagnostics = enable;
            }
        }
        Ok(())
    }

    /// Reject configurations that cannot name a port.
    pub fn validate(&self) -> Result<()> {
        if self.transport.port().is_empty() {
            return Err(Error::Config("transport port must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::can::FrameFormat;

    #[test]
    fn can_tunnel_with_defaults() {
        let config = Config::from_toml(
            r#"
            [transport]
            kind = "can-tunnel"
            port = "/dev/ttyUSB0"
            "#,
        )
        .unwrap();

        let TransportConfig::CanTunnel(cfg) = config.transport else {
            panic!("expected can tunnel");
        };
        assert_eq!(cfg.port, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 1_000_000);
        assert_eq!(cfg.can_id, 0x60);
        assert_eq!(cfg.frame_format, FrameFormat::Standard);
        assert_eq!(cfg.can_baud_rate, 1_000_000);
        assert!(!cfg.diagnostics);
    }

    #[test]
    fn can_tunnel_fully_specified() {
        let config = Config::from_toml(
            r#"
            [transport]
            kind = "can-tunnel"
            port = "COM3"
            baud_rate = 57600
            can_id = 0x18DA00F1
            frame_format = "extended"
            can_baud_rate = 500000
            diagnostics = true
            "#,
        )
        .unwrap();

        assert_eq!(
            config.transport,
            TransportConfig::CanTunnel(CanTunnelConfig {
                port: "COM3".into(),
                baud_rate: 57_600,
                can_id: 0x18DA_00F1,
                frame_format: FrameFormat::Extended,
                can_baud_rate: 500_000,
                diagnostics: true,
            })
        );
    }

    #[test]
    fn serial_transport() {
        let config = Config::from_toml(
            r#"
            [transport]
            kind = "serial"
            port = "/dev/ttyACM0"
            baud_rate = 115200
            "#,
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Serial(SerialConfig {
                port: "/dev/ttyACM0".into(),
                baud_rate: 115_200,
            })
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = Config::from_toml(
            r#"
            [transport]
            kind = "carrier-pigeon"
            port = "coop"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn empty_port_is_rejected() {
        let result = Config::from_toml(
            r#"
            [transport]
            kind = "serial"
            port = ""
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn overrides_replace_port_and_diagnostics() {
        let mut config = Config {
            transport: TransportConfig::CanTunnel(CanTunnelConfig {
                port: "/dev/ttyUSB0".into(),
                ..Default::default()
            }),
        };
        config
            .apply_overrides(|key| match key {
                ENV_PORT => Some("/dev/ttyUSB7".into()),
                ENV_DIAGNOSTICS => Some("TRUE".into()),
                _ => None,
            })
            .unwrap();

        let TransportConfig::CanTunnel(cfg) = &config.transport else {
            panic!("expected can tunnel");
        };
        assert_eq!(cfg.port, "/dev/ttyUSB7");
        assert!(cfg.diagnostics);
    }

    #[test]
    fn bad_diagnostics_flag_is_rejected() {
        let mut config = Config {
            transport: TransportConfig::Serial(SerialConfig {
                port: "/dev/ttyUSB0".into(),
                baud_rate: 57_600,
            }),
        };
        let result = config.apply_overrides(|key| (key == ENV_DIAGNOSTICS).then(|| "maybe".into()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn overrides_leave_empty_port_for_caller() {
        let mut config = Config {
            transport: TransportConfig::CanTunnel(CanTunnelConfig::default()),
        };
        config
            .apply_overrides(|key| (key == ENV_DIAGNOSTICS).then(|| "1".into()))
            .unwrap();

        let TransportConfig::CanTunnel(cfg) = &config.transport else {
            panic!("expected can tunnel");
        };
        assert!(cfg.diagnostics);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Config::load_from("/nonexistent/servolink.toml"),
            Err(Error::Io(_))
        ));
    }
}
