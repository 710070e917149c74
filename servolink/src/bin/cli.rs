//! Command-line interface for servolink.
//!
//! Prints CAN bridge setup instructions, sends raw packets, and monitors
//! traffic on a servo bus reached either directly over serial or through a
//! transparent CAN-to-serial bridge.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use servolink::config::{self, Config, SerialConfig, TransportConfig};
use servolink::diag::HexDump;
use servolink::tracing::{self, prelude::*};
use servolink::transport::{self, can::CanTunnelConfig, Transport};
use servolink::{CanTunnelTransport, FrameFormat};

/// Pause between polls of a non-blocking read.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Parser, Debug)]
#[command(name = "servolink-cli")]
#[command(about = "Talk to servo buses over serial or a transparent CAN bridge")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the settings the CAN bridge must be configured with
    BridgeConfig(TransportArgs),

    /// Write one packet and print whatever comes back
    Send {
        #[command(flatten)]
        transport: TransportArgs,

        /// Packet bytes as hex, e.g. "FFFF0102000F"
        packet: String,

        /// Expected reply length; sizes the reply timeout
        #[arg(long, default_value_t = 64)]
        reply_len: usize,
    },

    /// Dump all received traffic until interrupted
    Monitor(TransportArgs),
}

#[derive(clap::Args, Debug)]
struct TransportArgs {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, e.g. /dev/ttyUSB0
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// CAN identifier configured on the bridge, e.g. 0x60
    #[arg(long, value_parser = parse_can_id)]
    can_id: Option<u32>,

    /// Use 29-bit CAN identifiers
    #[arg(long)]
    extended: bool,

    /// CAN bus bit rate configured on the bridge
    #[arg(long)]
    can_baud: Option<u32>,

    /// Talk to a directly attached serial bus instead of a CAN bridge
    #[arg(long)]
    direct: bool,

    /// Hex-dump all traffic
    #[arg(short, long)]
    verbose: bool,
}

fn parse_can_id(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("invalid CAN ID '{}': {}", s, e))
}

impl TransportArgs {
    /// Merge file, environment, and command line, in increasing priority.
    fn resolve(&self, require_port: bool) -> Result<TransportConfig> {
        self.resolve_with(require_port, |key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with environment lookups going through `env`.
    fn resolve_with(
        &self,
        require_port: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<TransportConfig> {
        let mut transport = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let mut config = Config::from_toml(&text)
                    .with_context(|| format!("loading {}", path.display()))?;
                config.apply_overrides(&env)?;
                config.transport
            }
            None => {
                let mut config = Config {
                    transport: TransportConfig::CanTunnel(CanTunnelConfig::default()),
                };
                config.apply_overrides(&env)?;
                config.transport
            }
        };

        if self.direct {
            if let TransportConfig::CanTunnel(cfg) = &transport {
                transport = TransportConfig::Serial(SerialConfig {
                    port: cfg.port.clone(),
                    baud_rate: cfg.baud_rate,
                });
            }
        }

        if let Some(port) = &self.port {
            transport.set_port(port.as_str());
        }
        if let Some(baud) = self.baud {
            transport.set_baud_rate(baud);
        }

        match &mut transport {
            TransportConfig::CanTunnel(cfg) => {
                if let Some(can_id) = self.can_id {
                    cfg.can_id = can_id;
                }
                if self.extended {
                    cfg.frame_format = FrameFormat::Extended;
                }
                if let Some(can_baud) = self.can_baud {
                    cfg.can_baud_rate = can_baud;
                }
                cfg.diagnostics |= self.verbose;
            }
            TransportConfig::Serial(_) => {
                if self.can_id.is_some() || self.extended || self.can_baud.is_some() {
                    warn!("CAN options have no effect on a direct serial transport");
                }
            }
        }

        if require_port && transport.port().is_empty() {
            bail!("no serial port given; use --port, --config, or {}", config::ENV_PORT);
        }
        Ok(transport)
    }
}

fn bridge_config(args: &TransportArgs) -> Result<()> {
    let TransportConfig::CanTunnel(cfg) = args.resolve(false)? else {
        bail!("bridge configuration only applies to CAN tunnel transports");
    };
    let tunnel = CanTunnelTransport::serial(&cfg)?;
    println!("{}", tunnel.describe_bridge_configuration());
    Ok(())
}

fn send(args: &TransportArgs, packet: &str, reply_len: usize) -> Result<()> {
    let packet = hex::decode(packet.trim()).context("packet is not valid hex")?;
    let config = args.resolve(true)?;
    let mut transport = transport::create_transport(&config)?;
    transport.open()?;

    let written = transport.write(&packet)?;
    if written < packet.len() {
        warn!(written, requested = packet.len(), "Packet only partially written");
    }

    let timer = transport.packet_timer(reply_len);
    let mut reply = Vec::with_capacity(reply_len);
    while reply.len() < reply_len && !timer.is_expired() {
        let chunk = transport.read(reply_len - reply.len())?;
        if chunk.is_empty() {
            std::thread::sleep(POLL_INTERVAL);
        } else {
            reply.extend_from_slice(&chunk);
        }
    }
    transport.close();

    if reply.is_empty() {
        println!("no reply within {:?}", timer.window());
    } else {
        println!("{}", HexDump(&reply));
    }
    Ok(())
}

/// Read until `running` is cancelled, handing each non-empty chunk to `emit`.
fn poll_until_cancelled(
    transport: &mut dyn Transport,
    running: &CancellationToken,
    mut emit: impl FnMut(&[u8]),
) -> servolink::Result<()> {
    while !running.is_cancelled() {
        let data = transport.read(256)?;
        if data.is_empty() {
            std::thread::sleep(POLL_INTERVAL);
        } else {
            emit(&data);
        }
    }
    Ok(())
}

async fn monitor(args: &TransportArgs) -> Result<()> {
    let config = args.resolve(true)?;
    let mut transport = transport::create_transport(&config)?;
    transport.open()?;
    info!(port = %transport.port_name(), baud = transport.baud_rate(), "Monitoring.");

    let running = CancellationToken::new();
    let mut poller = {
        let running = running.clone();
        tokio::task::spawn_blocking(move || -> servolink::Result<()> {
            let result = poll_until_cancelled(transport.as_mut(), &running, |data| {
                println!("{}", HexDump(data))
            });
            transport.close();
            result
        })
    };

    tokio::select! {
        result = &mut poller => {
            result?.context("monitoring stopped")?;
        }
        signal = wait_for_shutdown() => {
            signal?;
            trace!("Shutting down.");
            running.cancel();
            poller.await??;
        }
    }

    info!("Exiting.");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{self, SignalKind};

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stderr();
    let args = Args::parse();

    match &args.command {
        Command::BridgeConfig(transport) => bridge_config(transport),
        Command::Send {
            transport,
            packet,
            reply_len,
        } => send(transport, packet, *reply_len),
        Command::Monitor(transport) => monitor(transport).await,
    }
}
