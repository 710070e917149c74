//! Operator instructions for the CAN-to-serial bridge.
//!
//! In transparent conversion mode the bridge exposes no configuration
//! protocol to the host, so it has to be set up beforehand with the
//! vendor's tool. These instructions list what to set there.

use std::fmt;

use super::FrameFormat;

/// Settings the bridge must carry for a tunnel to work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    pub can_baud_rate: u32,
    /// Must equal the baud rate of the host-side serial transport.
    pub serial_baud_rate: u32,
    pub can_id: u32,
    pub frame_format: FrameFormat,
}

impl BridgeSettings {
    /// Name/value pairs in the order they appear in the vendor tool.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Working Mode", "Transparent Conversion".to_string()),
            ("CAN Baudrate", format!("{} bps", self.can_baud_rate)),
            ("Serial Baudrate", format!("{} bps", self.serial_baud_rate)),
            ("Serial Data Bit", "8".to_string()),
            ("Serial Stop Bit", "1".to_string()),
            ("Serial Parity Bit", "None".to_string()),
            ("CAN ID", format!("0x{:X}", self.can_id)),
            ("Frame Type", self.frame_format.vendor_label().to_string()),
        ]
    }
}

/// Step-by-step setup text for a human operator.
///
/// Advisory only. Nothing here is parsed or checked; a bridge that does
/// not match simply stays silent.
pub struct BridgeInstructions {
    settings: BridgeSettings,
}

impl BridgeInstructions {
    pub fn new(settings: BridgeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }
}

impl fmt::Display for BridgeInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== CAN bridge setup ===")?;
        writeln!(f, "1. Open the bridge vendor's configuration tool")?;
        writeln!(
            f,
            "2. Connect the bridge's serial side to the configuring computer"
        )?;
        writeln!(f, "3. Apply these settings:")?;
        for (name, value) in self.settings.entries() {
            writeln!(f, "   - Set '{}' to {}", name, value)?;
        }
        writeln!(f, "4. Save the device parameters")?;
        writeln!(f, "5. Restart the device")?;
        writeln!(
            f,
            "Note: the bridge reports nothing in transparent mode. If any \
             setting differs from the list above, traffic is silently lost."
        )?;
        write!(f, "========================")
    }
}
