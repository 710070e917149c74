//! Traffic diagnostics.
//!
//! When a transport has diagnostics enabled it mirrors every write and every
//! non-empty read as a hex dump. Dumps are upper-case, space separated
//! (`01 02 FF`), which is what bus analyzers and the bridge vendor tool show.

use std::fmt;

use crate::tracing::prelude::*;

/// Direction of traffic relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Direction {
    #[strum(serialize = "tx")]
    HostToDevice,
    #[strum(serialize = "rx")]
    DeviceToHost,
}

/// Displays a byte slice as space-separated upper-case hex pairs.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Emit one traffic trace event.
pub fn trace_traffic(port: &str, direction: Direction, data: &[u8]) {
    info!(port, len = data.len(), data = %HexDump(data), "{}", direction);
}

#[cfg(test)]
pub(crate) mod capture {
    //! Capture formatted tracing output in tests.

    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber that records everything at TRACE and above.
    pub fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let writer = CaptureWriter::default();
        let make_writer = {
            let writer = writer.clone();
            move || writer.clone()
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(make_writer)
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, writer.contents())
    }
}
