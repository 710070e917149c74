//! Packet timeout accounting.

use std::time::{Duration, Instant};

/// Worst-case USB-serial adapter latency, in milliseconds. Counted twice per
/// packet: once on the way out and once on the way back.
pub const LATENCY_TIMER_MS: f64 = 16.0;

/// Fixed slack added to every packet window, in milliseconds.
const WINDOW_SLACK_MS: f64 = 2.0;

/// Timeout window for one request/response exchange.
///
/// Started when the protocol engine begins waiting for a reply; the engine
/// keeps polling [`crate::Transport::read`] until it has a full packet or
/// [`PacketTimer::is_expired`] returns true.
#[derive(Debug, Clone, Copy)]
pub struct PacketTimer {
    started: Instant,
    window: Duration,
}

impl PacketTimer {
    /// Window for receiving `packet_len` bytes at `msec_per_byte`.
    pub fn for_packet(msec_per_byte: f64, packet_len: usize) -> Self {
        let millis =
            msec_per_byte * packet_len as f64 + LATENCY_TIMER_MS * 2.0 + WINDOW_SLACK_MS;
        Self::millis(millis)
    }

    /// Window of an explicit number of milliseconds.
    ///
    /// Negative and NaN windows clamp to zero. Windows too long for a
    /// [`Duration`] saturate at [`Duration::MAX`].
    pub fn millis(millis: f64) -> Self {
        let window =
            Duration::try_from_secs_f64(millis.max(0.0) / 1000.0).unwrap_or(Duration::MAX);
        Self {
            started: Instant::now(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the window closes; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.window.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() > self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::msec_per_byte;

    #[test]
    fn window_covers_bytes_latency_and_slack() {
        let per_byte = msec_per_byte(1_000_000);
        let timer = PacketTimer::for_packet(per_byte, 14);
        let expected = per_byte * 14.0 + 34.0;
        assert!((timer.window().as_secs_f64() * 1000.0 - expected).abs() < 1e-3);
    }

    #[test]
    fn slow_link_gets_longer_window() {
        let fast = PacketTimer::for_packet(msec_per_byte(1_000_000), 100);
        let slow = PacketTimer::for_packet(msec_per_byte(9_600), 100);
        assert!(slow.window() > fast.window());
    }

    #[test]
    fn zero_window_expires() {
        let timer = PacketTimer::millis(0.0);
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.is_expired());
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[test]
    fn negative_window_is_clamped() {
        assert_eq!(PacketTimer::millis(-5.0).window(), Duration::ZERO);
    }

    #[test]
    fn unbounded_window_saturates() {
        let timer = PacketTimer::millis(f64::INFINITY);
        assert_eq!(timer.window(), Duration::MAX);
        assert!(!timer.is_expired());
        assert_eq!(PacketTimer::millis(f64::NAN).window(), Duration::ZERO);
    }

    #[test]
    fn fresh_long_window_is_open() {
        let timer = PacketTimer::millis(60_000.0);
        assert!(!timer.is_expired());
        assert!(timer.remaining() > Duration::from_secs(59));
    }
}
