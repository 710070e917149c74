//! Serial and CAN tunnel transports against a pseudo-terminal.
//!
//! The PTY master plays the part of the bridge: whatever the transport
//! writes shows up on the master, and bytes written to the master arrive at
//! the transport.

#![cfg(target_os = "linux")]

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
use serial_test::serial;

use servolink::transport::can::CanTunnelConfig;
use servolink::{CanTunnelTransport, Error, SerialTransport, Transport};

struct Pty {
    master: PtyMaster,
    path: String,
}

fn open_pty() -> Pty {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
    grantpt(&master).unwrap();
    unlockpt(&master).unwrap();
    let path = ptsname_r(&master).unwrap();
    fcntl(master.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
    Pty { master, path }
}

impl Pty {
    fn read_exact_within(&mut self, len: usize, limit: Duration) -> Vec<u8> {
        let deadline = Instant::now() + limit;
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < len && Instant::now() < deadline {
            match self.master.read(&mut buf) {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1))
                }
                Err(e) => panic!("pty read failed: {e}"),
            }
        }
        out
    }
}

fn tunnel(pty: &Pty) -> CanTunnelTransport {
    CanTunnelTransport::serial(&CanTunnelConfig {
        port: pty.path.clone(),
        baud_rate: 57_600,
        ..Default::default()
    })
    .unwrap()
}

fn read_until(t: &mut impl Transport, len: usize) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut out = Vec::new();
    while out.len() < len && Instant::now() < deadline {
        let chunk = t.read(len - out.len()).unwrap();
        if chunk.is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        out.extend_from_slice(&chunk);
    }
    out
}

#[test]
#[serial]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn tunnel_writes_reach_the_bridge_unchanged() {
    let mut pty = open_pty();
    let mut t = tunnel(&pty);
    t.open().unwrap();

    let packet: Vec<u8> = (0u8..20).collect();
    assert_eq!(t.write(&packet).unwrap(), packet.len());
    assert_eq!(pty.read_exact_within(packet.len(), Duration::from_secs(2)), packet);
    t.close();
}

#[test]
#[serial]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn tunnel_reads_what_the_bridge_sends() {
    let mut pty = open_pty();
    let mut t = tunnel(&pty);
    t.open().unwrap();

    let reply: [u8; 6] = [0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC];
    pty.master.write_all(&reply).unwrap();
    assert_eq!(read_until(&mut t, reply.len()), reply);
    t.close();
}

#[test]
#[serial]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn idle_read_returns_immediately() {
    let pty = open_pty();
    let mut t = tunnel(&pty);
    t.open().unwrap();

    let started = Instant::now();
    assert!(t.read(32).unwrap().is_empty());
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(t.bytes_available().unwrap(), 0);
}

#[test]
#[serial]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn reopen_and_close_lifecycle() {
    let pty = open_pty();
    let mut t = tunnel(&pty);

    t.open().unwrap();
    t.open().unwrap();
    assert!(t.is_open());

    t.set_baud_rate(115_200).unwrap();
    assert_eq!(t.msec_per_byte(), (1000.0 / 115_200.0) * 10.0);

    t.close();
    t.close();
    assert!(matches!(t.read(1), Err(Error::NotOpen { .. })));
    assert!(matches!(t.write(&[1]), Err(Error::NotOpen { .. })));
}

#[test]
#[serial]
#[cfg_attr(feature = "skip-pty-tests", ignore)]
fn direct_serial_round_trip() {
    let mut pty = open_pty();
    let mut t = SerialTransport::with_baud_rate(pty.path.clone(), 1_000_000).unwrap();
    t.open().unwrap();

    t.write(&[0x01, 0x02, 0xFF]).unwrap();
    assert_eq!(
        pty.read_exact_within(3, Duration::from_secs(2)),
        [0x01u8, 0x02, 0xFF]
    );

    pty.master.write_all(&[0xAB]).unwrap();
    assert_eq!(read_until(&mut t, 1), [0xABu8]);
}
