/// Raw ioctl wrappers over `/dev/input/event*` nodes.
///
/// Grounded on the `evdev` crate family's `sys.rs` (see
/// `examples/emberian-evdev/src/sys.rs` in the retrieval pack): each
/// `EVIOCGBIT` variant is a distinct ioctl number (`0x20 + event_type`),
/// so we generate one typed wrapper per event type we care about instead
/// of trying to parameterize the ioctl number at runtime.
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use anyhow::{Context, Result};
use nix::{ioctl_read, ioctl_read_buf, ioctl_write_int};

use super::codes::{EV_ABS, EV_KEY, EV_MSC, EV_REL, EV_SW, EV_SYN};
use crate::core::error::MceError;

/// `struct input_event` with 32-bit timestamps, matching the kernel ABI
/// on every architecture mce ships on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEvent {
    pub tv_sec: i32,
    pub tv_usec: i32,
    pub ev_type: u16,
    pub code: u16,
    pub value: i32,
}

pub const INPUT_EVENT_SIZE: usize = std::mem::size_of::<InputEvent>();

impl InputEvent {
    pub fn new(ev_type: u16, code: u16, value: i32) -> Self {
        Self {
            tv_sec: 0,
            tv_usec: 0,
            ev_type,
            code,
            value,
        }
    }

    pub fn is_syn_report(&self) -> bool {
        self.ev_type == EV_SYN && self.code == super::codes::SYN_REPORT
    }
}

ioctl_read_buf!(eviocgbit_syn, b'E', 0x20 + EV_SYN as u8, u8);
ioctl_read_buf!(eviocgbit_key, b'E', 0x20 + EV_KEY as u8, u8);
ioctl_read_buf!(eviocgbit_rel, b'E', 0x20 + EV_REL as u8, u8);
ioctl_read_buf!(eviocgbit_abs, b'E', 0x20 + EV_ABS as u8, u8);
ioctl_read_buf!(eviocgbit_msc, b'E', 0x20 + EV_MSC as u8, u8);
ioctl_read_buf!(eviocgbit_sw, b'E', 0x20 + EV_SW as u8, u8);

ioctl_read_buf!(eviocgkey, b'E', 0x18, u8);
ioctl_read_buf!(eviocgsw, b'E', 0x1b, u8);
ioctl_read_buf!(eviocgname, b'E', 0x06, u8);
ioctl_write_int!(eviocgrab, b'E', 0x90);
ioctl_read!(eviocgversion, b'E', 0x01, libc::c_int);

/// Issues `EVIOCGBIT(ev_type, bytes.len())`, filling `bytes` with the
/// kernel's capability bitmap for that type. Returns an [`MceError`] on
/// failure so callers can demote the device to `Reject` per §7.
pub fn ioctl_gbit(fd: &File, ev_type: u16, bytes: &mut [u8]) -> Result<()> {
    let raw = fd.as_raw_fd();
    let res = unsafe {
        match ev_type {
            EV_SYN => eviocgbit_syn(raw, bytes),
            EV_KEY => eviocgbit_key(raw, bytes),
            EV_REL => eviocgbit_rel(raw, bytes),
            EV_ABS => eviocgbit_abs(raw, bytes),
            EV_MSC => eviocgbit_msc(raw, bytes),
            EV_SW => eviocgbit_sw(raw, bytes),
            other => anyhow::bail!("EVIOCGBIT not supported for event type {other}"),
        }
    };
    res.map(|_| ())
        .map_err(|errno| MceError::CapabilityProbeFailed {
            path: fd_path(fd),
            source: std::io::Error::from_raw_os_error(errno as i32),
        })
        .map_err(anyhow::Error::from)
}

/// `EVIOCGKEY`: current physical state of every key the device owns.
pub fn ioctl_gkey(fd: &File, bytes: &mut [u8]) -> Result<()> {
    unsafe { eviocgkey(fd.as_raw_fd(), bytes) }
        .map(|_| ())
        .map_err(|errno| MceError::CapabilityProbeFailed {
            path: fd_path(fd),
            source: std::io::Error::from_raw_os_error(errno as i32),
        })
        .map_err(anyhow::Error::from)
}

/// `EVIOCGSW(SW_MAX)`: current state of every switch the device owns.
pub fn ioctl_gsw(fd: &File, bytes: &mut [u8]) -> Result<()> {
    unsafe { eviocgsw(fd.as_raw_fd(), bytes) }
        .map(|_| ())
        .map_err(|errno| MceError::CapabilityProbeFailed {
            path: fd_path(fd),
            source: std::io::Error::from_raw_os_error(errno as i32),
        })
        .map_err(anyhow::Error::from)
}

/// `EVIOCGNAME`: the device's advertised name string.
pub fn ioctl_gname(fd: &File) -> Result<String> {
    let mut buf = [0u8; 256];
    let n = unsafe { eviocgname(fd.as_raw_fd(), &mut buf) }
        .with_context(|| format!("EVIOCGNAME failed on {:?}", fd_path(fd)))?;
    let n = n as usize;
    let end = buf[..n.min(buf.len())]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(n.min(buf.len()));
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// `EVIOCGRAB`: exclusively grab (`1`) or release (`0`) the device.
pub fn ioctl_grab(fd: &File, grab: bool) -> Result<()> {
    unsafe { eviocgrab(fd.as_raw_fd(), if grab { 1 } else { 0 }) }
        .with_context(|| format!("EVIOCGRAB({}) failed on {:?}", grab, fd_path(fd)))?;
    Ok(())
}

fn fd_path(fd: &File) -> std::path::PathBuf {
    std::fs::read_link(format!("/proc/self/fd/{}", fd.as_raw_fd()))
        .unwrap_or_else(|_| Path::new("<unknown>").to_path_buf())
}

/// Reads raw `struct input_event` records from `fd`, `INPUT_EVENT_SIZE`
/// bytes at a time. A short read (a partial record) is a protocol error
/// per §7 and the device must be closed.
pub fn read_events(fd: &File, max_events: usize) -> Result<Vec<InputEvent>> {
    use std::io::Read;

    let mut buf = vec![0u8; INPUT_EVENT_SIZE * max_events];
    let mut file = fd.try_clone().context("cloning device fd")?;
    let n = file.read(&mut buf).context("reading input events")?;

    if n % INPUT_EVENT_SIZE != 0 {
        anyhow::bail!(MceError::ShortRead {
            path: fd_path(fd),
            got: n,
            record_size: INPUT_EVENT_SIZE,
        });
    }

    let count = n / INPUT_EVENT_SIZE;
    let mut events = Vec::with_capacity(count);
    for chunk in buf[..n].chunks_exact(INPUT_EVENT_SIZE) {
        events.push(parse_event(chunk));
    }
    Ok(events)
}

fn parse_event(bytes: &[u8]) -> InputEvent {
    debug_assert_eq!(bytes.len(), INPUT_EVENT_SIZE);
    InputEvent {
        tv_sec: i32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
        tv_usec: i32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
        ev_type: u16::from_ne_bytes(bytes[8..10].try_into().unwrap()),
        code: u16::from_ne_bytes(bytes[10..12].try_into().unwrap()),
        value: i32::from_ne_bytes(bytes[12..16].try_into().unwrap()),
    }
}
