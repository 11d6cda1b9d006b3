/// Error taxonomy for failure classes the caller needs to branch on.
///
/// Most of the crate reports failures as `anyhow::Result` with added
/// context, matching the rest of the codebase. `MceError` exists only for
/// the handful of call sites in §7 of the design notes that recover
/// differently depending on *which* thing failed (capability probe vs.
/// short read vs. sysfs write), so callers can `downcast_ref` onto it.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MceError {
    /// `EVIOCGBIT`/`EVIOCGKEY`/`EVIOCGSW` failed on an open device. The
    /// device is demoted to `DeviceRole::Reject` and monitoring continues.
    #[error("capability probe failed on {path:?}: {source}")]
    CapabilityProbeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read from an evdev fd returned a byte count that was not a
    /// multiple of `size_of::<InputEvent>()`. The device must be closed;
    /// the directory watcher may re-add it later.
    #[error("short read from {path:?}: got {got} bytes, expected a multiple of {record_size}")]
    ShortRead {
        path: PathBuf,
        got: usize,
        record_size: usize,
    },

    /// Write to a sysfs control node failed. The associated feature
    /// (doubletap wake, hardware interrupt gating) becomes a no-op; policy
    /// must remain otherwise functional.
    #[error("sysfs write to {path:?} failed: {source}")]
    SysfsWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk configuration document could not be parsed.
    #[error("failed to load configuration from {path:?}: {source}")]
    ConfigLoadFailed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
