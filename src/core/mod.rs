/// Configuration loading and live policy settings
pub mod config;

/// One-producer/many-consumer typed value bus (spec.md §2 datapipes)
pub mod datapipe;

/// Doubletap gesture emulator and sysfs recalibration control (§4.K)
pub mod doubletap;

/// Error taxonomy shared across the core
pub mod error;

/// evdev device probing, classification, remapping and wire codes (§4.A-D)
pub mod evdev;

/// Per-device input-grab state machine (§4.H)
pub mod grab;

/// Grab-domain policy: which devices get grabbed under which submode (§4.I)
pub mod grab_domains;

/// Structured logging with rotation
pub mod logging;

/// Blocking `poll(2)` reactor over one device's event fd (§4.F)
pub mod monitor;

/// System permission checks and requirements
pub mod permissions;

/// Device lifecycle, directory rescan and initial-state probing (§4.G)
pub mod registry;

/// Policy-state bitmask shared over the submode datapipe
pub mod submode;

/// sysfs attribute read/write helpers for doubletap hardware
pub mod sysfs;

/// Monotonic timer scheduling for the main reactor loop
pub mod timers;

/// Device-lock policy engine: auto-lock, proximity-lock, flip gesture (§4.J)
pub mod tklock;
