//! # mce-input
//!
//! **Input subsystem of a mobile-device Mode Control Entity (MCE)**
//!
//! `mce-inputd` is a privileged, single-threaded system daemon that owns
//! every `/dev/input/event*` node on a mobile device: it classifies
//! devices by capability, remaps vendor-specific event codes, synthesizes
//! a doubletap wake gesture for touchscreens that lack hardware support
//! for one, exclusively grabs input devices while the UI demands it, and
//! drives the touchscreen/keypad lock (tklock) policy engine that decides
//! when the device should be locked, dimmed, blanked, or woken.
//!
//! ## Architecture
//!
//! The daemon runs a cooperative `poll(2)` reactor over every registered
//! device fd plus a deadline-ordered timer queue — no worker threads, no
//! async runtime. Every external signal (a kernel event, a timer firing,
//! a policy setting changing) is turned into a batch of explicit actions
//! by the component that owns the decision, and those actions are applied
//! by the loop that owns the side effects. This keeps the policy engine
//! ([`core::tklock`]) and the grab state machine ([`core::grab`])
//! testable without a live device or a running scheduler.
//!
//! ## Modules
//!
//! ### Device layer
//! - [`core::evdev`] - capability probing, classification, code remapping
//! - [`core::registry`] - device lifecycle, directory rescan, initial
//!   switch-state probing
//! - [`core::monitor`] - per-device event reader and role-specific
//!   dispatch
//! - [`core::doubletap`] - software doubletap gesture emulation
//!
//! ### Policy layer
//! - [`core::grab`] / [`core::grab_domains`] - touchscreen/keypad
//!   input-grab debouncing
//! - [`core::tklock`] - the lock-policy state machine
//! - [`core::submode`] / [`core::datapipe`] - the shared policy-state bus
//!
//! ### Infrastructure
//! - [`core::config`] - on-disk configuration and live settings
//! - [`core::timers`] - cancellable deadline scheduler
//! - [`core::sysfs`] - hardware control-node read/write helpers
//! - [`core::permissions`] - startup permission checks
//! - [`core::logging`] - structured logging with rotation
//! - [`core::error`] - the narrow error taxonomy shared across the core
//!
//! ### Entry point
//! - [`cli`] - command-line argument parsing
//! - [`app`] - daemon lifecycle and the main reactor loop

/// Daemon lifecycle and the `poll(2)` reactor loop
pub mod app;

/// Command-line interface and argument parsing
pub mod cli;

/// Core functionality modules
pub mod core;
