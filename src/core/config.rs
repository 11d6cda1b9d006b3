/// Configuration loading and live settings.
///
/// The on-disk store is a keyed `[group]→key→value` document (mirroring
/// mce's INI file). Parsing that generic format is an external
/// collaborator the spec keeps out of scope, so this module only depends
/// on the [`ConfigStore`] trait — anything that can answer "what is
/// `key` in `group`" can feed `EventMapper` and the rest of the core.
/// [`AppConfig`] is the concrete document we actually ship, loaded with
/// `serde_yaml` the way `Config::from_file` does elsewhere in this crate.
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::error::MceError;

/// A read-only `[group]→key→value` store. The production mce daemon reads
/// this from an INI file via a shared settings library; here it is an
/// interface boundary so the core never depends on a concrete parser.
pub trait ConfigStore {
    fn get(&self, group: &str, key: &str) -> Option<&str>;
    fn group_keys(&self, group: &str) -> Vec<(&str, &str)>;
}

/// In-memory `ConfigStore`, used both as the real backing for
/// [`AppConfig`] and as a hand-built fixture in tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfigStore {
    groups: HashMap<String, HashMap<String, String>>,
}

impl MapConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }
}

impl ConfigStore for MapConfigStore {
    fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups.get(group)?.get(key).map(String::as_str)
    }

    fn group_keys(&self, group: &str) -> Vec<(&str, &str)> {
        match self.groups.get(group) {
            Some(kv) => kv.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
            None => Vec::new(),
        }
    }
}

/// The on-disk configuration document for `mce-inputd`.
///
/// `[EVDEV]`, `[SW_KEYPAD_SLIDE]`, the device blacklist and `[TKLock]`
/// settings of spec.md §6, gathered in one serde-friendly shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// `KERNEL_CODE = MCE_CODE` pairs, `[EVDEV]` group.
    #[serde(default)]
    pub evdev_mapping: Vec<(String, String)>,

    /// `<keyboard_device_name> = <slide_provider_device_name>`.
    #[serde(default)]
    pub slide_providers: HashMap<String, String>,

    /// Device names rejected outright at registry add time.
    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default)]
    pub tklock: TklockConfig,

    /// Sysfs control-node locations (spec.md §6). Every field is
    /// optional: an absent node degrades its feature to a no-op rather
    /// than failing the daemon (§7), and tests redirect these into a
    /// `tempfile::TempDir` instead of `/sys`.
    #[serde(default)]
    pub sysfs: SysfsPaths,
}

/// Parameterized sysfs locations, one per hardware interface listed in
/// spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SysfsPaths {
    pub gpio_key_disable: Option<std::path::PathBuf>,
    pub wait_for_gesture: Option<std::path::PathBuf>,
    pub calibrate: Option<std::path::PathBuf>,
    pub disable_ts: Option<std::path::PathBuf>,
    pub disable_kp: Option<std::path::PathBuf>,
    pub palm_status: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TklockConfig {
    #[serde(default)]
    pub camera_popout_unlock: bool,
}

impl Default for TklockConfig {
    fn default() -> Self {
        Self {
            camera_popout_unlock: false,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: AppConfig = serde_yaml::from_str(&content).map_err(|source| {
            MceError::ConfigLoadFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(config)
    }

    pub fn is_blacklisted(&self, device_name: &str) -> bool {
        self.blacklist.iter().any(|n| n == device_name)
    }

    /// Adapts this document to the generic [`ConfigStore`] interface so
    /// `EventMapper::from_store` can be built from either a real file or
    /// a hand-rolled [`MapConfigStore`] fixture.
    pub fn as_store(&self) -> MapConfigStore {
        let mut store = MapConfigStore::new();
        for (k, v) in &self.evdev_mapping {
            store.set("EVDEV", k, v.clone());
        }
        for (k, v) in &self.slide_providers {
            store.set("SW_KEYPAD_SLIDE", k, v.clone());
        }
        store.set(
            "TKLock",
            "CameraPopoutUnlock",
            self.tklock.camera_popout_unlock.to_string(),
        );
        store
    }
}

/// Live settings under `/system/osso/dsm/locks` (spec.md §6). Persistence
/// is the external settings store's job; this struct only owns defaults,
/// range clamping, and the in-process cached values TklockSM consults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub touchscreen_keypad_autolock_enabled: bool,
    pub tklock_blank_disable: i32,
    pub lpm_triggering: u8,
    pub proximity_blocks_touch: bool,
    pub autolock_delay_ms: u32,
    pub volume_key_input_policy: VolumeKeyPolicy,
    pub exception_length_call_in_ms: u32,
    pub exception_length_call_out_ms: u32,
    pub exception_length_alarm_ms: u32,
    pub exception_length_usb_connect_ms: u32,
    pub exception_length_usb_dialog_ms: u32,
    pub exception_length_charger_ms: u32,
    pub exception_length_jack_ms: u32,
    pub exception_length_camera_ms: u32,
    pub exception_length_volume_ms: u32,
    pub exception_length_activity_ms: u32,
    pub lid_sensor_enabled: bool,
    pub filter_lid_with_als: bool,
    pub filter_lid_als_limit: i32,
    pub lid_open_actions: LidAction,
    pub lid_close_actions: LidAction,
    pub proximity_delay_default_ms: u32,
    pub proximity_delay_incall_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKeyPolicy {
    Default,
    MediaOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidAction {
    None,
    BlankOrUnblank,
    LockOrUnlock,
}

const AUTOLOCK_DELAY_MIN_MS: u32 = 0;
const AUTOLOCK_DELAY_MAX_MS: u32 = 600_000;

impl Default for Settings {
    fn default() -> Self {
        Self {
            touchscreen_keypad_autolock_enabled: true,
            tklock_blank_disable: 0,
            lpm_triggering: 1,
            proximity_blocks_touch: false,
            autolock_delay_ms: 30_000,
            volume_key_input_policy: VolumeKeyPolicy::Default,
            exception_length_call_in_ms: 5_000,
            exception_length_call_out_ms: 2_500,
            exception_length_alarm_ms: 1_250,
            exception_length_usb_connect_ms: 5_000,
            exception_length_usb_dialog_ms: 10_000,
            exception_length_charger_ms: 3_000,
            exception_length_jack_ms: 3_000,
            exception_length_camera_ms: 3_000,
            exception_length_volume_ms: 2_000,
            exception_length_activity_ms: 2_000,
            lid_sensor_enabled: true,
            filter_lid_with_als: false,
            filter_lid_als_limit: 0,
            lid_open_actions: LidAction::BlankOrUnblank,
            lid_close_actions: LidAction::LockOrUnlock,
            proximity_delay_default_ms: 100,
            proximity_delay_incall_ms: 500,
        }
    }
}

impl Settings {
    /// Clamp `autolock_delay_ms` into range, logging once at info per §7
    /// ("Setting out of range: clamp to nearest in-range value").
    pub fn set_autolock_delay_ms(&mut self, requested: u32) {
        let clamped = requested.clamp(AUTOLOCK_DELAY_MIN_MS, AUTOLOCK_DELAY_MAX_MS);
        if clamped != requested {
            tracing::info!(requested, clamped, "autolock_delay out of range, clamped");
        }
        self.autolock_delay_ms = clamped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_config_store_roundtrip() {
        let mut store = MapConfigStore::new();
        store.set("EVDEV", "KEY_F1", "KEY_CAMERA");
        assert_eq!(store.get("EVDEV", "KEY_F1"), Some("KEY_CAMERA"));
        assert_eq!(store.get("EVDEV", "missing"), None);
        assert_eq!(store.group_keys("nonexistent"), Vec::<(&str, &str)>::new());
    }

    #[test]
    fn app_config_as_store_exposes_evdev_group() {
        let mut cfg = AppConfig::default();
        cfg.evdev_mapping
            .push(("SW_LID".into(), "SW_FRONT_PROXIMITY".into()));
        let store = cfg.as_store();
        assert_eq!(store.get("EVDEV", "SW_LID"), Some("SW_FRONT_PROXIMITY"));
    }

    #[test]
    fn blacklist_matches_exact_name() {
        let mut cfg = AppConfig::default();
        cfg.blacklist.push("msm8x60-ts-ghost".to_string());
        assert!(cfg.is_blacklisted("msm8x60-ts-ghost"));
        assert!(!cfg.is_blacklisted("synaptics-rmi-ts"));
    }

    #[test]
    fn autolock_delay_clamps_out_of_range() {
        let mut settings = Settings::default();
        settings.set_autolock_delay_ms(10_000_000);
        assert_eq!(settings.autolock_delay_ms, AUTOLOCK_DELAY_MAX_MS);
        settings.set_autolock_delay_ms(5_000);
        assert_eq!(settings.autolock_delay_ms, 5_000);
    }
}
