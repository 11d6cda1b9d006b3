/// `DeviceRegistry` (spec.md §4.G) — lifecycle of every monitored device,
/// plus the two one-shot probes that establish the daemon's initial view
/// of the physical world: switch state and keyboard availability.
///
/// Directory watching is a periodic rescan rather than an `inotify`
/// watch: no repo in the retrieval pack reaches for `nix::sys::inotify`,
/// and `rescan` driven by the main loop's [`super::timers::Scheduler`]
/// gives the same CREATE/DELETE semantics (see DESIGN.md).
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use super::config::AppConfig;
use super::evdev::bits::EvdevBits;
use super::evdev::codes::{
    EV_SW, SW_CAMERA_LENS_COVER, SW_FRONT_PROXIMITY, SW_HEADPHONE_INSERT, SW_KEYPAD_SLIDE, SW_LID,
    SW_LINEOUT_INSERT, SW_MAX, SW_MICROPHONE_INSERT, SW_VIDEOOUT_INSERT,
};
use super::evdev::{classify, raw, DeviceRole, EventMapper, EvdevInfo};
use super::monitor::IoMonitor;

/// Switch codes the registry probes at startup for every `Input`/
/// `VolumeKey` device (spec.md §4.G).
const TRACKED_SWITCH_CODES: &[u16] = &[
    SW_CAMERA_LENS_COVER,
    SW_KEYPAD_SLIDE,
    SW_FRONT_PROXIMITY,
    SW_LID,
    SW_HEADPHONE_INSERT,
    SW_MICROPHONE_INSERT,
    SW_LINEOUT_INSERT,
    SW_VIDEOOUT_INSERT,
];

const AUDIO_JACK_SWITCHES: [u16; 4] = [
    SW_HEADPHONE_INSERT,
    SW_MICROPHONE_INSERT,
    SW_LINEOUT_INSERT,
    SW_VIDEOOUT_INSERT,
];

pub struct MonitoredDevice {
    pub path: PathBuf,
    pub name: String,
    pub info: EvdevInfo,
    pub role: DeviceRole,
    /// Set only for `Keyboard`-role devices named in the `[SW_KEYPAD_SLIDE]`
    /// config group; names another device whose slide state stands in for
    /// this keyboard's own.
    pub slide_provider_name: Option<String>,
    pub fd: File,
    pub monitor: IoMonitor,
}

/// One tracked switch's state as read at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialSwitchState {
    pub switch: u16,
    pub closed: bool,
}

#[derive(Debug)]
pub enum AddOutcome {
    Registered(DeviceRole),
    Blacklisted,
    /// ALS/proximity fds are hand-carried here rather than dropped, since
    /// the spec only excludes the sensor *subsystem*, not delivery of its
    /// fd — the caller forwards it on.
    HandedToSensorSubsystem(DeviceRole, File),
    Skipped(DeviceRole),
}

#[derive(Debug, Default)]
pub struct RescanOutcome {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

pub struct DeviceRegistry {
    devices: HashMap<PathBuf, MonitoredDevice>,
    config: AppConfig,
    mapper: EventMapper,
    /// Last known `SW_KEYPAD_SLIDE` state per device name, keyed
    /// independent of role: a slide provider need not itself be a
    /// keyboard (spec.md §8 scenario 6).
    slide_states: HashMap<String, bool>,
}

impl DeviceRegistry {
    pub fn new(config: AppConfig) -> Self {
        let mapper = EventMapper::from_store(&config.as_store(), "EVDEV");
        Self {
            devices: HashMap::new(),
            config,
            mapper,
            slide_states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mapper(&self) -> &EventMapper {
        &self.mapper
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn device(&self, path: &Path) -> Option<&MonitoredDevice> {
        self.devices.get(path)
    }

    /// Mutable lookup, used by the reactor to hand one device's `IoMonitor`
    /// a readiness event without taking out a borrow on the whole registry.
    pub fn device_mut(&mut self, path: &Path) -> Option<&mut MonitoredDevice> {
        self.devices.get_mut(path)
    }

    pub fn devices(&self) -> impl Iterator<Item = &MonitoredDevice> {
        self.devices.values()
    }

    /// Every registered device's path, for the reactor to snapshot before
    /// building a `poll(2)` fd set (borrowing each device mutably during
    /// dispatch requires releasing this immutable borrow first).
    pub fn paths(&self) -> Vec<PathBuf> {
        self.devices.keys().cloned().collect()
    }

    pub fn devices_with_role(&self, role: DeviceRole) -> Vec<&MonitoredDevice> {
        self.devices.values().filter(|d| d.role == role).collect()
    }

    /// Enumerates `input_dir` for `event*` nodes, registering any not yet
    /// known and deregistering any that have disappeared since the last
    /// call. Run once at startup (full enumeration) and thereafter on a
    /// periodic timer in place of a directory-change notification.
    pub fn rescan(&mut self, input_dir: &Path) -> RescanOutcome {
        let mut seen = std::collections::HashSet::new();
        let mut outcome = RescanOutcome::default();

        let entries = match fs::read_dir(input_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?input_dir, error = %e, "failed to enumerate input directory");
                return outcome;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"));
            if !is_event_node {
                continue;
            }
            seen.insert(path.clone());
            if self.devices.contains_key(&path) {
                continue;
            }
            match self.add_device(&path) {
                Ok(AddOutcome::Registered(role)) => {
                    info!(?path, ?role, "device registered");
                    outcome.added.push(path);
                }
                Ok(other) => {
                    tracing::debug!(?path, ?other, "device node seen but not registered");
                }
                Err(e) => warn!(?path, error = %e, "failed to open device node"),
            }
        }

        let gone: Vec<PathBuf> = self
            .devices
            .keys()
            .filter(|p| !seen.contains(*p))
            .cloned()
            .collect();
        for path in gone {
            self.devices.remove(&path);
            outcome.removed.push(path);
        }
        outcome
    }

    /// Adds one device by path (spec.md §4.G steps 1-5): open, check the
    /// blacklist, probe capabilities, classify, and either hand the fd to
    /// the sensor subsystem, drop it, or wrap it in an [`IoMonitor`].
    pub fn add_device(&mut self, path: &Path) -> anyhow::Result<AddOutcome> {
        let fd = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .with_context(|| format!("opening {:?}", path))?;

        let name = raw::ioctl_gname(&fd).unwrap_or_else(|e| {
            warn!(?path, error = %e, "EVIOCGNAME failed, using empty name");
            String::new()
        });

        if self.config.is_blacklisted(&name) {
            info!(?path, name, "device blacklisted, rejecting");
            return Ok(AddOutcome::Blacklisted);
        }

        let mut info = EvdevInfo::new();
        // Capability-probe failure demotes the device to Reject via an
        // all-empty EvdevInfo (§7); the warning is logged inside probe().
        let _ = info.probe(&fd);

        let role = classify(&info);
        match role {
            DeviceRole::Reject | DeviceRole::Ignore => Ok(AddOutcome::Skipped(role)),
            DeviceRole::ProximitySensor | DeviceRole::AmbientLightSensor => {
                Ok(AddOutcome::HandedToSensorSubsystem(role, fd))
            }
            _ => {
                let slide_provider_name = if role == DeviceRole::Keyboard {
                    self.config.slide_providers.get(&name).cloned()
                } else {
                    None
                };
                let monitor = IoMonitor::new(role, self.mapper.clone());
                self.devices.insert(
                    path.to_path_buf(),
                    MonitoredDevice {
                        path: path.to_path_buf(),
                        name,
                        info,
                        role,
                        slide_provider_name,
                        fd,
                        monitor,
                    },
                );
                Ok(AddOutcome::Registered(role))
            }
        }
    }

    pub fn remove_device(&mut self, path: &Path) -> Option<MonitoredDevice> {
        self.devices.remove(path)
    }

    /// Runs the initial switch-state probe (spec.md §4.G) across every
    /// registered `Input`/`VolumeKey` device, returning each tracked
    /// switch's derived state alongside the device it came from. Also
    /// feeds [`Self::note_switch_state`] for any `SW_KEYPAD_SLIDE`
    /// reading, so keyboard availability reflects the startup snapshot
    /// before a single live event has arrived.
    pub fn probe_initial_switches(&mut self) -> Vec<(PathBuf, InitialSwitchState)> {
        let paths: Vec<PathBuf> = self
            .devices
            .iter()
            .filter(|(_, d)| matches!(d.role, DeviceRole::Input | DeviceRole::VolumeKey))
            .map(|(p, _)| p.clone())
            .collect();

        let mut results = Vec::new();
        for path in paths {
            for state in self.probe_device_switches(&path) {
                results.push((path.clone(), state));
            }
        }
        results
    }

    fn probe_device_switches(&mut self, path: &Path) -> Vec<InitialSwitchState> {
        let device_name;
        let out;
        {
            let Some(device) = self.devices.get(path) else {
                return Vec::new();
            };
            let live = match EvdevInfo::probe_switch_state(&device.fd) {
                Ok(bits) => bits,
                Err(e) => {
                    warn!(?path, error = %e, "EVIOCGSW probe failed");
                    return Vec::new();
                }
            };
            out = compute_initial_switches(&self.mapper, &device.info, &live);
            device_name = device.name.clone();
        }
        for state in &out {
            if state.switch == SW_KEYPAD_SLIDE {
                self.note_switch_state(&device_name, SW_KEYPAD_SLIDE, state.closed);
            }
        }
        out
    }

    /// Records a live (or initially probed) switch reading. Only
    /// `SW_KEYPAD_SLIDE` readings affect keyboard availability; other
    /// codes are accepted and ignored so callers can forward every
    /// `KeySwitchSignal::SwitchChanged` unconditionally.
    pub fn note_switch_state(&mut self, device_name: &str, code: u16, closed: bool) {
        if code == SW_KEYPAD_SLIDE {
            self.slide_states.insert(device_name.to_string(), closed);
        }
    }

    /// `true` iff at least one `Keyboard`-role device is available
    /// (spec.md §4.G "Keyboard availability").
    pub fn keyboard_available(&self) -> bool {
        self.devices
            .values()
            .filter(|d| d.role == DeviceRole::Keyboard)
            .any(|d| self.is_keyboard_available(d))
    }

    fn is_keyboard_available(&self, keyboard: &MonitoredDevice) -> bool {
        if let Some(provider_name) = self.config.slide_providers.get(&keyboard.name) {
            if let Some(&closed) = self.slide_states.get(provider_name) {
                return !closed;
            }
            // Provider named but not yet heard from: fall through to the
            // keyboard's own slide, if any, rather than guessing.
        }
        if keyboard.info.has_code(EV_SW, SW_KEYPAD_SLIDE) {
            return match self.slide_states.get(&keyboard.name) {
                Some(&closed) => !closed,
                None => true,
            };
        }
        true
    }
}

/// Pure helper behind [`DeviceRegistry::probe_device_switches`]: given a
/// mapper, a device's capability record, and its live switch-state
/// bitmap, returns the tracked switches that are both reachable (not
/// remapped away per [`EventMapper::reverse_lookup_switch`]) and
/// physically present on the device.
fn compute_initial_switches(
    mapper: &EventMapper,
    info: &EvdevInfo,
    live: &EvdevBits,
) -> Vec<InitialSwitchState> {
    let mut out = Vec::new();
    for &tracked in TRACKED_SWITCH_CODES {
        let physical = mapper.reverse_lookup_switch(tracked);
        if physical == SW_MAX {
            continue;
        }
        if !info.has_code(EV_SW, physical) {
            continue;
        }
        out.push(InitialSwitchState {
            switch: tracked,
            closed: live.test(physical),
        });
    }
    out
}

/// Audio-jack state is the OR of up to four present insert switches
/// (spec.md §4.G); `None` if none of the four are present on the device.
pub fn audio_jack_inserted(states: &[InitialSwitchState]) -> Option<bool> {
    let mut any_present = false;
    let mut inserted = false;
    for state in states {
        if AUDIO_JACK_SWITCHES.contains(&state.switch) {
            any_present = true;
            inserted |= state.closed;
        }
    }
    any_present.then_some(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evdev::codes::EV_KEY;
    use crate::core::evdev::codes::{KEY_P, KEY_Q};

    fn info_with(types_and_codes: &[(u16, &[u16])]) -> EvdevInfo {
        let mut info = EvdevInfo::new();
        for &(ev_type, codes) in types_and_codes {
            let mut bits = EvdevBits::new(ev_type).unwrap();
            for &c in codes {
                bits.set_for_test(c);
            }
            info.merge_for_test(ev_type, bits);
        }
        info
    }

    fn dummy_fd() -> File {
        File::open("/dev/null").expect("/dev/null must exist")
    }

    fn insert_device(
        registry: &mut DeviceRegistry,
        path: &str,
        name: &str,
        role: DeviceRole,
        info: EvdevInfo,
        slide_provider_name: Option<String>,
    ) {
        registry.devices.insert(
            PathBuf::from(path),
            MonitoredDevice {
                path: PathBuf::from(path),
                name: name.to_string(),
                info,
                role,
                slide_provider_name,
                fd: dummy_fd(),
                monitor: IoMonitor::new(role, EventMapper::new()),
            },
        );
    }

    #[test]
    fn scenario_1_initial_probe_skips_remapped_and_absent_switches() {
        let mut config = AppConfig::default();
        config
            .evdev_mapping
            .push(("SW_LID".into(), "SW_FRONT_PROXIMITY".into()));
        let mapper = EventMapper::from_store(&config.as_store(), "EVDEV");
        let info = EvdevInfo::new();
        let live = EvdevBits::new(EV_SW).unwrap();
        let states = compute_initial_switches(&mapper, &info, &live);
        assert!(states.is_empty(), "no publish expected for either switch");
    }

    #[test]
    fn initial_probe_reports_a_present_tracked_switch() {
        let mapper = EventMapper::new();
        let mut cap = EvdevBits::new(EV_SW).unwrap();
        cap.set_for_test(SW_LID);
        let mut info = EvdevInfo::new();
        info.merge_for_test(EV_SW, cap);
        let mut live = EvdevBits::new(EV_SW).unwrap();
        live.set_for_test(SW_LID);

        let states = compute_initial_switches(&mapper, &info, &live);
        assert_eq!(states, vec![InitialSwitchState { switch: SW_LID, closed: true }]);
    }

    #[test]
    fn audio_jack_inserted_ors_present_switches() {
        let states = vec![
            InitialSwitchState { switch: SW_HEADPHONE_INSERT, closed: false },
            InitialSwitchState { switch: SW_LINEOUT_INSERT, closed: true },
        ];
        assert_eq!(audio_jack_inserted(&states), Some(true));
        assert_eq!(audio_jack_inserted(&[]), None);
    }

    #[test]
    fn scenario_6_keyboard_availability_with_external_slide_provider() {
        let mut config = AppConfig::default();
        config
            .slide_providers
            .insert("matrix-keyboard".into(), "slide-sensor".into());
        let mut registry = DeviceRegistry::new(config);

        insert_device(
            &mut registry,
            "/dev/input/event0",
            "matrix-keyboard",
            DeviceRole::Keyboard,
            info_with(&[(EV_KEY, &[KEY_Q, KEY_P])]),
            Some("slide-sensor".into()),
        );
        insert_device(
            &mut registry,
            "/dev/input/event1",
            "slide-sensor",
            DeviceRole::Input,
            info_with(&[(EV_SW, &[SW_KEYPAD_SLIDE])]),
            None,
        );

        registry.note_switch_state("slide-sensor", SW_KEYPAD_SLIDE, true);
        assert!(!registry.keyboard_available(), "slide closed on the provider");

        registry.note_switch_state("slide-sensor", SW_KEYPAD_SLIDE, false);
        assert!(registry.keyboard_available(), "opening the provider's slide, K unchanged");
    }

    #[test]
    fn keyboard_without_any_slide_is_unconditionally_available() {
        let mut registry = DeviceRegistry::new(AppConfig::default());
        insert_device(
            &mut registry,
            "/dev/input/event0",
            "plain-keyboard",
            DeviceRole::Keyboard,
            info_with(&[(EV_KEY, &[KEY_Q, KEY_P])]),
            None,
        );
        assert!(registry.keyboard_available());
    }

    #[test]
    fn keyboards_own_slide_used_when_no_provider_configured() {
        let mut registry = DeviceRegistry::new(AppConfig::default());
        insert_device(
            &mut registry,
            "/dev/input/event0",
            "slide-keyboard",
            DeviceRole::Keyboard,
            info_with(&[(EV_KEY, &[KEY_Q, KEY_P]), (EV_SW, &[SW_KEYPAD_SLIDE])]),
            None,
        );
        registry.note_switch_state("slide-keyboard", SW_KEYPAD_SLIDE, true);
        assert!(!registry.keyboard_available());
    }

    #[test]
    fn no_keyboard_devices_means_unavailable() {
        let registry = DeviceRegistry::new(AppConfig::default());
        assert!(!registry.keyboard_available());
    }
}
