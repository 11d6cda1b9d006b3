/// `DeviceClassifier` — the deterministic decision tree of spec.md §4.C,
/// mapping an `EvdevInfo` to a `DeviceRole`. Pure: identical bits in
/// always yields identical role out.
use super::codes::*;
use super::info::EvdevInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Reject,
    Touch,
    Input,
    Activity,
    Ignore,
    Doubletap,
    ProximitySensor,
    AmbientLightSensor,
    VolumeKey,
    Keyboard,
}

/// Codes this daemon tracks on `Input`-role devices (spec.md §4.C rule 9).
const TRACKED_KEYS: &[u16] = &[
    KEY_POWER,
    KEY_CAMERA,
    KEY_CAMERA_FOCUS,
    KEY_SCREENLOCK,
    KEY_VOLUMEUP,
    KEY_VOLUMEDOWN,
];

const TRACKED_SWITCHES: &[u16] = &[
    SW_CAMERA_LENS_COVER,
    SW_FRONT_PROXIMITY,
    SW_HEADPHONE_INSERT,
    SW_KEYPAD_SLIDE,
    SW_LID,
    SW_LINEOUT_INSERT,
    SW_MICROPHONE_INSERT,
    SW_VIDEOOUT_INSERT,
];

const DOUBLETAP_KEY_ONLY_CODES: &[u16] = &[KEY_POWER, KEY_MENU, KEY_BACK, KEY_HOMEPAGE];

/// `true` for the known Nexus-5-style combined volume/lid device:
/// exactly `{EV_KEY, EV_SW}`, keys exactly `{VOLUMEUP, VOLUMEDOWN}`,
/// switches exactly `{SW_LID}`.
fn is_nexus5_volume_device(info: &EvdevInfo) -> bool {
    info.match_types(&[EV_KEY, EV_SW], &[])
        && info.match_codes(EV_KEY, &[KEY_VOLUMEUP, KEY_VOLUMEDOWN])
        && info.match_codes(EV_SW, &[SW_LID])
}

/// `true` for a device that reports only `EV_KEY`, and only volume-up and
/// volume-down among its keys (ignoring `EV_REP`, which carries no codes
/// of its own and is irrelevant to this check).
fn is_grabbable_volume_keys(info: &EvdevInfo) -> bool {
    info.match_types(&[EV_KEY], &[0x14 /* EV_REP */])
        && info.match_codes(EV_KEY, &[KEY_VOLUMEUP, KEY_VOLUMEDOWN])
}

fn has_asymmetric_axis(info: &EvdevInfo, ev_type: u16, x: u16, y: u16) -> bool {
    info.has_code(ev_type, x) != info.has_code(ev_type, y)
}

/// Runs the priority-ordered decision tree of spec.md §4.C. First match
/// wins.
pub fn classify(info: &EvdevInfo) -> DeviceRole {
    // 1. EV_ABS-only, only code ABS_MISC -> ambient light sensor.
    if info.match_types(&[EV_ABS], &[]) && info.match_codes(EV_ABS, &[ABS_MISC]) {
        return DeviceRole::AmbientLightSensor;
    }

    // 2. EV_ABS-only, only code ABS_DISTANCE -> proximity sensor.
    if info.match_types(&[EV_ABS], &[]) && info.match_codes(EV_ABS, &[ABS_DISTANCE]) {
        return DeviceRole::ProximitySensor;
    }

    // 3. BTN_Z / REL_Z / ABS_Z present anywhere -> reject (3-D sensor).
    if info.has_code(EV_KEY, BTN_Z) || info.has_code(EV_REL, REL_Z) || info.has_code(EV_ABS, ABS_Z)
    {
        return DeviceRole::Reject;
    }

    // 4. Touchscreen: BTN_TOUCH+ABS_X+ABS_Y, or MT position pair.
    if (info.has_code(EV_KEY, BTN_TOUCH) && info.has_code(EV_ABS, ABS_X) && info.has_code(EV_ABS, ABS_Y))
        || (info.has_code(EV_ABS, ABS_MT_POSITION_X) && info.has_code(EV_ABS, ABS_MT_POSITION_Y))
    {
        return DeviceRole::Touch;
    }

    // 5. SDK mouse-emulated touch: BTN_MOUSE + REL_X + REL_Y.
    if info.has_code(EV_KEY, BTN_MOUSE) && info.has_code(EV_REL, REL_X) && info.has_code(EV_REL, REL_Y)
    {
        return DeviceRole::Touch;
    }

    // 6. Doubletap panel reporting the gesture as key events only.
    if info.match_types(&[EV_KEY], &[]) && info.match_codes(EV_KEY, DOUBLETAP_KEY_ONLY_CODES) {
        return DeviceRole::Doubletap;
    }

    // 7. Keyboard: has KEY_Q and KEY_P.
    if info.has_code(EV_KEY, KEY_Q) && info.has_code(EV_KEY, KEY_P) {
        return DeviceRole::Keyboard;
    }

    // 8. Volume keys, plain or the Nexus-5 combined device.
    if is_grabbable_volume_keys(info) || is_nexus5_volume_device(info) {
        return DeviceRole::VolumeKey;
    }

    // 9. Any mce-tracked key or switch -> generic Input device.
    if TRACKED_KEYS.iter().any(|&k| info.has_code(EV_KEY, k))
        || TRACKED_SWITCHES.iter().any(|&s| info.has_code(EV_SW, s))
    {
        return DeviceRole::Input;
    }

    // 10. 1-D sensor handled elsewhere: EV_ABS-only with exactly one of
    //     ABS_DISTANCE/ABS_MISC and no other absolute code.
    if info.match_types(&[EV_ABS], &[]) {
        let has_distance = info.has_code(EV_ABS, ABS_DISTANCE);
        let has_misc = info.has_code(EV_ABS, ABS_MISC);
        if has_distance ^ has_misc {
            return DeviceRole::Reject;
        }
    }

    // 11. Any asymmetric X/Y axis pair -> reject.
    if has_asymmetric_axis(info, EV_REL, REL_X, REL_Y)
        || has_asymmetric_axis(info, EV_ABS, ABS_X, ABS_Y)
    {
        return DeviceRole::Reject;
    }

    // 12. Emits some activity-worthy type -> activity-only device.
    if info.has_type(EV_KEY)
        || info.has_type(EV_REL)
        || info.has_type(EV_ABS)
        || info.has_type(EV_MSC)
        || info.has_type(EV_SW)
    {
        return DeviceRole::Activity;
    }

    // 13. Fallback.
    DeviceRole::Ignore
}
