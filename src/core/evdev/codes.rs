/// Numeric event-type/code constants from `linux/input-event-codes.h`,
/// and the symbolic name table `EventMapper` uses to decode configuration
/// entries like `KEY_F1 = KEY_CAMERA`.
///
/// Only the subset the classifier, mapper and tklock policy actually
/// reference is named here — this is not a full transcription of the
/// kernel header.
#![allow(dead_code)]

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_SW: u16 = 0x05;

/// `EV_LED` — a type `EvdevBits` does not model; used in tests as an
/// example of an event type `new()` rejects.
pub const EV_LED_UNSUPPORTED: u16 = 0x11;

/// One past the highest valid type number the kernel defines (`EV_MAX` is
/// 0x1f); `EvdevInfo` allocates a fixed-size slot array of this length.
pub const EV_CNT: usize = 0x20;

pub const SYN_REPORT: u16 = 0x00;
pub const SYN_MT_REPORT: u16 = 0x02;

pub const KEY_CNT: usize = 0x2ff + 1;
pub const REL_CNT: usize = 0x0f + 1;
pub const ABS_CNT: usize = 0x3f + 1;
pub const MSC_CNT: usize = 0x07 + 1;
pub const SW_CNT: usize = 0x10 + 1;

/// Sentinel switch code the kernel is guaranteed never to report as set;
/// used by `EventMapper::reverse_lookup_switch` to signal "absent".
pub const SW_MAX: u16 = 0x10;

pub const KEY_ESC: u16 = 1;
pub const KEY_Q: u16 = 16;
pub const KEY_P: u16 = 25;
pub const KEY_POWER: u16 = 116;
pub const KEY_CAMERA: u16 = 212;
pub const KEY_CAMERA_FOCUS: u16 = 528;
pub const KEY_SCREENLOCK: u16 = 152;
pub const KEY_MENU: u16 = 139;
pub const KEY_BACK: u16 = 158;
pub const KEY_HOMEPAGE: u16 = 172;
pub const KEY_VOLUMEUP: u16 = 115;
pub const KEY_VOLUMEDOWN: u16 = 114;

pub const BTN_MOUSE: u16 = 0x110; // == BTN_LEFT
pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_TOUCH: u16 = 0x14a;
pub const BTN_Z: u16 = 0x138;

pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const REL_Z: u16 = 0x02;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_Z: u16 = 0x02;
pub const ABS_PRESSURE: u16 = 0x18;
pub const ABS_DISTANCE: u16 = 0x19;
pub const ABS_MISC: u16 = 0x28;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;
pub const ABS_MT_PRESSURE: u16 = 0x3a;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;

pub const MSC_GESTURE: u16 = 0x02;

pub const SW_LID: u16 = 0x00;
pub const SW_HEADPHONE_INSERT: u16 = 0x02;
pub const SW_MICROPHONE_INSERT: u16 = 0x04;
pub const SW_LINEOUT_INSERT: u16 = 0x06;
pub const SW_CAMERA_LENS_COVER: u16 = 0x09;
pub const SW_KEYPAD_SLIDE: u16 = 0x0a;
pub const SW_FRONT_PROXIMITY: u16 = 0x0b;
pub const SW_VIDEOOUT_INSERT: u16 = 0x0e;

/// `EVIOCGBIT`'s per-type bit count. Returns `None` for types EvdevBits
/// does not model (anything other than SYN/KEY/REL/ABS/MSC/SW per
/// spec.md §4.A).
pub fn cnt_for_type(ev_type: u16) -> Option<usize> {
    match ev_type {
        EV_SYN => Some(1),
        EV_KEY => Some(KEY_CNT),
        EV_REL => Some(REL_CNT),
        EV_ABS => Some(ABS_CNT),
        EV_MSC => Some(MSC_CNT),
        EV_SW => Some(SW_CNT),
        _ => None,
    }
}

/// Resolves a symbolic name (`KEY_VOLUMEUP`, `SW_LID`, ...) to its
/// `(type, code)` pair. Only `EV_KEY` and `EV_SW` names are resolvable —
/// matching spec.md §4.D ("only `EV_KEY` and `EV_SW` are translatable;
/// others must fail parse").
pub fn resolve_name(name: &str) -> Option<(u16, u16)> {
    let code = match name {
        "KEY_ESC" => KEY_ESC,
        "KEY_Q" => KEY_Q,
        "KEY_P" => KEY_P,
        "KEY_POWER" => KEY_POWER,
        "KEY_CAMERA" => KEY_CAMERA,
        "KEY_CAMERA_FOCUS" => KEY_CAMERA_FOCUS,
        "KEY_SCREENLOCK" => KEY_SCREENLOCK,
        "KEY_MENU" => KEY_MENU,
        "KEY_BACK" => KEY_BACK,
        "KEY_HOMEPAGE" => KEY_HOMEPAGE,
        "KEY_VOLUMEUP" => KEY_VOLUMEUP,
        "KEY_VOLUMEDOWN" => KEY_VOLUMEDOWN,
        "BTN_MOUSE" | "BTN_LEFT" => return Some((EV_KEY, BTN_MOUSE)),
        "BTN_RIGHT" => return Some((EV_KEY, BTN_RIGHT)),
        "BTN_TOUCH" => return Some((EV_KEY, BTN_TOUCH)),
        "SW_LID" => return Some((EV_SW, SW_LID)),
        "SW_HEADPHONE_INSERT" => return Some((EV_SW, SW_HEADPHONE_INSERT)),
        "SW_MICROPHONE_INSERT" => return Some((EV_SW, SW_MICROPHONE_INSERT)),
        "SW_LINEOUT_INSERT" => return Some((EV_SW, SW_LINEOUT_INSERT)),
        "SW_CAMERA_LENS_COVER" => return Some((EV_SW, SW_CAMERA_LENS_COVER)),
        "SW_KEYPAD_SLIDE" => return Some((EV_SW, SW_KEYPAD_SLIDE)),
        "SW_FRONT_PROXIMITY" => return Some((EV_SW, SW_FRONT_PROXIMITY)),
        "SW_VIDEOOUT_INSERT" => return Some((EV_SW, SW_VIDEOOUT_INSERT)),
        _ => return None,
    };
    Some((EV_KEY, code))
}
