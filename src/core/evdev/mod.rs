/// Raw evdev access, capability classification and event remapping —
/// the non-policy half of the input subsystem.
pub mod bits;
pub mod classifier;
pub mod codes;
pub mod info;
pub mod mapper;
pub mod raw;

pub use bits::EvdevBits;
pub use classifier::{classify, DeviceRole};
pub use info::EvdevInfo;
pub use mapper::{EventMapper, EventMapping};
pub use raw::InputEvent;
