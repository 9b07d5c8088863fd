// MonsGeek M5W Userspace Bridge - Shared Library
// Reads boot reports from the one working hidraw interface and
// re-publishes them through a uinput virtual keyboard.

pub mod bridge;
pub mod discovery;
pub mod error;
pub mod keymap;
pub mod report;
pub mod virtual_kbd;

pub use bridge::{
    Bridge, BridgeConfig, ConnectionState, DeviceLocator, KeySink, ReadOutcome, ReportSource,
};
pub use discovery::{HidLocator, PID_M5W_DONGLE, PID_M5W_WIRED, VENDOR_ID};
pub use error::BridgeError;
pub use report::{BootReport, Direction, KeyTransition};
pub use virtual_kbd::VirtualKeyboard;
