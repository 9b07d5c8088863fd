//! Virtual keyboard output via uinput
//!
//! A single synthetic device is created at startup and survives every
//! physical reconnect cycle. Recreating it per reconnect would make the
//! keyboard flap from the desktop's point of view, which is far more
//! disruptive than the sub-second read gap the reconnect already costs.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key};
use tracing::debug;

use crate::bridge::KeySink;
use crate::discovery::{PID_M5W_WIRED, VENDOR_ID};
use crate::error::BridgeError;
use crate::keymap;
use crate::report::{Direction, KeyTransition};

/// Fixed device name, distinguishable from the physical keyboard
pub const DEVICE_NAME: &str = "MonsGeek Virtual Keyboard";

/// Synthetic keyboard registered with the input subsystem
pub struct VirtualKeyboard {
    device: VirtualDevice,
}

impl VirtualKeyboard {
    /// Create the uinput device, advertising every keycode the keymap
    /// can produce. uinput rejects events for capabilities that were
    /// not declared at creation, so the set cannot be narrowed later.
    pub fn create() -> Result<Self, BridgeError> {
        let mut keys = AttributeSet::<Key>::new();
        for key in keymap::mapped_keys() {
            keys.insert(key);
        }

        let device = VirtualDeviceBuilder::new()?
            .name(DEVICE_NAME)
            .input_id(InputId::new(BusType::BUS_USB, VENDOR_ID, PID_M5W_WIRED, 1))
            .with_keys(&keys)?
            .build()?;

        debug!("Created uinput device \"{DEVICE_NAME}\"");
        Ok(Self { device })
    }
}

impl KeySink for VirtualKeyboard {
    fn emit(&mut self, transitions: &[KeyTransition]) -> Result<(), BridgeError> {
        if transitions.is_empty() {
            return Ok(());
        }

        let events: Vec<InputEvent> = transitions
            .iter()
            .map(|t| {
                let value = match t.direction {
                    Direction::Down => 1,
                    Direction::Up => 0,
                };
                InputEvent::new(EventType::KEY, t.key.code(), value)
            })
            .collect();

        // emit() appends the SYN_REPORT, so consumers see the whole
        // report's transitions as one consistent snapshot
        self.device.emit(&events)?;
        Ok(())
    }
}
