//! Device discovery for the MonsGeek M5W
//!
//! The wired keyboard enumerates three HID interfaces under the same
//! VID/PID. Two are vendor interfaces that the kernel driver fails to
//! initialize (which is what forces the ~7s disconnect cycle this bridge
//! exists to ride out); only the boot-keyboard interface produces usable
//! reports. Interface selection goes by usage page/usage, same as the
//! transport discovery in the main driver.

use hidapi::{HidApi, HidDevice};
use tracing::{debug, info, warn};

use crate::bridge::{DeviceLocator, ReadOutcome, ReportSource};
use crate::error::BridgeError;
use crate::report::{BootReport, REPORT_LEN};

/// MonsGeek/Akko vendor ID
pub const VENDOR_ID: u16 = 0x3151;
/// M5W wired PID
pub const PID_M5W_WIRED: u16 = 0x4015;
/// M5W 2.4GHz dongle PID
pub const PID_M5W_DONGLE: u16 = 0x4011;

/// Generic Desktop usage page
const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x0001;
/// Keyboard usage (boot-keyboard interface)
const USAGE_KEYBOARD: u16 = 0x0006;

/// PIDs this bridge will attach to
const TARGET_PIDS: [u16; 2] = [PID_M5W_WIRED, PID_M5W_DONGLE];

/// Whether a VID/PID pair is one of the target keyboards
fn is_target_device(vid: u16, pid: u16) -> bool {
    vid == VENDOR_ID && TARGET_PIDS.contains(&pid)
}

/// Check if this is the boot-keyboard interface (usage 0x06, page 0x01).
/// The device's two vendor interfaces report other usages and are the
/// ones the kernel driver chokes on.
fn is_boot_keyboard_interface(usage_page: u16, usage: u16) -> bool {
    usage_page == USAGE_PAGE_GENERIC_DESKTOP && usage == USAGE_KEYBOARD
}

/// Combined interface filter used by the locator
fn is_bridgeable(vid: u16, pid: u16, usage_page: u16, usage: u16) -> bool {
    is_target_device(vid, pid) && is_boot_keyboard_interface(usage_page, usage)
}

/// HID-backed locator for the boot-keyboard interface
pub struct HidLocator {
    api: HidApi,
}

impl HidLocator {
    /// Initialize the HID enumeration API.
    ///
    /// Failure here is a startup-fatal resource error; everything after
    /// this point is retried by the supervisor.
    pub fn new() -> Result<Self, BridgeError> {
        let api = HidApi::new()?;
        Ok(Self { api })
    }
}

impl DeviceLocator for HidLocator {
    fn find(&mut self) -> Result<Option<Box<dyn ReportSource>>, BridgeError> {
        // The device comes and goes every few seconds while the kernel
        // driver retries its probe, so enumeration hiccups and open
        // failures are all "not found, try again" rather than errors.
        if let Err(e) = self.api.refresh_devices() {
            warn!("HID enumeration failed, retrying later: {e}");
            return Ok(None);
        }

        let Some(device_info) = self.api.device_list().find(|d| {
            is_bridgeable(d.vendor_id(), d.product_id(), d.usage_page(), d.usage())
        }) else {
            return Ok(None);
        };

        let path = device_info.path().to_string_lossy().to_string();
        match device_info.open_device(&self.api) {
            Ok(device) => {
                info!(
                    "Connected to {:04X}:{:04X} at {}",
                    device_info.vendor_id(),
                    device_info.product_id(),
                    path
                );
                Ok(Some(Box::new(HidReportSource { device })))
            }
            Err(e) => {
                // The node can appear before udev permissions settle
                warn!("Can't open {path}: {e}");
                Ok(None)
            }
        }
    }
}

/// Report stream over an open boot-keyboard interface
struct HidReportSource {
    device: HidDevice,
}

impl ReportSource for HidReportSource {
    fn read(&mut self, timeout_ms: i32) -> Result<ReadOutcome, BridgeError> {
        let mut buf = [0u8; 64];
        match self.device.read_timeout(&mut buf, timeout_ms) {
            Ok(0) => Ok(ReadOutcome::Idle),
            Ok(n) if n < REPORT_LEN => {
                debug!("Dropping short report ({n} bytes)");
                Ok(ReadOutcome::Malformed)
            }
            Ok(n) => match BootReport::parse(&buf[..n]) {
                Some(report) => Ok(ReadOutcome::Report(report)),
                None => Ok(ReadOutcome::Malformed),
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// Summary of one enumerated interface, for `list` diagnostics
#[derive(Debug, Clone)]
pub struct InterfaceSummary {
    pub vid: u16,
    pub pid: u16,
    pub path: String,
    pub interface_number: i32,
    pub usage_page: u16,
    pub usage: u16,
    pub product: Option<String>,
    /// Whether the bridge would attach to this interface
    pub selected: bool,
}

/// Enumerate all interfaces of the target keyboard.
pub fn scan_interfaces() -> Result<Vec<InterfaceSummary>, BridgeError> {
    let api = HidApi::new()?;
    let summaries = api
        .device_list()
        .filter(|d| is_target_device(d.vendor_id(), d.product_id()))
        .map(|d| InterfaceSummary {
            vid: d.vendor_id(),
            pid: d.product_id(),
            path: d.path().to_string_lossy().to_string(),
            interface_number: d.interface_number(),
            usage_page: d.usage_page(),
            usage: d.usage(),
            product: d.product_string().map(|s| s.to_string()),
            selected: is_boot_keyboard_interface(d.usage_page(), d.usage()),
        })
        .collect();
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_keyboard_interface_selected() {
        assert!(is_bridgeable(VENDOR_ID, PID_M5W_WIRED, 0x0001, 0x0006));
        assert!(is_bridgeable(VENDOR_ID, PID_M5W_DONGLE, 0x0001, 0x0006));
    }

    #[test]
    fn test_vendor_interfaces_rejected() {
        // The two interfaces the kernel driver fails to initialize:
        // right identity, wrong usage. Only vendor pages show up there.
        assert!(!is_bridgeable(VENDOR_ID, PID_M5W_WIRED, 0xFFFF, 0x0001));
        assert!(!is_bridgeable(VENDOR_ID, PID_M5W_WIRED, 0xFFFF, 0x0002));
    }

    #[test]
    fn test_foreign_devices_rejected() {
        // Some other keyboard with a boot interface
        assert!(!is_bridgeable(0x046D, 0xC52B, 0x0001, 0x0006));
        // Same vendor, unrelated product
        assert!(!is_bridgeable(VENDOR_ID, 0x5030, 0x0001, 0x0006));
    }
}
