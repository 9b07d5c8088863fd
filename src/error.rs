//! Bridge error types

use thiserror::Error;

/// Errors that can occur while bridging the keyboard
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Device disconnected")]
    Disconnected,

    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Virtual keyboard error: {0}")]
    Uinput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for BridgeError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            BridgeError::HidPermissionDenied(msg)
        } else {
            BridgeError::HidError(msg)
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            BridgeError::HidPermissionDenied(e.to_string())
        } else {
            BridgeError::Uinput(e.to_string())
        }
    }
}
