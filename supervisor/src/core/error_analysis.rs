//! Failure classification
//!
//! The sweep binary and libhackrf report problems as free text. The phrases
//! below are the ones they actually print; anything else is `Unknown`.

use shared::DeviceStatus;

/// Unknown errors in a row past this count mark the device as stuck
pub const STUCK_AFTER_UNKNOWN_ERRORS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Another process holds the radio
    DeviceBusy,
    PermissionDenied,
    DeviceNotFound,
    UsbError,
    Unknown,
}

impl ErrorKind {
    pub fn classify(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        let mentions = |phrases: &[&str]| phrases.iter().any(|phrase| message.contains(phrase));

        if mentions(&["resource busy", "device busy"]) {
            ErrorKind::DeviceBusy
        } else if mentions(&["permission denied", "access denied"]) {
            ErrorKind::PermissionDenied
        } else if mentions(&["no hackrf boards found", "hackrf_open() failed", "device not found"]) {
            ErrorKind::DeviceNotFound
        } else if mentions(&["libusb", "usb error", "usb_open() failed"]) {
            ErrorKind::UsbError
        } else {
            ErrorKind::Unknown
        }
    }

    /// Whether restarting the sweep can be expected to help
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::PermissionDenied)
    }

    /// Device condition implied by this error, if any.
    ///
    /// `consecutive` is the number of failures in a row including this one.
    pub fn device_status(self, consecutive: u32) -> Option<DeviceStatus> {
        match self {
            ErrorKind::DeviceBusy => Some(DeviceStatus::Busy),
            ErrorKind::DeviceNotFound | ErrorKind::PermissionDenied => Some(DeviceStatus::Disconnected),
            ErrorKind::UsbError => Some(DeviceStatus::Stuck),
            ErrorKind::Unknown if consecutive > STUCK_AFTER_UNKNOWN_ERRORS => Some(DeviceStatus::Stuck),
            ErrorKind::Unknown => None,
        }
    }
}
