//! Error types for the Key Deck hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with the hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// No supported device was found during enumeration.
    #[error("No Stream Deck device found (VID 0FD9)")]
    DeviceNotFound,

    /// Product ID does not belong to a supported model.
    #[error("Unsupported device (VID:PID {vid:04X}:{pid:04X})")]
    UnsupportedDevice { vid: u16, pid: u16 },

    /// The device handle was already closed.
    #[error("Device is closed")]
    Closed,

    /// USB HID communication error.
    #[error("USB HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Key index outside the device's key range.
    #[error("Invalid key index {index} (device has {count} keys)")]
    InvalidKey { index: u8, count: u8 },

    /// Image encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
