//! Key Deck Hardware Library
//!
//! Provides hardware abstraction for Elgato Stream Deck key panels: model
//! detection, the HID wire protocol, native key image encoding and a
//! thread-safe device handle that reports key presses through a callback.

pub mod device;
pub mod encoding;
pub mod error;
pub mod model;
pub mod protocol;
pub mod transport;

#[cfg(feature = "mock")]
pub mod mock;

pub use device::{DeviceInfo, DeviceManager, KeyCallback, StreamDeck};
pub use encoding::to_native_format;
pub use error::{Error, Result};
pub use model::{ImageEncoding, KeyImageFormat, Model, Rotation};
pub use transport::Transport;

/// USB vendor ID shared by all Elgato devices.
pub const ELGATO_VID: u16 = 0x0FD9;
