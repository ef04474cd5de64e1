//! Supported Stream Deck models and their key image formats.
//!
//! Two protocol generations are covered. The Mini family speaks the older
//! 17-byte feature report dialect and takes BMP key images; the Original V2,
//! MK.2 and XL family speaks the 32-byte dialect and takes JPEG key images.

use crate::{Error, Result, ELGATO_VID};

/// Stream Deck hardware model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// Stream Deck Mini (6 keys).
    Mini,
    /// Stream Deck Mini MK.2 (6 keys).
    MiniMk2,
    /// Stream Deck Original V2 (15 keys).
    OriginalV2,
    /// Stream Deck MK.2 (15 keys).
    Mk2,
    /// Stream Deck XL (32 keys).
    Xl,
    /// Stream Deck XL V2 (32 keys).
    XlV2,
}

/// Wire protocol dialect spoken by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// 17-byte feature reports, 16-byte image page header.
    Mini,
    /// 32-byte feature reports, 8-byte image page header.
    Gen2,
}

/// Encoding the device expects for key images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Bmp,
    Jpeg,
}

/// Counter-clockwise rotation applied before a key image is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Ccw90,
}

/// Pixel dimensions and byte layout a device expects for one key image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyImageFormat {
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl KeyImageFormat {
    /// Returns the key image dimensions as (width, height).
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Model {
    /// All supported models.
    pub const ALL: [Model; 6] = [
        Model::Mini,
        Model::MiniMk2,
        Model::OriginalV2,
        Model::Mk2,
        Model::Xl,
        Model::XlV2,
    ];

    /// Looks up the model for a USB product ID.
    pub fn from_pid(pid: u16) -> Result<Self> {
        match pid {
            0x0063 => Ok(Model::Mini),
            0x0090 => Ok(Model::MiniMk2),
            0x006D => Ok(Model::OriginalV2),
            0x0080 => Ok(Model::Mk2),
            0x006C => Ok(Model::Xl),
            0x008F => Ok(Model::XlV2),
            _ => Err(Error::UnsupportedDevice {
                vid: ELGATO_VID,
                pid,
            }),
        }
    }

    /// Returns the USB product ID.
    pub fn pid(&self) -> u16 {
        match self {
            Model::Mini => 0x0063,
            Model::MiniMk2 => 0x0090,
            Model::OriginalV2 => 0x006D,
            Model::Mk2 => 0x0080,
            Model::Xl => 0x006C,
            Model::XlV2 => 0x008F,
        }
    }

    /// Returns the protocol generation.
    pub fn generation(&self) -> Generation {
        match self {
            Model::Mini | Model::MiniMk2 => Generation::Mini,
            _ => Generation::Gen2,
        }
    }

    /// Returns the number of keys.
    pub fn key_count(&self) -> u8 {
        let (cols, rows) = self.key_layout();
        cols * rows
    }

    /// Returns the key grid as (columns, rows).
    pub fn key_layout(&self) -> (u8, u8) {
        match self {
            Model::Mini | Model::MiniMk2 => (3, 2),
            Model::OriginalV2 | Model::Mk2 => (5, 3),
            Model::Xl | Model::XlV2 => (8, 4),
        }
    }

    /// Returns the key image format.
    pub fn key_image_format(&self) -> KeyImageFormat {
        match self {
            Model::Mini | Model::MiniMk2 => KeyImageFormat {
                width: 80,
                height: 80,
                encoding: ImageEncoding::Bmp,
                rotation: Rotation::Ccw90,
                flip_horizontal: false,
                flip_vertical: true,
            },
            Model::OriginalV2 | Model::Mk2 => KeyImageFormat {
                width: 72,
                height: 72,
                encoding: ImageEncoding::Jpeg,
                rotation: Rotation::None,
                flip_horizontal: true,
                flip_vertical: true,
            },
            Model::Xl | Model::XlV2 => KeyImageFormat {
                width: 96,
                height: 96,
                encoding: ImageEncoding::Jpeg,
                rotation: Rotation::None,
                flip_horizontal: true,
                flip_vertical: true,
            },
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Mini => write!(f, "Stream Deck Mini"),
            Model::MiniMk2 => write!(f, "Stream Deck Mini MK.2"),
            Model::OriginalV2 => write!(f, "Stream Deck Original V2"),
            Model::Mk2 => write!(f, "Stream Deck MK.2"),
            Model::Xl => write!(f, "Stream Deck XL"),
            Model::XlV2 => write!(f, "Stream Deck XL V2"),
        }
    }
}
