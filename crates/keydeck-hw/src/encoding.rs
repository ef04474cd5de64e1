//! Native key image encoding.
//!
//! Converts a generic RGB pixel buffer into the byte layout a device expects:
//! resized to the key size, rotated and mirrored to match how the panel scans
//! its keys, then encoded as JPEG or BMP.

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, RgbImage};
use tracing::debug;

use crate::model::{ImageEncoding, KeyImageFormat, Rotation};
use crate::Result;

/// JPEG quality used for gen 2 key images.
const JPEG_QUALITY: u8 = 100;

/// Converts an image into the device's native key image encoding.
pub fn to_native_format(format: &KeyImageFormat, image: &RgbImage) -> Result<Vec<u8>> {
    let transformed = transform(format, image);

    let mut encoded = Vec::new();
    match format.encoding {
        ImageEncoding::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
            encoder.encode(
                transformed.as_raw(),
                transformed.width(),
                transformed.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageEncoding::Bmp => {
            let mut encoder = BmpEncoder::new(&mut encoded);
            encoder.encode(
                transformed.as_raw(),
                transformed.width(),
                transformed.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
    }

    debug!(
        "Encoded {}x{} key image as {:?} ({} bytes)",
        transformed.width(),
        transformed.height(),
        format.encoding,
        encoded.len()
    );
    Ok(encoded)
}

/// Applies resize, rotation and mirroring without encoding.
pub fn transform(format: &KeyImageFormat, image: &RgbImage) -> RgbImage {
    let mut out = if image.dimensions() != format.size() {
        imageops::resize(image, format.width, format.height, FilterType::Triangle)
    } else {
        image.clone()
    };

    if format.rotation == Rotation::Ccw90 {
        out = imageops::rotate270(&out);
    }
    if format.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut out);
    }
    if format.flip_vertical {
        imageops::flip_vertical_in_place(&mut out);
    }
    out
}
