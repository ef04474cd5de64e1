//! Stream Deck HID protocol definitions and encoding.
//!
//! Protocol structure:
//! - Feature reports: reset and brightness (17 bytes on the Mini family,
//!   32 bytes on gen 2 devices)
//! - Output reports: key images split into 1024-byte pages, each page a
//!   header followed by a slice of the encoded image, zero padded
//! - Input reports: one byte per key (non-zero = pressed) after a short prefix

use crate::model::{Generation, Model};

/// Total length of one image page report.
pub const IMAGE_REPORT_LEN: usize = 1024;

/// Report ID used by image pages and key state input reports.
pub const IMAGE_REPORT_ID: u8 = 0x02;

/// Feature report length for the Mini family.
pub const MINI_FEATURE_REPORT_LEN: usize = 17;

/// Feature report length for gen 2 devices.
pub const GEN2_FEATURE_REPORT_LEN: usize = 32;

/// Brightness used when a deck is returned to its default state.
pub const DEFAULT_BRIGHTNESS: u8 = 30;

impl Generation {
    /// Returns the feature report length.
    pub fn feature_report_len(&self) -> usize {
        match self {
            Generation::Mini => MINI_FEATURE_REPORT_LEN,
            Generation::Gen2 => GEN2_FEATURE_REPORT_LEN,
        }
    }

    /// Returns the image page header length.
    pub fn image_header_len(&self) -> usize {
        match self {
            Generation::Mini => 16,
            Generation::Gen2 => 8,
        }
    }

    /// Returns the image payload bytes carried by one page.
    pub fn image_payload_len(&self) -> usize {
        IMAGE_REPORT_LEN - self.image_header_len()
    }

    /// Returns the offset of the first key state byte in an input report.
    pub fn key_state_offset(&self) -> usize {
        match self {
            Generation::Mini => 1,
            Generation::Gen2 => 4,
        }
    }
}

/// Builds the feature report that clears all key images.
pub fn build_reset_report(generation: Generation) -> Vec<u8> {
    let mut buffer = vec![0u8; generation.feature_report_len()];
    match generation {
        Generation::Mini => buffer[..2].copy_from_slice(&[0x0B, 0x63]),
        Generation::Gen2 => buffer[..2].copy_from_slice(&[0x03, 0x02]),
    }
    buffer
}

/// Builds the brightness feature report. `percent` is clamped to 100.
pub fn build_brightness_report(generation: Generation, percent: u8) -> Vec<u8> {
    let percent = percent.min(100);
    let mut buffer = vec![0u8; generation.feature_report_len()];
    match generation {
        Generation::Mini => {
            buffer[..6].copy_from_slice(&[0x05, 0x55, 0xAA, 0xD1, 0x01, percent]);
        }
        Generation::Gen2 => buffer[..3].copy_from_slice(&[0x03, 0x08, percent]),
    }
    buffer
}

/// Splits an encoded key image into padded page reports.
///
/// An empty image still produces a single (final) page.
pub fn build_image_reports(generation: Generation, key: u8, image: &[u8]) -> Vec<Vec<u8>> {
    let payload_len = generation.image_payload_len();
    let header_len = generation.image_header_len();
    let page_count = image.len().div_ceil(payload_len).max(1);

    (0..page_count)
        .map(|page| {
            let start = page * payload_len;
            let end = (start + payload_len).min(image.len());
            let chunk = &image[start.min(end)..end];
            let is_last = page + 1 == page_count;

            let mut buffer = vec![0u8; IMAGE_REPORT_LEN];
            buffer[0] = IMAGE_REPORT_ID;
            match generation {
                Generation::Mini => {
                    buffer[1] = 0x01;
                    buffer[2] = page as u8;
                    buffer[4] = is_last as u8;
                    buffer[5] = key + 1;
                }
                Generation::Gen2 => {
                    buffer[1] = 0x07;
                    buffer[2] = key;
                    buffer[3] = is_last as u8;
                    buffer[4] = (chunk.len() & 0xFF) as u8;
                    buffer[5] = (chunk.len() >> 8) as u8;
                    buffer[6] = (page & 0xFF) as u8;
                    buffer[7] = (page >> 8) as u8;
                }
            }
            buffer[header_len..header_len + chunk.len()].copy_from_slice(chunk);
            buffer
        })
        .collect()
}

/// Returns the length of a key state input report for a model.
pub fn input_report_len(model: Model) -> usize {
    model.generation().key_state_offset() + model.key_count() as usize
}

/// Extracts per-key pressed states from an input report.
///
/// Returns `None` for reports too short to carry every key.
pub fn parse_key_states(model: Model, report: &[u8]) -> Option<Vec<bool>> {
    let offset = model.generation().key_state_offset();
    let count = model.key_count() as usize;
    report
        .get(offset..offset + count)
        .map(|states| states.iter().map(|&s| s != 0).collect())
}
