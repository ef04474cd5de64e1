//! Key face rendering.
//!
//! Each configured key is rendered once at startup, in priority order:
//! icon, then text, then a blank black face. A missing icon file yields a
//! blank face; an icon that exists but cannot be decoded falls back to the
//! key's text.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::text::TextRenderer;
use crate::config::KeyConfig;

/// Label font size in pixels.
const FONT_SIZE: f32 = 14.0;

/// Label color.
const COLOR_WHITE: u32 = 0xFFFFFF;

/// Reasons an icon could not be used. Always recovered per key.
#[derive(Error, Debug)]
pub enum IconError {
    #[error("Icon file not found: {0}")]
    NotFound(PathBuf),

    #[error("Error loading icon {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Renders key faces for one device.
pub struct KeyRenderer {
    program_dir: PathBuf,
    text: TextRenderer,
}

impl KeyRenderer {
    /// Creates a renderer resolving icon directories against `program_dir`.
    pub fn new(program_dir: impl Into<PathBuf>) -> Self {
        Self {
            program_dir: program_dir.into(),
            text: TextRenderer::new(),
        }
    }

    /// Resolves the icon path of a key, if it has one.
    pub fn icon_path(&self, key: &KeyConfig) -> Option<PathBuf> {
        key.icon
            .as_ref()
            .map(|icon| self.program_dir.join(key.base_icon_dir()).join(icon))
    }

    /// Renders a key face of exactly `size`.
    pub fn render(&self, size: (u32, u32), key: &KeyConfig) -> RgbImage {
        let (width, height) = size;

        if let Some(path) = self.icon_path(key) {
            return match load_icon(&path, size) {
                Ok(icon) => composite_over_black(&icon),
                Err(e @ IconError::NotFound(_)) => {
                    warn!("Key {}: {}", key.index, e);
                    log_icon_dir(&self.program_dir.join(key.base_icon_dir()));
                    blank(width, height)
                }
                Err(e @ IconError::Decode { .. }) => {
                    warn!("Key {}: {}", key.index, e);
                    match key.text.as_deref() {
                        Some(text) => self.render_text(size, text),
                        None => blank(width, height),
                    }
                }
            };
        }

        match key.text.as_deref() {
            Some(text) => self.render_text(size, text),
            None => blank(width, height),
        }
    }

    /// Draws `text` centered in white on black.
    pub fn render_text(&self, size: (u32, u32), text: &str) -> RgbImage {
        let mut image = blank(size.0, size.1);
        self.text
            .draw_centered(&mut image, text, FONT_SIZE, COLOR_WHITE);
        image
    }
}

/// Returns a black canvas.
pub fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

/// Loads an icon as RGBA and resizes it to exactly `size`.
pub fn load_icon(path: &Path, size: (u32, u32)) -> Result<RgbaImage, IconError> {
    debug!("Looking for icon at: {}", path.display());
    if !path.exists() {
        return Err(IconError::NotFound(path.to_path_buf()));
    }

    let icon = image::open(path)
        .map_err(|source| IconError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .into_rgba8();
    Ok(imageops::resize(&icon, size.0, size.1, FilterType::Triangle))
}

/// Alpha composites an RGBA image over an opaque black canvas of its size.
pub fn composite_over_black(icon: &RgbaImage) -> RgbImage {
    let mut canvas = RgbaImage::from_pixel(icon.width(), icon.height(), Rgba([0, 0, 0, 255]));
    imageops::overlay(&mut canvas, icon, 0, 0);
    image::DynamicImage::ImageRgba8(canvas).into_rgb8()
}

/// Lists the icon directory to help spot misnamed icon files.
fn log_icon_dir(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    info!("Files in {}: {:?}", dir.display(), names);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SIZE: (u32, u32) = (72, 72);

    fn program_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("icons")).unwrap();
        dir
    }

    fn key(icon: Option<&str>, text: Option<&str>) -> KeyConfig {
        KeyConfig {
            icon: icon.map(PathBuf::from),
            text: text.map(str::to_string),
            ..KeyConfig::default()
        }
    }

    fn is_black(image: &RgbImage) -> bool {
        image.pixels().all(|p| p.0 == [0, 0, 0])
    }

    /// Ink bounding box as (left, top, right, bottom), inclusive.
    fn ink_box(image: &RgbImage) -> (u32, u32, u32, u32) {
        let lit: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [0, 0, 0])
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty(), "nothing drawn");
        (
            lit.iter().map(|p| p.0).min().unwrap(),
            lit.iter().map(|p| p.1).min().unwrap(),
            lit.iter().map(|p| p.0).max().unwrap(),
            lit.iter().map(|p| p.1).max().unwrap(),
        )
    }

    fn assert_centered(image: &RgbImage) {
        let (left, top, right, bottom) = ink_box(image);
        let (w, h) = image.dimensions();
        let (margin_l, margin_r) = (left as i32, (w - 1 - right) as i32);
        let (margin_t, margin_b) = (top as i32, (h - 1 - bottom) as i32);
        assert!((margin_l - margin_r).abs() <= 3, "{} vs {}", margin_l, margin_r);
        assert!((margin_t - margin_b).abs() <= 3, "{} vs {}", margin_t, margin_b);
    }

    #[test]
    fn test_empty_key_is_black() {
        let dir = program_dir();
        let renderer = KeyRenderer::new(dir.path());
        for size in [(72, 72), (80, 80), (96, 96), (10, 30)] {
            let image = renderer.render(size, &key(None, None));
            assert_eq!(image.dimensions(), size);
            assert!(is_black(&image));
        }
    }

    #[test]
    fn test_text_is_centered_white() {
        let dir = program_dir();
        let renderer = KeyRenderer::new(dir.path());
        let image = renderer.render(SIZE, &key(None, Some("Hi")));
        assert_eq!(image.dimensions(), SIZE);
        assert!(image.pixels().any(|p| p.0 == [255, 255, 255]));
        assert_centered(&image);
    }

    #[test]
    fn test_opaque_icon_fills_key() {
        let dir = program_dir();
        RgbaImage::from_pixel(16, 16, Rgba([10, 200, 30, 255]))
            .save(dir.path().join("icons/green.png"))
            .unwrap();

        let renderer = KeyRenderer::new(dir.path());
        let image = renderer.render(SIZE, &key(Some("green.png"), None));
        assert_eq!(image.dimensions(), SIZE);
        for p in image.pixels() {
            for (got, want) in p.0.iter().zip([10u8, 200, 30]) {
                assert!(got.abs_diff(want) <= 1, "{:?}", p);
            }
        }
    }

    #[test]
    fn test_icon_alpha_composites_over_black() {
        let dir = program_dir();
        let mut icon = RgbaImage::from_pixel(SIZE.0, SIZE.1, Rgba([255, 255, 255, 0]));
        for x in 0..SIZE.0 / 2 {
            for y in 0..SIZE.1 {
                icon.put_pixel(x, y, Rgba([200, 100, 50, 255]));
            }
        }
        icon.save(dir.path().join("icons/half.png")).unwrap();

        let renderer = KeyRenderer::new(dir.path());
        let image = renderer.render(SIZE, &key(Some("half.png"), Some("ignored")));

        let icon = load_icon(&dir.path().join("icons/half.png"), SIZE).unwrap();
        let expected = composite_over_black(&icon);
        assert_eq!(image, expected);
        assert_eq!(image.get_pixel(5, 5).0, [200, 100, 50]);
        assert_eq!(image.get_pixel(SIZE.0 - 5, 5).0, [0, 0, 0]);
    }

    #[test]
    fn test_custom_icon_dir() {
        let dir = program_dir();
        std::fs::create_dir(dir.path().join("art")).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
            .save(dir.path().join("art/red.png"))
            .unwrap();

        let renderer = KeyRenderer::new(dir.path());
        let key = KeyConfig {
            icon: Some(PathBuf::from("red.png")),
            base_icon_dir: Some("art".to_string()),
            ..KeyConfig::default()
        };
        assert_eq!(
            renderer.icon_path(&key).unwrap(),
            dir.path().join("art").join("red.png")
        );
        assert_eq!(renderer.render(SIZE, &key).get_pixel(36, 36).0, [255, 0, 0]);
    }

    #[test]
    fn test_missing_icon_is_blank_even_with_text() {
        let dir = program_dir();
        let renderer = KeyRenderer::new(dir.path());

        let image = renderer.render(SIZE, &key(Some("nope.png"), Some("Hi")));
        assert_eq!(image.dimensions(), SIZE);
        assert!(is_black(&image));

        // Missing icon directory entirely
        let image = renderer.render(
            SIZE,
            &KeyConfig {
                icon: Some(PathBuf::from("nope.png")),
                base_icon_dir: Some("missing".to_string()),
                ..KeyConfig::default()
            },
        );
        assert!(is_black(&image));
    }

    #[test]
    fn test_corrupt_icon_falls_back_to_text() {
        let dir = program_dir();
        std::fs::write(dir.path().join("icons/broken.png"), b"not an image").unwrap();
        let renderer = KeyRenderer::new(dir.path());

        let image = renderer.render(SIZE, &key(Some("broken.png"), Some("Hi")));
        assert_eq!(image, renderer.render_text(SIZE, "Hi"));
        assert_centered(&image);

        let image = renderer.render(SIZE, &key(Some("broken.png"), None));
        assert!(is_black(&image));
    }

    #[test]
    fn test_load_icon_errors() {
        let dir = program_dir();
        assert!(matches!(
            load_icon(&dir.path().join("icons/none.png"), SIZE),
            Err(IconError::NotFound(_))
        ));

        std::fs::write(dir.path().join("icons/bad.jpg"), [0xFF, 0xD8, 0x00]).unwrap();
        assert!(matches!(
            load_icon(&dir.path().join("icons/bad.jpg"), SIZE),
            Err(IconError::Decode { .. })
        ));
    }
}
