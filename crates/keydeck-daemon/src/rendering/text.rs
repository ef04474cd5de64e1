//! Text rendering using fontdue.

use fontdue::{Font, FontSettings, Metrics};
use image::{Rgb, RgbImage};

/// Embedded DejaVu Sans Mono font.
const FONT_DATA: &[u8] = include_bytes!("../../fonts/DejaVuSansMono.ttf");

/// Ink bounding box of a line of text, relative to the pen origin on the
/// baseline (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl TextBounds {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// A rasterized glyph and the pen position it is drawn at.
struct PlacedGlyph {
    pen_x: i32,
    metrics: Metrics,
    bitmap: Vec<u8>,
}

impl PlacedGlyph {
    fn is_blank(&self) -> bool {
        self.metrics.width == 0 || self.metrics.height == 0
    }

    fn left(&self) -> i32 {
        self.pen_x + self.metrics.xmin
    }

    fn top(&self) -> i32 {
        -(self.metrics.ymin + self.metrics.height as i32)
    }
}

/// Text renderer using fontdue for rasterization.
pub struct TextRenderer {
    font: Font,
}

impl TextRenderer {
    /// Creates a new text renderer with the embedded font.
    pub fn new() -> Self {
        let font = Font::from_bytes(FONT_DATA, FontSettings::default())
            .expect("Failed to load embedded font");
        Self { font }
    }

    fn layout(&self, text: &str, size: f32) -> Vec<PlacedGlyph> {
        let mut pen_x = 0;
        text.chars()
            .map(|ch| {
                let (metrics, bitmap) = self.font.rasterize(ch, size);
                let glyph = PlacedGlyph {
                    pen_x,
                    metrics,
                    bitmap,
                };
                pen_x += metrics.advance_width.round() as i32;
                glyph
            })
            .collect()
    }

    /// Measures the ink bounding box of `text`.
    ///
    /// Returns `None` when nothing would be drawn (empty or whitespace only).
    pub fn measure(&self, text: &str, size: f32) -> Option<TextBounds> {
        bounds(&self.layout(text, size))
    }

    /// Draws text with its pen origin at `(x, baseline)`.
    ///
    /// `color` is RGB888 (0xRRGGBB); glyph coverage is alpha blended over the
    /// existing pixels.
    pub fn draw_text(
        &self,
        image: &mut RgbImage,
        x: i32,
        baseline: i32,
        text: &str,
        size: f32,
        color: u32,
    ) {
        draw_glyphs(image, &self.layout(text, size), x, baseline, color);
    }

    /// Draws text centered horizontally and vertically on its ink box.
    pub fn draw_centered(&self, image: &mut RgbImage, text: &str, size: f32, color: u32) {
        let Some(b) = self.measure(text, size) else {
            return;
        };

        let x = (image.width() as i32 - b.width()) / 2 - b.left;
        let baseline = (image.height() as i32 - b.height()) / 2 - b.top;
        self.draw_text(image, x, baseline, text, size, color);
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn bounds(glyphs: &[PlacedGlyph]) -> Option<TextBounds> {
    glyphs
        .iter()
        .filter(|g| !g.is_blank())
        .map(|g| TextBounds {
            left: g.left(),
            top: g.top(),
            right: g.left() + g.metrics.width as i32,
            bottom: g.top() + g.metrics.height as i32,
        })
        .reduce(|a, b| TextBounds {
            left: a.left.min(b.left),
            top: a.top.min(b.top),
            right: a.right.max(b.right),
            bottom: a.bottom.max(b.bottom),
        })
}

fn draw_glyphs(image: &mut RgbImage, glyphs: &[PlacedGlyph], x: i32, baseline: i32, color: u32) {
    let ink = [
        ((color >> 16) & 0xFF) as f32,
        ((color >> 8) & 0xFF) as f32,
        (color & 0xFF) as f32,
    ];
    let (width, height) = image.dimensions();

    for glyph in glyphs.iter().filter(|g| !g.is_blank()) {
        let origin_x = x + glyph.left();
        let origin_y = baseline + glyph.top();

        for (i, &coverage) in glyph.bitmap.iter().enumerate() {
            if coverage == 0 {
                continue;
            }
            let px = origin_x + (i % glyph.metrics.width) as i32;
            let py = origin_y + (i / glyph.metrics.width) as i32;
            if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                continue;
            }

            // Alpha blend the glyph
            let alpha = coverage as f32 / 255.0;
            let Rgb(pixel) = image.get_pixel_mut(px as u32, py as u32);
            for (channel, &c) in pixel.iter_mut().zip(&ink) {
                *channel = (c * alpha + *channel as f32 * (1.0 - alpha)).round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure() {
        let renderer = TextRenderer::new();
        let b = renderer.measure("Hello", 14.0).unwrap();
        assert!(b.width() > 0);
        assert!(b.height() > 0);
        assert!(b.top < 0, "caps rise above the baseline");

        assert!(renderer.measure("", 14.0).is_none());
        assert!(renderer.measure("   ", 14.0).is_none());
    }

    #[test]
    fn test_wider_text_measures_wider() {
        let renderer = TextRenderer::new();
        let short = renderer.measure("Hi", 14.0).unwrap();
        let long = renderer.measure("Hello there", 14.0).unwrap();
        assert!(long.width() > short.width());
    }

    #[test]
    fn test_draw_text() {
        let renderer = TextRenderer::new();
        let mut image = RgbImage::new(100, 50);
        renderer.draw_text(&mut image, 10, 30, "Test", 14.0, 0xFFFFFF);
        assert!(image.pixels().any(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn test_draw_centered_matches_measured_box() {
        let renderer = TextRenderer::new();
        let b = renderer.measure("Hi", 14.0).unwrap();
        let mut image = RgbImage::new(72, 72);
        renderer.draw_centered(&mut image, "Hi", 14.0, 0xFFFFFF);

        let lit: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [0, 0, 0])
            .map(|(x, y, _)| (x, y))
            .collect();
        let left = lit.iter().map(|p| p.0).min().unwrap() as i32;
        let top = lit.iter().map(|p| p.1).min().unwrap() as i32;
        assert!((left - (72 - b.width()) / 2).abs() <= 1, "left {}", left);
        assert!((top - (72 - b.height()) / 2).abs() <= 1, "top {}", top);
    }

    #[test]
    fn test_draw_clips_outside_image() {
        let renderer = TextRenderer::new();
        let mut image = RgbImage::new(8, 8);
        renderer.draw_text(&mut image, -20, 100, "Clipped", 14.0, 0xFFFFFF);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
