use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;

/// Title and clock lines blended onto finished frames.
pub struct TextOverlay {
    font: Font,
    font_size: f32,
}

impl TextOverlay {
    pub fn from_file(path: &Path, font_size: f32) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font: {}", path.display()))?;
        Self::from_bytes(&bytes, font_size)
            .with_context(|| format!("Failed to parse font: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8], font_size: f32) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(anyhow::Error::msg)?;
        Ok(Self { font, font_size })
    }

    /// Font size for a frame: 4.6% of the shorter side, at least 24px.
    pub fn size_for(width: u32, height: u32) -> f32 {
        (width.min(height) as f32 * 0.046).max(24.0)
    }

    /// Alpha-blends `text` into an opaque RGBA8 buffer with its top-left at
    /// (x, y). Glyphs outside the frame are clipped.
    pub fn composite(&self, frame: &mut FrameBuffer<'_>, text: &str, x: u32, y: u32, color: [u8; 4]) {
        let mut pen_x = x as i32;
        let baseline = y as i32 + self.font_size as i32;

        for ch in text.chars() {
            let (metrics, coverage) = self.font.rasterize(ch, self.font_size);
            let top = baseline - metrics.height as i32 - metrics.ymin;

            for (row, line) in coverage.chunks(metrics.width.max(1)).enumerate() {
                for (col, &cov) in line.iter().enumerate() {
                    if cov > 0 {
                        frame.blend(pen_x + col as i32, top + row as i32, color, cov);
                    }
                }
            }

            pen_x += metrics.advance_width.round() as i32;
        }
    }

    pub fn line_height(&self) -> u32 {
        self.font_size.ceil() as u32
    }

    pub fn measure_width(&self, text: &str) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, self.font_size).advance_width)
            .sum();
        width.ceil() as u32
    }
}

/// Mutable view of an RGBA8 frame.
pub struct FrameBuffer<'a> {
    pub pixels: &'a mut [u8],
    pub width: u32,
    pub height: u32,
}

impl FrameBuffer<'_> {
    fn blend(&mut self, x: i32, y: i32, color: [u8; 4], coverage: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let Some(px) = self.pixels.get_mut(idx..idx + 4) else {
            return;
        };

        let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
        for (dst, &src) in px.iter_mut().zip(&color[..3]) {
            *dst = (src as f32 * a + *dst as f32 * (1.0 - a)).round() as u8;
        }
        px[3] = 255;
    }
}

/// `m:ss` clock, or `h:mm:ss` past an hour.
pub fn format_elapsed(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
