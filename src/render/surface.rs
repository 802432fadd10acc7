//! Drawing surfaces.

use thiserror::Error;
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, IntRect, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint,
    Rect, Transform,
};

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("cannot allocate a {width}x{height} surface")]
    Allocation { width: u32, height: u32 },
    #[error("failed to encode PNG: {0}")]
    Png(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Integer pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn fill_circle(&mut self, color: Rgb, x: f32, y: f32, radius: f32);
    fn fill_rect(&mut self, color: Rgb, x: f32, y: f32, width: f32, height: f32);

    /// Resets a region to fully transparent.
    fn clear_rect(&mut self, region: Region);

    fn clear(&mut self) {
        let region = Region::new(0, 0, self.width(), self.height());
        self.clear_rect(region);
    }

    /// Draws `src` of this surface into `dst_rect` of `dst`, scaling when
    /// the sizes differ.
    fn copy_region(&self, src: Region, dst: &mut Self, dst_rect: Region)
    where
        Self: Sized;

    /// Reallocates the surface. Contents are lost.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;
}

/// Software raster surface.
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        let pixmap = Pixmap::new(width, height).ok_or(SurfaceError::Allocation { width, height })?;
        Ok(Self { pixmap })
    }

    /// Wraps opaque RGBA8 pixels, e.g. a finished frame.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, SurfaceError> {
        let pixmap = IntSize::from_wh(width, height)
            .and_then(|size| Pixmap::from_vec(data, size))
            .ok_or(SurfaceError::Allocation { width, height })?;
        Ok(Self { pixmap })
    }

    /// Premultiplied RGBA8 pixels, row-major.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn save_png(&self, path: &std::path::Path) -> Result<(), SurfaceError> {
        self.pixmap
            .save_png(path)
            .map_err(|e| SurfaceError::Png(e.to_string()))
    }

    fn solid(color: Rgb) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, 255);
        paint.anti_alias = true;
        paint
    }
}

impl Surface for Canvas {
    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
    }

    fn fill_circle(&mut self, color: Rgb, x: f32, y: f32, radius: f32) {
        if !(radius > 0.0) || !x.is_finite() || !y.is_finite() {
            return;
        }
        let Some(path) = PathBuilder::from_circle(x, y, radius) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &Self::solid(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }

    fn fill_rect(&mut self, color: Rgb, x: f32, y: f32, width: f32, height: f32) {
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return;
        };
        self.pixmap
            .fill_rect(rect, &Self::solid(color), Transform::identity(), None);
    }

    fn clear_rect(&mut self, region: Region) {
        if region.is_empty() {
            return;
        }
        let Some(rect) = Rect::from_xywh(
            region.x as f32,
            region.y as f32,
            region.width as f32,
            region.height as f32,
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.blend_mode = BlendMode::Clear;
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    fn copy_region(&self, src: Region, dst: &mut Self, dst_rect: Region) {
        if src.is_empty() || dst_rect.is_empty() {
            return;
        }
        let Some(src_rect) = IntRect::from_xywh(src.x, src.y, src.width, src.height) else {
            return;
        };
        // Clipped to the source bounds; None when fully outside.
        let Some(patch) = self.pixmap.clone_rect(src_rect) else {
            return;
        };

        let scale_x = dst_rect.width as f32 / src.width as f32;
        let scale_y = dst_rect.height as f32 / src.height as f32;
        let scaled = scale_x != 1.0 || scale_y != 1.0;

        let paint = PixmapPaint {
            quality: if scaled {
                FilterQuality::Bilinear
            } else {
                FilterQuality::Nearest
            },
            ..PixmapPaint::default()
        };
        let transform = Transform::from_scale(scale_x, scale_y)
            .post_translate(dst_rect.x as f32, dst_rect.y as f32);

        dst.pixmap
            .draw_pixmap(0, 0, patch.as_ref(), &paint, transform, None);
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.pixmap = Pixmap::new(width, height).ok_or(SurfaceError::Allocation { width, height })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha_at(canvas: &Canvas, x: u32, y: u32) -> u8 {
        canvas.data()[((y * canvas.width() + x) * 4 + 3) as usize]
    }

    #[test]
    fn zero_sized_canvas_is_an_error() {
        assert!(matches!(
            Canvas::new(0, 10),
            Err(SurfaceError::Allocation { width: 0, height: 10 })
        ));
    }

    #[test]
    fn circle_paints_and_clear_rect_erases() {
        let mut canvas = Canvas::new(40, 40).unwrap();
        canvas.fill_circle(Rgb::WHITE, 20.0, 20.0, 8.0);
        assert_eq!(alpha_at(&canvas, 20, 20), 255);

        canvas.clear_rect(Region::new(10, 10, 20, 20));
        assert_eq!(alpha_at(&canvas, 20, 20), 0);
    }

    #[test]
    fn degenerate_circles_are_ignored() {
        let mut canvas = Canvas::new(10, 10).unwrap();
        canvas.fill_circle(Rgb::WHITE, 5.0, 5.0, 0.0);
        canvas.fill_circle(Rgb::WHITE, f32::NAN, 5.0, 3.0);
        canvas.fill_circle(Rgb::WHITE, 5.0, 5.0, f32::NAN);
        assert!(canvas.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn copy_region_moves_pixels() {
        let mut src = Canvas::new(20, 10).unwrap();
        let mut dst = Canvas::new(20, 10).unwrap();
        src.fill_rect(Rgb::new(255, 0, 0), 0.0, 0.0, 5.0, 10.0);

        src.copy_region(Region::new(0, 0, 5, 10), &mut dst, Region::new(12, 0, 5, 10));

        assert_eq!(alpha_at(&dst, 14, 5), 255);
        assert_eq!(alpha_at(&dst, 2, 5), 0);
        let idx = ((5 * 20 + 14) * 4) as usize;
        assert_eq!(dst.data()[idx], 255);
    }

    #[test]
    fn from_rgba_checks_the_buffer_length() {
        assert!(Canvas::from_rgba(2, 2, vec![255; 16]).is_ok());
        assert!(Canvas::from_rgba(2, 2, vec![255; 15]).is_err());
    }

    #[test]
    fn resize_drops_contents() {
        let mut canvas = Canvas::new(8, 8).unwrap();
        canvas.fill_rect(Rgb::WHITE, 0.0, 0.0, 8.0, 8.0);
        canvas.resize(16, 4).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (16, 4));
        assert!(canvas.data().iter().all(|&b| b == 0));
    }
}
