//! Content recordings rasterized on demand into CPU bitmaps

use std::fmt::Debug;

use image::RgbaImage;

use crate::color::Color;
use crate::geometry::{IntRect, Rect};

/// A recording that can be replayed into a premultiplied RGBA8 bitmap.
///
/// Bitmap pixel `(x, y)` covers the scaled-content pixel
/// `(content_rect.x + x, content_rect.y + y)`; content space coordinates
/// are multiplied by `contents_scale` before rasterization.
pub trait Picture: Debug + Send + Sync {
    fn raster(&self, bitmap: &mut RgbaImage, content_rect: IntRect, contents_scale: f32);
}

/// Recording made of filled rectangles, drawn in order with source-over
#[derive(Clone, Debug, Default)]
pub struct RectPicture {
    fills: Vec<(Rect, Color)>,
}

impl RectPicture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(mut self, rect: Rect, color: Color) -> Self {
        self.fills.push((rect, color));
        self
    }
}

impl Picture for RectPicture {
    fn raster(&self, bitmap: &mut RgbaImage, content_rect: IntRect, contents_scale: f32) {
        for pixel in bitmap.pixels_mut() {
            pixel.0 = [0; 4];
        }
        let (width, height) = bitmap.dimensions();
        for (rect, color) in &self.fills {
            let scaled = rect
                .scale(contents_scale, contents_scale)
                .offset(-content_rect.x as f32, -content_rect.y as f32);
            let [r, g, b, a] = color.premultiplied(1.0);
            let x0 = scaled.x().round().max(0.0) as u32;
            let y0 = scaled.y().round().max(0.0) as u32;
            let x1 = (scaled.right().round().max(0.0) as u32).min(width);
            let y1 = (scaled.bottom().round().max(0.0) as u32).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    let dst = bitmap.get_pixel_mut(x, y);
                    let inv = 1.0 - a;
                    let blend = |src: f32, dst: u8| {
                        ((src + dst as f32 / 255.0 * inv) * 255.0).round().clamp(0.0, 255.0) as u8
                    };
                    dst.0 = [
                        blend(r, dst.0[0]),
                        blend(g, dst.0[1]),
                        blend(b, dst.0[2]),
                        blend(a, dst.0[3]),
                    ];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_picture_fills_scaled_region() {
        let picture = RectPicture::new().fill(Rect::new(0.0, 0.0, 2.0, 2.0), Color::RED);
        let mut bitmap = RgbaImage::new(8, 8);
        picture.raster(&mut bitmap, IntRect::new(0, 0, 8, 8), 2.0);
        assert_eq!(bitmap.get_pixel(3, 3).0, [255, 0, 0, 255]);
        assert_eq!(bitmap.get_pixel(4, 4).0, [0, 0, 0, 0]);
    }

    #[test]
    fn content_rect_offsets_raster() {
        let picture = RectPicture::new().fill(Rect::new(4.0, 0.0, 4.0, 4.0), Color::BLUE);
        let mut bitmap = RgbaImage::new(4, 4);
        picture.raster(&mut bitmap, IntRect::new(4, 0, 4, 4), 1.0);
        assert_eq!(bitmap.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }
}
