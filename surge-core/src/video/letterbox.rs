//! Aspect-preserving fit of an arbitrary frame into a square analysis canvas.
//!
//! The frame is scaled to fit, centred, and the uncovered area is transparent
//! black. The canvas is allocated once and cleared every frame.

use image::{imageops, Rgba, RgbaImage};

/// Frames smaller than this on either axis are skipped.
pub const MIN_FRAME_EDGE: u32 = 2;

const FILL: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone)]
pub struct Letterboxer {
    size: u32,
    canvas: RgbaImage,
}

impl Letterboxer {
    pub fn new(size: u32) -> Self {
        let size = size.max(1);
        Self {
            size,
            canvas: RgbaImage::from_pixel(size, size, FILL),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Fit `frame` into the canvas. Returns `None` for frames under 2×2.
    pub fn fit(&mut self, frame: &RgbaImage) -> Option<&RgbaImage> {
        let (w, h) = frame.dimensions();
        if w < MIN_FRAME_EDGE || h < MIN_FRAME_EDGE {
            return None;
        }

        let size = self.size as f32;
        let scale = (size / w as f32).min(size / h as f32);
        let dw = ((w as f32 * scale).floor() as u32).clamp(1, self.size);
        let dh = ((h as f32 * scale).floor() as u32).clamp(1, self.size);
        let ox = (self.size - dw) / 2;
        let oy = (self.size - dh) / 2;

        for px in self.canvas.pixels_mut() {
            *px = FILL;
        }
        if dw == w && dh == h {
            imageops::replace(&mut self.canvas, frame, ox as i64, oy as i64);
        } else {
            let scaled = imageops::resize(frame, dw, dh, imageops::FilterType::Triangle);
            imageops::replace(&mut self.canvas, &scaled, ox as i64, oy as i64);
        }
        Some(&self.canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_frames_are_skipped() {
        let mut lb = Letterboxer::new(16);
        assert!(lb.fit(&RgbaImage::new(1, 10)).is_none());
        assert!(lb.fit(&RgbaImage::new(10, 1)).is_none());
    }

    #[test]
    fn wide_frame_is_centered_with_bars() {
        let mut lb = Letterboxer::new(16);
        let frame = RgbaImage::from_pixel(32, 16, Rgba([255, 255, 255, 255]));
        let canvas = lb.fit(&frame).expect("frame fits");
        assert_eq!(canvas.dimensions(), (16, 16));
        // Scaled to 16×8 and centred vertically at rows 4..12.
        assert_eq!(canvas.get_pixel(8, 0), &FILL);
        assert_eq!(canvas.get_pixel(8, 15), &FILL);
        assert_eq!(canvas.get_pixel(8, 8), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn exact_size_frame_is_copied() {
        let mut lb = Letterboxer::new(4);
        let frame = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let canvas = lb.fit(&frame).expect("frame fits");
        assert!(canvas.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn canvas_is_cleared_between_frames() {
        let mut lb = Letterboxer::new(8);
        lb.fit(&RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])));
        let canvas = lb
            .fit(&RgbaImage::from_pixel(8, 4, Rgba([0, 255, 0, 255])))
            .expect("frame fits");
        assert_eq!(canvas.get_pixel(0, 0), &FILL);
    }
}
