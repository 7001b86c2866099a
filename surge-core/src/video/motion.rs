//! Luma conversion and temporal differencing.
//!
//! Each frame is reduced to an 8-bit luma plane
//! (`0.299 R + 0.587 G + 0.114 B`). Against the previous plane it yields the
//! global mean absolute difference and a coarse per-cell grid of motion
//! intensity in [0, 1]. Luma planes are swapped, not reallocated.

use image::RgbaImage;

/// A cell whose mean luma difference reaches this value saturates at 1.
pub const CELL_DIFF_NORMALIZATION: f32 = 64.0;

/// Output of one differencing step.
#[derive(Debug, Clone, Copy)]
pub struct MotionSample<'a> {
    /// Mean absolute luma difference over the whole canvas, ≥ 0.
    pub mean_luma_diff: f32,
    /// Row-major `grid_dim × grid_dim` motion intensities in [0, 1].
    pub grid: &'a [f32],
}

#[derive(Debug, Clone)]
pub struct FrameDifferencer {
    size: u32,
    grid_dim: usize,
    luma: Vec<u8>,
    previous: Vec<u8>,
    has_previous: bool,
    mean_luma_diff: f32,
    grid: Vec<f32>,
}

/// Heatmap grid edge for a `target_size` canvas and `scale` pixels per cell.
pub fn grid_dim_for(target_size: u32, scale: u32) -> usize {
    (target_size / scale.max(1)).max(1) as usize
}

/// Perceptual luma of an RGB triple, rounded to u8.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

impl FrameDifferencer {
    pub fn new(size: u32, grid_dim: usize) -> Self {
        let pixels = (size as usize) * (size as usize);
        let grid_dim = grid_dim.max(1);
        Self {
            size,
            grid_dim,
            luma: vec![0; pixels],
            previous: vec![0; pixels],
            has_previous: false,
            mean_luma_diff: 0.0,
            grid: vec![0.0; grid_dim * grid_dim],
        }
    }

    pub fn grid_dim(&self) -> usize {
        self.grid_dim
    }

    /// Difference `canvas` (a `size × size` frame) against the previous one.
    ///
    /// The first frame after construction or `reset` only primes the
    /// previous plane and returns `None`.
    pub fn process(&mut self, canvas: &RgbaImage) -> Option<MotionSample<'_>> {
        debug_assert_eq!(canvas.dimensions(), (self.size, self.size));
        for (dst, px) in self.luma.iter_mut().zip(canvas.pixels()) {
            *dst = luma(px[0], px[1], px[2]);
        }

        let primed = self.has_previous;
        if primed {
            self.compute_diffs();
        }

        std::mem::swap(&mut self.luma, &mut self.previous);
        self.has_previous = true;

        if !primed {
            return None;
        }
        Some(MotionSample {
            mean_luma_diff: self.mean_luma_diff,
            grid: &self.grid,
        })
    }
}

impl FrameDifferencer {
    fn compute_diffs(&mut self) {
        let size = self.size as usize;
        let pixels = self.luma.len();

        let total: u64 = self
            .luma
            .iter()
            .zip(&self.previous)
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        self.mean_luma_diff = if pixels > 0 {
            total as f32 / pixels as f32
        } else {
            0.0
        };

        let cell = size as f32 / self.grid_dim as f32;
        for gy in 0..self.grid_dim {
            let y0 = (gy as f32 * cell).floor() as usize;
            let y1 = (((gy + 1) as f32 * cell).floor() as usize).min(size);
            for gx in 0..self.grid_dim {
                let x0 = (gx as f32 * cell).floor() as usize;
                let x1 = (((gx + 1) as f32 * cell).floor() as usize).min(size);

                let mut sum = 0u64;
                let mut count = 0u64;
                for y in y0..y1 {
                    let row = y * size;
                    for x in x0..x1 {
                        sum += self.luma[row + x].abs_diff(self.previous[row + x]) as u64;
                        count += 1;
                    }
                }
                let avg = if count > 0 {
                    sum as f32 / count as f32
                } else {
                    0.0
                };
                self.grid[gy * self.grid_dim + gx] = (avg / CELL_DIFF_NORMALIZATION).min(1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgba;

    fn solid(size: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(size, size, Rgba([v, v, v, 255]))
    }

    #[test]
    fn luma_weights() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn grid_dim_floors_and_never_hits_zero() {
        assert_eq!(grid_dim_for(416, 8), 52);
        assert_eq!(grid_dim_for(4, 8), 1);
        assert_eq!(grid_dim_for(100, 0), 100);
    }

    #[test]
    fn first_frame_only_primes() {
        let mut d = FrameDifferencer::new(8, 2);
        assert!(d.process(&solid(8, 100)).is_none());
        assert!(d.process(&solid(8, 100)).is_some());
    }

    #[test]
    fn global_and_cell_diffs() {
        let mut d = FrameDifferencer::new(8, 2);
        d.process(&solid(8, 0));

        // Brighten only the top-left 4×4 quadrant by 128.
        let mut next = solid(8, 0);
        for y in 0..4 {
            for x in 0..4 {
                next.put_pixel(x, y, Rgba([128, 128, 128, 255]));
            }
        }
        let sample = d.process(&next).expect("second frame differs");
        assert_relative_eq!(sample.mean_luma_diff, 32.0);
        assert_eq!(sample.grid, &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn cell_impulse_scales_below_normalization() {
        let mut d = FrameDifferencer::new(4, 1);
        d.process(&solid(4, 10));
        let sample = d.process(&solid(4, 42)).expect("diff");
        assert_relative_eq!(sample.grid[0], 0.5);
    }
}
