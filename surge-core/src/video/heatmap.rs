//! Exponentially decayed motion heatmap and its colour raster.
//!
//! Each cell is an EMA of motion impulses:
//! `accum = accum · decay + impulse · (1 − decay)`, so with impulses in [0, 1]
//! every cell stays in [0, 1]. Stale motion fades but never snaps to zero.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops, ImageFormat, Rgba, RgbaImage};

use crate::error::Result;

pub const DEFAULT_HEATMAP_DECAY: f32 = 0.92;

/// Decay must stay below 1 or the map never fades.
pub const MAX_HEATMAP_DECAY: f32 = 0.999;

/// Peak alpha of a fully saturated cell.
const MAX_ALPHA: f32 = 210.0;

#[derive(Debug, Clone)]
pub struct HeatmapAccumulator {
    grid_dim: usize,
    decay: f32,
    cells: Vec<f32>,
}

impl HeatmapAccumulator {
    pub fn new(grid_dim: usize, decay: f32) -> Self {
        let grid_dim = grid_dim.max(1);
        Self {
            grid_dim,
            decay: if decay.is_finite() {
                decay.clamp(0.0, MAX_HEATMAP_DECAY)
            } else {
                DEFAULT_HEATMAP_DECAY
            },
            cells: vec![0.0; grid_dim * grid_dim],
        }
    }

    pub fn grid_dim(&self) -> usize {
        self.grid_dim
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.cells[y * self.grid_dim + x]
    }

    /// Blend one grid of impulses (clamped to [0, 1]) into the accumulator.
    pub fn accumulate(&mut self, impulses: &[f32]) {
        let keep = self.decay;
        let gain = 1.0 - self.decay;
        for (cell, impulse) in self.cells.iter_mut().zip(impulses) {
            *cell = *cell * keep + impulse.clamp(0.0, 1.0) * gain;
        }
    }

    /// Render the grid through the colour ramp, upsampled with bilinear
    /// smoothing to `display_size × display_size`.
    pub fn render(&self, display_size: u32) -> RgbaImage {
        let dim = self.grid_dim as u32;
        let mut grid = RgbaImage::new(dim, dim);
        for (i, px) in grid.pixels_mut().enumerate() {
            *px = heat_color(self.cells[i]);
        }
        let display_size = display_size.max(1);
        if display_size == dim {
            return grid;
        }
        imageops::resize(&grid, display_size, display_size, imageops::FilterType::Triangle)
    }
}

/// Colour ramp: red ∝ v, green ∝ √v, blue ∝ 1 − v, alpha ∝ v.
pub fn heat_color(value: f32) -> Rgba<u8> {
    let v = value.clamp(0.0, 1.0);
    Rgba([
        (255.0 * v).floor() as u8,
        (255.0 * v.sqrt()).floor() as u8,
        (255.0 * (1.0 - v)).floor() as u8,
        (MAX_ALPHA * v).floor() as u8,
    ])
}

/// Encode a raster as PNG bytes.
pub fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    raster.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encode a raster as a `data:image/png;base64,...` URL.
pub fn to_data_url(raster: &RgbaImage) -> Result<String> {
    let png = encode_png(raster)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn ema_update_matches_formula() {
        let mut h = HeatmapAccumulator::new(1, 0.92);
        h.accumulate(&[1.0]);
        assert_relative_eq!(h.value(0, 0), 0.08, epsilon = 1e-6);
        h.accumulate(&[0.0]);
        assert_relative_eq!(h.value(0, 0), 0.08 * 0.92, epsilon = 1e-6);
    }

    #[test]
    fn stale_motion_fades_without_snapping_to_zero() {
        let mut h = HeatmapAccumulator::new(2, 0.92);
        h.accumulate(&[1.0, 1.0, 1.0, 1.0]);
        for _ in 0..50 {
            h.accumulate(&[0.0; 4]);
        }
        let v = h.value(1, 1);
        assert!(v > 0.0 && v < 0.01, "v={v}");
    }

    #[test]
    fn full_decay_is_capped_so_the_map_still_fades() {
        let mut h = HeatmapAccumulator::new(1, 1.0);
        assert_eq!(h.decay(), MAX_HEATMAP_DECAY);
        h.accumulate(&[1.0]);
        let first = h.value(0, 0);
        assert!(first > 0.0);
        h.accumulate(&[0.0]);
        assert!(h.value(0, 0) < first);

        assert_eq!(HeatmapAccumulator::new(1, f32::NAN).decay(), DEFAULT_HEATMAP_DECAY);
    }

    #[test]
    fn color_ramp_endpoints() {
        assert_eq!(heat_color(0.0), Rgba([0, 0, 255, 0]));
        assert_eq!(heat_color(1.0), Rgba([255, 255, 0, 210]));
        assert_eq!(heat_color(0.25), Rgba([63, 127, 191, 52]));
    }

    #[test]
    fn render_upsamples_to_display_size() {
        let mut h = HeatmapAccumulator::new(4, 0.5);
        h.accumulate(&[1.0; 16]);
        let raster = h.render(32);
        assert_eq!(raster.dimensions(), (32, 32));
        let same = h.render(4);
        assert_eq!(same.dimensions(), (4, 4));
        assert_eq!(same.get_pixel(0, 0), &heat_color(0.5));
    }

    #[test]
    fn data_url_has_png_prefix() {
        let h = HeatmapAccumulator::new(2, 0.92);
        let url = to_data_url(&h.render(8)).expect("encode png");
        assert!(url.starts_with("data:image/png;base64,"));
        let png = encode_png(&h.render(8)).expect("encode png");
        assert_eq!(&png[1..4], b"PNG");
    }

    proptest! {
        #[test]
        fn cells_stay_in_unit_range(
            impulses in proptest::collection::vec(0.0f32..=1.0, 1..300),
            decay in 0.0f32..0.9999,
        ) {
            let mut h = HeatmapAccumulator::new(1, decay);
            for i in impulses {
                h.accumulate(&[i]);
                let v = h.value(0, 0);
                prop_assert!((0.0..=1.0).contains(&v), "v={}", v);
            }
        }
    }
}
