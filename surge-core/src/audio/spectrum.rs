//! Byte magnitude spectrum in the style of a browser analyser node.
//!
//! ## Pipeline (per call)
//!
//! ```text
//! time-domain[fft_size] × Blackman window → FFT → |X[k]| / N
//!     → temporal smoothing (τ = 0.2) → dB → byte over [-100, -30] dB
//! ```
//!
//! Only the first `fft_size / 2` bins are reported. All buffers are allocated
//! once in `new` and reused every tick.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{Result, SurgeError};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.2;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    sample_rate: u32,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
}

impl SpectrumAnalyzer {
    /// # Errors
    /// `SurgeError::UnsupportedEnvironment` when `fft_size` is not a power of
    /// two in 32..=32768 or `sample_rate` is zero.
    pub fn new(fft_size: usize, sample_rate: u32) -> Result<Self> {
        if !fft_size.is_power_of_two() || !(32..=32_768).contains(&fft_size) {
            return Err(SurgeError::UnsupportedEnvironment(format!(
                "fft size {fft_size} must be a power of two in 32..=32768"
            )));
        }
        if sample_rate == 0 {
            return Err(SurgeError::UnsupportedEnvironment(
                "audio track reports a zero sample rate".into(),
            ));
        }

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Ok(Self {
            fft,
            fft_size,
            sample_rate,
            window: build_blackman_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            smoothing: DEFAULT_SMOOTHING,
        })
    }

    /// Temporal smoothing constant in [0, 1); 0 disables smoothing.
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.clamp(0.0, 0.99);
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Transform the newest `fft_size` samples into `out` (one byte per bin).
    ///
    /// Shorter input is zero-padded at the front; `out` must hold `bin_count()` bytes.
    pub fn process(&mut self, time_domain: &[f32], out: &mut [u8]) {
        let n = self.fft_size;
        let take = time_domain.len().min(n);
        let pad = n - take;
        let src = &time_domain[time_domain.len() - take..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { src[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (k, byte) in out.iter_mut().take(self.bin_count()).enumerate() {
            let mag = self.buffer[k].norm() * scale;
            let smoothed = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * mag;
            self.smoothed[k] = smoothed;

            *byte = if smoothed <= 0.0 {
                0
            } else {
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            };
        }
    }
}

fn build_blackman_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
