//! Per-tick audio features: RMS, spectral flux, spectral centroid and
//! high-frequency energy ratio.

use serde::Serialize;

/// Energy above this frequency counts toward `high_freq_ratio`.
pub const HIGH_FREQ_CUTOFF_HZ: f32 = 2_500.0;

/// Full-scale value of a byte magnitude bin.
const MAX_BYTE_MAGNITUDE: f32 = 255.0;

/// Features of one audio tick. Superseded every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFeatures {
    /// Root-mean-square of the time-domain window, ≥ 0.
    pub rms: f32,
    /// Sum of positive per-bin magnitude increases since the previous tick, ≥ 0.
    pub flux: f32,
    /// Magnitude-weighted mean frequency over Nyquist, in [0, 1].
    pub centroid: f32,
    /// Share of spectral energy at or above `HIGH_FREQ_CUTOFF_HZ`, in [0, 1].
    pub high_freq_ratio: f32,
}

/// Stateful extractor; keeps the previous tick's normalised magnitudes for flux.
#[derive(Debug, Clone)]
pub struct AudioFeatureExtractor {
    sample_rate: u32,
    fft_size: usize,
    magnitudes: Vec<f32>,
    previous: Vec<f32>,
    has_previous: bool,
}

impl AudioFeatureExtractor {
    pub fn new(sample_rate: u32, fft_size: usize) -> Self {
        let bins = fft_size / 2;
        Self {
            sample_rate,
            fft_size,
            magnitudes: vec![0.0; bins],
            previous: vec![0.0; bins],
            has_previous: false,
        }
    }

    /// Compute features from one time-domain window and its byte spectrum.
    pub fn extract(&mut self, time_domain: &[f32], spectrum: &[u8]) -> AudioFeatures {
        let rms = compute_rms(time_domain);

        if self.magnitudes.len() != spectrum.len() {
            // A new bin count has no comparable previous frame.
            self.magnitudes.resize(spectrum.len(), 0.0);
            self.previous.clear();
            self.previous.resize(spectrum.len(), 0.0);
            self.has_previous = false;
        }
        for (m, byte) in self.magnitudes.iter_mut().zip(spectrum) {
            *m = *byte as f32 / MAX_BYTE_MAGNITUDE;
        }

        let flux = if self.has_previous {
            self.magnitudes
                .iter()
                .zip(&self.previous)
                .map(|(now, prev)| (now - prev).max(0.0))
                .sum()
        } else {
            0.0
        };

        let bin_hz = self.sample_rate as f32 / self.fft_size as f32;
        let nyquist = self.sample_rate as f32 / 2.0;

        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        let mut energy = 0.0f32;
        let mut high_energy = 0.0f32;
        for (i, m) in self.magnitudes.iter().enumerate() {
            let freq = i as f32 * bin_hz;
            weighted += freq * m;
            total += m;
            let e = m * m;
            energy += e;
            if freq >= HIGH_FREQ_CUTOFF_HZ {
                high_energy += e;
            }
        }

        let centroid = if total > 0.0 && nyquist > 0.0 {
            (weighted / total / nyquist).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let high_freq_ratio = if energy > 0.0 {
            (high_energy / energy).clamp(0.0, 1.0)
        } else {
            0.0
        };

        std::mem::swap(&mut self.magnitudes, &mut self.previous);
        self.has_previous = true;

        AudioFeatures {
            rms,
            flux,
            centroid,
            high_freq_ratio,
        }
    }
}

/// Root-mean-square of a sample slice; 0 for an empty slice.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
