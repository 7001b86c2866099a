//! Rolling baseline used to normalise per-feature values into z-scores.
//!
//! ## Algorithm
//!
//! 1. Keep the last `capacity` samples in insertion order (FIFO eviction).
//! 2. Below `MIN_WARM_SAMPLES` the baseline is cold: mean = 0, std = 1, so a
//!    z-score is simply the raw value.
//! 3. Once warm, mean and population standard deviation come from the window;
//!    std is floored to `STD_FLOOR` so constant input never divides by zero.

use std::collections::VecDeque;

/// Samples required before mean/std are taken from the window.
pub const MIN_WARM_SAMPLES: usize = 8;

/// Lower bound for the standard deviation.
pub const STD_FLOOR: f32 = 1e-6;

/// Capacity-bounded history of one scalar feature.
#[derive(Debug, Clone)]
pub struct RollingBaseline {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingBaseline {
    /// Create an empty baseline holding at most `capacity` samples (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// `(mean, std)` of the window, or `(0, 1)` while cold.
    pub fn stats(&self) -> (f32, f32) {
        let n = self.samples.len();
        if n < MIN_WARM_SAMPLES {
            return (0.0, 1.0);
        }
        let mean = self.samples.iter().sum::<f32>() / n as f32;
        let var = self
            .samples
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f32>()
            / n as f32;
        (mean, var.sqrt().max(STD_FLOOR))
    }

    pub fn zscore(&self, value: f32) -> f32 {
        let (mean, std) = self.stats();
        (value - mean) / std
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_warm(&self) -> bool {
        self.samples.len() >= MIN_WARM_SAMPLES
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
