//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Tracks arrive at whatever rate their source runs at (44.1 kHz loopback,
//! 16 kHz WAV, ...). The spectrum is analysed at one fixed rate so that bin
//! frequencies and the high-frequency cutoff mean the same thing for every
//! source. `RateConverter` bridges that gap on the pipeline worker.
//!
//! When source rate == analysis rate no rubato session is created and input
//! is copied straight through.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{Result, SurgeError};

/// Input frames per rubato call.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input carried between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// `[1][output_frames_max]`, reused across calls.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `SurgeError::AudioStream` if either rate is zero or rubato rejects the
    /// configuration.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(SurgeError::AudioStream(format!(
                "invalid resampling rates {source_rate} -> {target_rate}"
            )));
        }
        let chunk_size = chunk_size.max(1);
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| SurgeError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        debug!(source_rate, target_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Convert `samples`, appending whatever output is ready to `out`.
    ///
    /// Input is accumulated until a full chunk is available; the remainder
    /// is kept for the next call.
    pub fn process_into(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(ref mut resampler) = self.resampler else {
            out.extend_from_slice(samples);
            return;
        };

        self.input_buf.extend_from_slice(samples);
        let mut offset = 0;
        while self.input_buf.len() - offset >= self.chunk_size {
            let chunk = &self.input_buf[offset..offset + self.chunk_size];
            match resampler.process_into_buffer(&[chunk], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => out.extend_from_slice(&self.output_buf[0][..produced]),
                Err(e) => error!("resampler process error: {e}"),
            }
            offset += self.chunk_size;
        }
        self.input_buf.drain(..offset);
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
