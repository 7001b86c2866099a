//! WAV file exposed as a live track.
//!
//! Samples are released at wall-clock pace from `start`, so a recording
//! exercises the pipeline exactly like a device would. Reaching the end of
//! the file ends the track.

use std::{path::Path, time::Instant};

use hound::{SampleFormat, WavReader};
use tracing::info;

use crate::{
    error::{Result, SurgeError},
    stream::AudioTrack,
};

pub struct WavFileTrack {
    label: String,
    sample_rate: u32,
    samples: Vec<f32>,
    position: usize,
    started_at: Option<Instant>,
    stopped: bool,
}

impl WavFileTrack {
    /// Decode the whole file into mono f32.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = downmix(&interleaved, channels);
        info!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels,
            seconds = samples.len() as f32 / spec.sample_rate.max(1) as f32,
            "wav track loaded"
        );

        Ok(Self::from_samples(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            spec.sample_rate,
            samples,
        ))
    }

    /// Wrap already-decoded mono samples.
    pub fn from_samples(label: impl Into<String>, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            sample_rate,
            samples,
            position: 0,
            started_at: None,
            stopped: false,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }

    fn due_samples(&self) -> usize {
        let Some(started) = self.started_at else {
            return 0;
        };
        let due = (started.elapsed().as_secs_f64() * self.sample_rate as f64) as usize;
        due.min(self.samples.len())
    }
}

impl AudioTrack for WavFileTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> Result<()> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        if self.sample_rate == 0 {
            return Err(SurgeError::AudioStream(format!("{} has no sample rate", self.label)));
        }
        self.started_at.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        if self.position >= self.samples.len() {
            return Err(SurgeError::TrackEnded(format!("{} finished", self.label)));
        }
        let end = self.due_samples().min(self.position + out.len());
        let n = end.saturating_sub(self.position);
        out[..n].copy_from_slice(&self.samples[self.position..end]);
        self.position += n;
        Ok(n)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25], 1), vec![0.25]);
    }

    #[test]
    fn nothing_is_due_before_start() {
        let mut track = WavFileTrack::from_samples("t", 8_000, vec![0.1; 800]);
        let mut out = [0.0; 64];
        assert_eq!(track.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn paced_reads_end_the_track() {
        let mut track = WavFileTrack::from_samples("t", 1_000, vec![0.1; 20]);
        track.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(40));
        let mut out = [0.0; 64];
        assert_eq!(track.read(&mut out).unwrap(), 20);
        assert!(matches!(track.read(&mut out), Err(SurgeError::TrackEnded(_))));
    }

    #[test]
    fn opens_int_wav_as_normalized_mono() {
        let path = std::env::temp_dir().join(format!("surge-wav-{}.wav", std::process::id()));
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..160 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let track = WavFileTrack::open(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(track.sample_rate(), 16_000);
        assert_eq!(track.samples.len(), 160);
        assert_relative_eq!(track.samples[0], 0.25, epsilon = 1e-6);
        assert_relative_eq!(track.duration_secs(), 0.01, epsilon = 1e-6);
    }
}
