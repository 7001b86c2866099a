//! Audio track fed by pushing samples into an SPSC ring.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    buffering::{create_audio_ring, AudioConsumer, AudioProducer, Consumer, Producer},
    error::{Result, SurgeError},
    stream::AudioTrack,
};

/// Producer side. Dropping it (or calling `end`) ends the track once the
/// ring has been drained.
pub struct RingFeeder {
    producer: AudioProducer,
    ended: Arc<AtomicBool>,
}

impl RingFeeder {
    /// Push mono samples; returns how many fit.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    pub fn end(self) {}
}

impl Drop for RingFeeder {
    fn drop(&mut self) {
        self.ended.store(true, Ordering::Release);
    }
}

pub struct RingAudioTrack {
    label: String,
    sample_rate: u32,
    consumer: AudioConsumer,
    ended: Arc<AtomicBool>,
    stopped: bool,
}

/// Create a pushed audio track at `sample_rate`.
pub fn ring_audio_track(label: impl Into<String>, sample_rate: u32) -> (RingFeeder, RingAudioTrack) {
    let (producer, consumer) = create_audio_ring();
    let ended = Arc::new(AtomicBool::new(false));
    (
        RingFeeder {
            producer,
            ended: Arc::clone(&ended),
        },
        RingAudioTrack {
            label: label.into(),
            sample_rate,
            consumer,
            ended,
            stopped: false,
        },
    )
}

impl AudioTrack for RingAudioTrack {
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
        Ok(())
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        let n = self.consumer.pop_slice(out);
        if n == 0 && self.ended.load(Ordering::Acquire) {
            return Err(SurgeError::TrackEnded(format!("{} feed closed", self.label)));
        }
        Ok(n)
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.consumer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pushed_samples_then_reports_end() {
        let (mut feeder, mut track) = ring_audio_track("feed", 16_000);
        track.start().unwrap();
        feeder.push(&[0.5; 10]);
        let mut out = [0.0; 16];
        assert_eq!(track.read(&mut out).unwrap(), 10);
        assert_eq!(track.read(&mut out).unwrap(), 0);

        feeder.push(&[0.1; 4]);
        feeder.end();
        // Buffered samples are still delivered before the end is reported.
        assert_eq!(track.read(&mut out).unwrap(), 4);
        assert!(matches!(track.read(&mut out), Err(SurgeError::TrackEnded(_))));
    }

    #[test]
    fn stopped_track_refuses_reads() {
        let (_feeder, mut track) = ring_audio_track("feed", 16_000);
        track.stop();
        track.stop();
        let mut out = [0.0; 4];
        assert!(track.read(&mut out).is_err());
    }
}
