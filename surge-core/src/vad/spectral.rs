//! Spectral-shape voice heuristic with a consecutive-frame counter.
//!
//! ## Algorithm
//!
//! 1. A frame is speech-like iff the normalised centroid lies in
//!    (0.05, 0.35) and the high-frequency ratio is below 0.28.
//! 2. Speech-like frames increment the counter; any other frame resets it to 0.
//! 3. `voice_likely` is true once the counter reaches `min_consecutive` (8).

use super::{VadDecision, VoiceActivityDetector};
use crate::audio::features::AudioFeatures;

pub const CENTROID_MIN: f32 = 0.05;
pub const CENTROID_MAX: f32 = 0.35;
pub const MAX_HIGH_FREQ_RATIO: f32 = 0.28;
pub const MIN_CONSECUTIVE_FRAMES: u32 = 8;

#[derive(Debug, Clone)]
pub struct SpectralVoiceHeuristic {
    min_consecutive: u32,
    consecutive_voice_frames: u32,
}

impl SpectralVoiceHeuristic {
    pub fn new(min_consecutive: u32) -> Self {
        Self {
            min_consecutive: min_consecutive.max(1),
            consecutive_voice_frames: 0,
        }
    }

    pub fn is_speech_like(features: &AudioFeatures) -> bool {
        features.centroid > CENTROID_MIN
            && features.centroid < CENTROID_MAX
            && features.high_freq_ratio < MAX_HIGH_FREQ_RATIO
    }

    pub fn consecutive_voice_frames(&self) -> u32 {
        self.consecutive_voice_frames
    }
}

impl Default for SpectralVoiceHeuristic {
    fn default() -> Self {
        Self::new(MIN_CONSECUTIVE_FRAMES)
    }
}

impl VoiceActivityDetector for SpectralVoiceHeuristic {
    fn classify(&mut self, features: &AudioFeatures) -> VadDecision {
        if Self::is_speech_like(features) {
            self.consecutive_voice_frames = self.consecutive_voice_frames.saturating_add(1);
            VadDecision::Speech
        } else {
            self.consecutive_voice_frames = 0;
            VadDecision::NonSpeech
        }
    }

    fn voice_likely(&self) -> bool {
        self.consecutive_voice_frames >= self.min_consecutive
    }

    fn reset(&mut self) {
        self.consecutive_voice_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn speechy() -> AudioFeatures {
        AudioFeatures {
            rms: 0.1,
            flux: 0.5,
            centroid: 0.2,
            high_freq_ratio: 0.1,
        }
    }

    fn crowd() -> AudioFeatures {
        AudioFeatures {
            centroid: 0.6,
            high_freq_ratio: 0.5,
            ..speechy()
        }
    }

    #[test]
    fn classifies_by_centroid_band_and_high_freq_ratio() {
        assert!(SpectralVoiceHeuristic::is_speech_like(&speechy()));
        assert!(!SpectralVoiceHeuristic::is_speech_like(&crowd()));
        let edge = AudioFeatures {
            centroid: CENTROID_MIN,
            ..speechy()
        };
        assert!(!SpectralVoiceHeuristic::is_speech_like(&edge));
        let hissy = AudioFeatures {
            high_freq_ratio: MAX_HIGH_FREQ_RATIO,
            ..speechy()
        };
        assert!(!SpectralVoiceHeuristic::is_speech_like(&hissy));
    }

    #[test]
    fn voice_likely_on_eighth_consecutive_frame() {
        let mut vad = SpectralVoiceHeuristic::default();
        for i in 1..=7 {
            assert_eq!(vad.classify(&speechy()), VadDecision::Speech);
            assert!(!vad.voice_likely(), "frame {i}");
        }
        vad.classify(&speechy());
        assert!(vad.voice_likely());
    }

    #[test]
    fn single_non_speech_frame_resets() {
        let mut vad = SpectralVoiceHeuristic::default();
        for _ in 0..20 {
            vad.classify(&speechy());
        }
        assert!(vad.voice_likely());
        assert_eq!(vad.classify(&crowd()), VadDecision::NonSpeech);
        assert!(!vad.voice_likely());
        assert_eq!(vad.consecutive_voice_frames(), 0);
    }

    #[test]
    fn reset_clears_counter() {
        let mut vad = SpectralVoiceHeuristic::default();
        for _ in 0..8 {
            vad.classify(&speechy());
        }
        vad.reset();
        assert!(!vad.voice_likely());
    }

    proptest! {
        #[test]
        fn voice_likely_iff_last_eight_were_speech(pattern in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut vad = SpectralVoiceHeuristic::default();
            for (i, is_speech) in pattern.iter().enumerate() {
                vad.classify(&if *is_speech { speechy() } else { crowd() });
                let tail = &pattern[..=i];
                let run = tail.iter().rev().take_while(|s| **s).count();
                prop_assert_eq!(vad.voice_likely(), run >= 8);
            }
        }
    }
}
