//! Voice likelihood detection.
//!
//! The `VoiceActivityDetector` trait is the seam the audio pipeline gates
//! spikes on: swap in `SpectralVoiceHeuristic` (default) or any future
//! detector without touching the pipeline.

pub mod spectral;

pub use spectral::SpectralVoiceHeuristic;

use crate::audio::features::AudioFeatures;

/// Per-frame classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The frame's spectral shape looks like speech.
    Speech,
    /// Anything else (crowd noise, music, silence).
    NonSpeech,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for voice detectors.
///
/// Implementors are stateful: `voice_likely` reflects the hysteresis over
/// every frame classified since the last `reset`.
pub trait VoiceActivityDetector: Send + 'static {
    /// Classify one tick's features and update internal state.
    fn classify(&mut self, features: &AudioFeatures) -> VadDecision;

    /// Stable "voice likely" flag after the most recent `classify`.
    fn voice_likely(&self) -> bool;

    /// Reset hysteresis state.
    fn reset(&mut self);
}
