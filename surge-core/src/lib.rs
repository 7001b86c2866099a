//! # surge-core
//!
//! Live excitement detection for broadcast audio and video.
//!
//! ## Architecture
//!
//! ```text
//! AudioTrack → RateConverter → SampleWindow ─┐ (throttled tick, 20 fps)
//!                                            ▼
//!             SpectrumAnalyzer → AudioFeatures → voice gate
//!                  → RollingBaseline z-scores → SpikeDetector
//!                  → broadcast::Sender<AudioSignalEvent>
//!
//! VideoTrack → Letterboxer → FrameDifferencer ─┐ (throttled tick, 8 fps)
//!                                              ▼
//!             RollingBaseline z-score → SpikeDetector
//!             HeatmapAccumulator → RGBA raster
//!                  → broadcast::Sender<VideoSignalEvent>
//! ```
//!
//! Each pipeline runs on its own blocking worker; the two share no state.
//! Acquiring the `MediaStream` is the host's job.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod buffering;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod stream;
pub mod vad;
pub mod video;

// Convenience re-exports for downstream crates
pub use analysis::{Modality, Sensitivity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AudioConfig, AudioEngine, VideoConfig, VideoEngine};
pub use error::{Result, SurgeError};
pub use ipc::events::{
    AudioOutputs, AudioSignalEvent, PermissionState, PipelineState, PipelineStatusEvent,
    VideoOutputs, VideoSignalEvent,
};
pub use stream::{AudioTrack, MediaStream, VideoTrack};

#[cfg(feature = "audio-cpal")]
pub use audio::{CaptureOptions, CpalAudioTrack};
