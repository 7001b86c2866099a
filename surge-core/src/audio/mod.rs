//! Audio side: track sources, resampling and per-tick feature extraction.
//!
//! ```text
//! AudioTrack::read → RateConverter → SampleWindow(fft_size)
//!                                        │ (throttled tick)
//!                          SpectrumAnalyzer → byte spectrum
//!                                        │
//!                          AudioFeatureExtractor → AudioFeatures
//! ```

#[cfg(feature = "audio-cpal")]
pub mod capture;
pub mod device;
pub mod features;
pub mod file;
pub mod resample;
pub mod spectrum;

#[cfg(feature = "audio-cpal")]
pub use capture::{CaptureOptions, CpalAudioTrack};
pub use device::{list_input_devices, CaptureMode, DeviceInfo};
pub use features::{AudioFeatureExtractor, AudioFeatures};
pub use file::WavFileTrack;
pub use resample::RateConverter;
pub use spectrum::SpectrumAnalyzer;
