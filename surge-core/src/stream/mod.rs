//! Media stream handles consumed by the pipelines.
//!
//! A `MediaStream` is an already-open bundle of at most one audio track and
//! one video track. Acquiring it (device selection, permission prompts) is
//! the host's job; the engines only attach to the track they need, read from
//! it once per callback and stop it on teardown.
//!
//! | Track | Source |
//! |-------|--------|
//! | `CpalAudioTrack` | input device / loopback via cpal (`audio-cpal` feature) |
//! | `WavFileTrack` | WAV file paced in real time |
//! | `RingAudioTrack` | samples pushed by any producer through `RingFeeder` |
//! | `ChannelVideoTrack` | frames pushed by any producer through `FrameSender` |

pub mod channel;
pub mod ring;

pub use channel::{channel_video_track, ChannelVideoTrack, FrameSender};
pub use ring::{ring_audio_track, RingAudioTrack, RingFeeder};

use image::RgbaImage;

use crate::error::Result;

/// Mono f32 audio source.
pub trait AudioTrack: Send + 'static {
    fn label(&self) -> &str;

    /// Sample rate of the samples returned by `read` (Hz).
    fn sample_rate(&self) -> u32;

    /// Begin delivering samples. Called once, from the pipeline worker.
    fn start(&mut self) -> Result<()>;

    /// Copy samples that arrived since the last call into `out`, returning
    /// how many were written. `Ok(0)` means nothing new yet; an error means
    /// the track is gone.
    fn read(&mut self, out: &mut [f32]) -> Result<usize>;

    /// Release the underlying source. Must be idempotent.
    fn stop(&mut self);
}

/// RGBA frame source.
pub trait VideoTrack: Send + 'static {
    fn label(&self) -> &str;

    /// Begin delivering frames. Called once, from the pipeline worker.
    fn start(&mut self) -> Result<()>;

    /// The frame currently on display, or `None` before the first frame.
    /// An error means the track is gone.
    fn current_frame(&mut self) -> Result<Option<&RgbaImage>>;

    /// Release the underlying source. Must be idempotent.
    fn stop(&mut self);
}

/// An open stream handed to the engines.
pub struct MediaStream {
    id: String,
    audio: Option<Box<dyn AudioTrack>>,
    video: Option<Box<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audio: None,
            video: None,
        }
    }

    pub fn with_audio_track(mut self, track: impl AudioTrack) -> Self {
        self.audio = Some(Box::new(track));
        self
    }

    pub fn with_video_track(mut self, track: impl VideoTrack) -> Self {
        self.video = Some(Box::new(track));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn take_audio_track(&mut self) -> Option<Box<dyn AudioTrack>> {
        self.audio.take()
    }

    pub fn take_video_track(&mut self) -> Option<Box<dyn VideoTrack>> {
        self.video.take()
    }

    /// Stop every track still owned by the stream.
    pub fn stop(&mut self) {
        if let Some(mut track) = self.audio.take() {
            track.stop();
        }
        if let Some(mut track) = self.video.take() {
            track.stop();
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("audio", &self.audio.as_ref().map(|t| t.label().to_string()))
            .field("video", &self.video.as_ref().map(|t| t.label().to_string()))
            .finish()
    }
}
