use thiserror::Error;

/// All errors produced by surge-core.
#[derive(Debug, Error)]
pub enum SurgeError {
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("no audio track in stream; select a source with audio")]
    NoAudioTrack,

    #[error("no video track in stream; select a source with video")]
    NoVideoTrack,

    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("track ended: {0}")]
    TrackEnded(String),

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SurgeError {
    /// True for failures the host should present as a permission problem
    /// rather than a generic start failure.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SurgeError::PermissionDenied(_))
    }
}

pub type Result<T> = std::result::Result<T, SurgeError>;
