//! `AudioEngine` / `VideoEngine`: per-modality lifecycle controllers.
//!
//! ## Lifecycle
//!
//! ```text
//! Engine::new(config)
//!     └─► start(&mut stream)  → Starting: take track, spawn worker
//!             worker: track.start() ok → Running, callback loop
//!         └─► stop()           → Stopping: running=false, wait for cleanup
//!             worker: track.stop(), state dropped → Idle
//! ```
//!
//! A track that fails mid-run ends the loop the same way, leaving the engine
//! Idle with `error` set. `start()`/`stop()` in the wrong state return an
//! error rather than panicking.
//!
//! ## Threading
//!
//! Each engine runs one `spawn_blocking` worker. The worker owns every
//! per-run buffer; the controller only shares the running flag, the output
//! snapshot and the broadcast senders with it. A sync oneshot channel
//! propagates attach errors back to the `start()` caller.

pub mod audio;
pub mod diagnostics;
pub(crate) mod lifecycle;
pub mod throttle;
pub mod video;

pub use audio::{AudioConfig, AudioEngine, AudioPipeline, AudioTick};
pub use diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics};
pub use lifecycle::STOP_TIMEOUT;
pub use throttle::TickThrottle;
pub use video::{VideoConfig, VideoEngine, VideoPipeline, VideoTick};

use std::{sync::OnceLock, time::Duration};

use crate::error::{Result, SurgeError};

/// Broadcast capacity for signal events; a 5 s backlog at 20 fps.
pub(crate) const SIGNAL_BROADCAST_CAP: usize = 100;

/// Host callback cadence when no override is set (one display frame at 60 Hz).
const DEFAULT_CALLBACK_INTERVAL_MS: u64 = 16;

/// Cadence of the callback loop. `SURGE_CALLBACK_INTERVAL_MS` overrides it
/// (clamped to 1..=50).
pub fn callback_interval() -> Duration {
    static CALLBACK_INTERVAL_MS: OnceLock<u64> = OnceLock::new();
    let ms = *CALLBACK_INTERVAL_MS.get_or_init(|| {
        std::env::var("SURGE_CALLBACK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|v| v.clamp(1, 50))
            .unwrap_or(DEFAULT_CALLBACK_INTERVAL_MS)
    });
    Duration::from_millis(ms)
}

/// The runtime `start()` spawns its worker on. Checked before any state
/// changes so a call from outside Tokio leaves the engine Idle.
pub(crate) fn runtime_handle() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        SurgeError::UnsupportedEnvironment(
            "engines must be started from within a Tokio runtime".into(),
        )
    })
}
