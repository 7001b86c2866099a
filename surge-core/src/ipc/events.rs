//! Event and snapshot types published by the engines.
//!
//! Everything serialises camelCase so hosts can forward it as JSON as-is.
//! Heatmap rasters are carried by `Arc` and never serialised; hosts encode
//! them with `video::heatmap::to_data_url` when they need a wire format.

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::analysis::Modality;

// ---------------------------------------------------------------------------
// Signal events
// ---------------------------------------------------------------------------

/// Published once per audio tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSignalEvent {
    pub seq: u64,
    /// Wall-clock time of the tick (ms since the Unix epoch).
    pub at_ms: i64,
    /// Excitement score, ≥ 0.
    pub score: f32,
    /// Pulse state after this tick.
    pub spike: bool,
    /// A new spike fired on this tick.
    pub fired: bool,
    pub centroid: f32,
    pub voice_likely: bool,
    pub rms: f32,
    pub flux: f32,
    pub high_freq_ratio: f32,
}

/// Published once per video tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSignalEvent {
    pub seq: u64,
    pub at_ms: i64,
    /// Impact score, ≥ 0.
    pub impact: f32,
    pub spike: bool,
    pub fired: bool,
    pub mean_luma_diff: f32,
    #[serde(skip)]
    pub heatmap: Option<Arc<RgbaImage>>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Whether the host obtained access to the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Pending,
    Granted,
    Denied,
}

/// Latest audio outputs, for hosts that poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputs {
    pub score: f32,
    pub spike: bool,
    pub centroid: f32,
    pub voice_likely: bool,
    pub error: Option<String>,
    pub permission_state: PermissionState,
}

/// Latest video outputs, for hosts that poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOutputs {
    pub impact: f32,
    pub spike: bool,
    #[serde(skip)]
    pub heatmap: Option<Arc<RgbaImage>>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatusEvent {
    pub modality: Modality,
    pub state: PipelineState,
    /// Human-readable detail, e.g. the error that ended the run.
    pub detail: Option<String>,
}

/// Lifecycle state of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}
