//! Modality-independent decision logic: rolling baselines, sensitivity
//! thresholds and the spike detector shared by the audio and video pipelines.

pub mod baseline;
pub mod spike;

pub use baseline::RollingBaseline;
pub use spike::{SpikeDecision, SpikeDetector};

use serde::{Deserialize, Serialize};

/// Which pipeline a threshold or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Video,
}

/// How eager the spike detector is to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl Sensitivity {
    pub const ALL: [Sensitivity; 3] = [
        Sensitivity::Conservative,
        Sensitivity::Balanced,
        Sensitivity::Aggressive,
    ];

    /// Z-score threshold a combined score must reach to fire a spike.
    ///
    /// Monotonic per modality: aggressive ≤ balanced ≤ conservative.
    pub fn threshold(self, modality: Modality) -> f32 {
        match (modality, self) {
            (Modality::Audio, Sensitivity::Conservative) => 3.0,
            (Modality::Audio, Sensitivity::Balanced) => 2.2,
            (Modality::Audio, Sensitivity::Aggressive) => 1.5,
            (Modality::Video, Sensitivity::Conservative) => 2.5,
            (Modality::Video, Sensitivity::Balanced) => 2.0,
            (Modality::Video, Sensitivity::Aggressive) => 1.3,
        }
    }

    /// Map a 0–100 slider position onto a sensitivity bucket.
    pub fn from_slider(value: f32) -> Self {
        if value < 33.0 {
            Sensitivity::Conservative
        } else if value < 66.0 {
            Sensitivity::Balanced
        } else {
            Sensitivity::Aggressive
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sensitivity::Conservative => "conservative",
            Sensitivity::Balanced => "balanced",
            Sensitivity::Aggressive => "aggressive",
        }
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" | "low" => Ok(Sensitivity::Conservative),
            "balanced" | "medium" | "" => Ok(Sensitivity::Balanced),
            "aggressive" | "high" => Ok(Sensitivity::Aggressive),
            other => Err(format!("unknown sensitivity: {other}")),
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
