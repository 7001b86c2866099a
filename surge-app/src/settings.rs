//! Persistent host settings (JSON file in the user's data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use surge_core::{audio::CaptureMode, AudioConfig, Sensitivity, VideoConfig};

use crate::alerts::{DEFAULT_ALERT_MARGIN, DEFAULT_FEED_LEN};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub capture_mode: String,
    pub sensitivity: String,
    /// 0–100 slider position; overrides `sensitivity` when present.
    pub sensitivity_slider: Option<f32>,
    pub audio_cooldown_ms: i64,
    pub video_cooldown_ms: i64,
    pub audio_fps: f32,
    pub video_fps: f32,
    pub video_target_size: u32,
    pub heatmap_decay: f32,
    pub alert_margin: f32,
    pub alert_feed_len: usize,
    pub callback_interval_ms: Option<u64>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let audio = AudioConfig::default();
        let video = VideoConfig::default();
        Self {
            preferred_input_device: None,
            capture_mode: CaptureMode::default().as_str().into(),
            sensitivity: Sensitivity::default().as_str().into(),
            sensitivity_slider: None,
            audio_cooldown_ms: audio.cooldown_ms,
            video_cooldown_ms: video.cooldown_ms,
            audio_fps: audio.target_fps,
            video_fps: video.target_fps,
            video_target_size: video.target_size,
            heatmap_decay: video.heatmap_decay,
            alert_margin: DEFAULT_ALERT_MARGIN,
            alert_feed_len: DEFAULT_FEED_LEN,
            callback_interval_ms: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.capture_mode = self
            .capture_mode
            .parse::<CaptureMode>()
            .unwrap_or_default()
            .as_str()
            .into();
        self.sensitivity_slider = self
            .sensitivity_slider
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 100.0));
        self.sensitivity = match self.sensitivity_slider {
            Some(v) => Sensitivity::from_slider(v),
            None => self.sensitivity.parse().unwrap_or_default(),
        }
        .as_str()
        .into();
        self.audio_cooldown_ms = self.audio_cooldown_ms.clamp(0, 600_000);
        self.video_cooldown_ms = self.video_cooldown_ms.clamp(0, 600_000);
        self.audio_fps = clamp_fps(self.audio_fps, 20.0);
        self.video_fps = clamp_fps(self.video_fps, 8.0);
        self.video_target_size = self.video_target_size.clamp(32, 1024);
        self.heatmap_decay = if self.heatmap_decay.is_finite() {
            self.heatmap_decay.clamp(0.0, 0.99)
        } else {
            VideoConfig::default().heatmap_decay
        };
        self.alert_margin = if self.alert_margin.is_finite() {
            self.alert_margin.clamp(0.0, 5.0)
        } else {
            DEFAULT_ALERT_MARGIN
        };
        self.alert_feed_len = self.alert_feed_len.clamp(1, 100);
        self.callback_interval_ms = self.callback_interval_ms.map(|v| v.clamp(1, 50));
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity.parse().unwrap_or_default()
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode.parse().unwrap_or_default()
    }

    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            sensitivity: self.sensitivity(),
            cooldown_ms: self.audio_cooldown_ms,
            target_fps: self.audio_fps,
            ..AudioConfig::default()
        }
    }

    pub fn video_config(&self) -> VideoConfig {
        VideoConfig {
            sensitivity: self.sensitivity(),
            cooldown_ms: self.video_cooldown_ms,
            target_fps: self.video_fps,
            target_size: self.video_target_size,
            heatmap_decay: self.heatmap_decay,
            ..VideoConfig::default()
        }
    }
}

fn clamp_fps(fps: f32, fallback: f32) -> f32 {
    if fps.is_finite() && fps > 0.0 {
        fps.clamp(0.5, 60.0)
    } else {
        fallback
    }
}

/// Export settings the core reads from the environment, unless the user
/// already set them.
pub fn apply_runtime_env_from_settings(settings: &AppSettings) {
    if std::env::var("SURGE_CALLBACK_INTERVAL_MS").is_err() {
        if let Some(ms) = settings.callback_interval_ms {
            std::env::set_var("SURGE_CALLBACK_INTERVAL_MS", ms.to_string());
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Surge")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("surge")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
