//! Input device enumeration and selection.
//!
//! Broadcast audio usually reaches the detector through a loopback-style
//! input ("Stereo Mix", PulseAudio "Monitor of ..."), while a room
//! microphone is the fallback for watching a screen in the same room. Both
//! are plain cpal input devices; which one is preferred depends on the
//! [`CaptureMode`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// System / tab output captured through a loopback-like input.
    #[default]
    Loopback,
    /// A physical microphone.
    Microphone,
}

impl CaptureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureMode::Loopback => "loopback",
            CaptureMode::Microphone => "microphone",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loopback" | "system" | "tab" => Ok(CaptureMode::Loopback),
            "microphone" | "mic" => Ok(CaptureMode::Microphone),
            other => Err(format!("unknown capture mode '{other}'")),
        }
    }
}

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Heuristic flag for devices that likely capture system output.
    pub is_loopback_like: bool,
    /// Best candidate for the requested capture mode.
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "virtual output",
    "monitor of",
    "blackhole",
    "soundflower",
    "cable output",
    "mixage stereo",
    "mezcla estereo",
];

const MIC_KEYWORDS: &[&str] = &["microphone", "mic", "array", "headset", "webcam", "usb"];

pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Score a device name for `mode`. Higher is better.
pub fn preference_score(name: &str, mode: CaptureMode) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let loopback = is_loopback_like_name(&lowered);
    let mic = MIC_KEYWORDS.iter().any(|k| lowered.contains(k));
    let mut score = match (mode, loopback) {
        (CaptureMode::Loopback, true) | (CaptureMode::Microphone, false) => 8,
        _ => -16,
    };
    if mode == CaptureMode::Microphone && mic {
        score += 6;
    }
    if lowered.contains("default") {
        score += 1;
    }
    score
}

/// Index of the best entry in `names` for `mode`; ties go to the default.
pub fn pick_device(names: &[String], default_name: Option<&str>, mode: CaptureMode) -> Option<usize> {
    names
        .iter()
        .enumerate()
        .max_by_key(|(_, name)| {
            let bonus = if default_name == Some(name.as_str()) { 2 } else { 0 };
            preference_score(name, mode) + bonus
        })
        .map(|(idx, _)| idx)
}

/// List the host's input devices, recommended entry first.
///
/// Returns an empty `Vec` if no devices exist or cpal is unavailable.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices(mode: CaptureMode) -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let names: Vec<String> = match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1))
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            default_name.iter().cloned().collect()
        }
    };

    let best = pick_device(&names, default_name.as_deref(), mode);
    let mut list: Vec<DeviceInfo> = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            is_loopback_like: is_loopback_like_name(&name),
            is_recommended: best == Some(idx),
            name,
        })
        .collect();

    list.sort_by_key(|d| (!d.is_recommended, !d.is_default, d.name.to_ascii_lowercase()));
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices(_mode: CaptureMode) -> Vec<DeviceInfo> {
    vec![]
}
