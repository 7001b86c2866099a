//! Alert feed: turns fired spikes into user-facing alerts.
//!
//! A spike only becomes an alert when its score clears the sensitivity
//! threshold by a margin, and (for audio) when the voice heuristic is not
//! active. The feed keeps the newest alerts first.

use std::collections::VecDeque;

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use surge_core::{AudioSignalEvent, Modality, VideoSignalEvent};

pub const DEFAULT_ALERT_MARGIN: f32 = 0.6;
pub const DEFAULT_FEED_LEN: usize = 10;

pub const AUDIO_ALERT_LABEL: &str = "Crowd surge detected";
pub const VIDEO_ALERT_LABEL: &str = "Motion impact detected";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub modality: Modality,
    pub label: &'static str,
    pub score: f32,
    pub at_ms: i64,
}

impl Alert {
    /// Local wall-clock time of the alert, for display.
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.at_ms).single()
    }
}

#[derive(Debug)]
pub struct AlertFeed {
    margin: f32,
    capacity: usize,
    alerts: VecDeque<Alert>,
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_MARGIN, DEFAULT_FEED_LEN)
    }
}

impl AlertFeed {
    pub fn new(margin: f32, capacity: usize) -> Self {
        Self {
            margin: margin.max(0.0),
            capacity: capacity.max(1),
            alerts: VecDeque::new(),
        }
    }

    /// Consider an audio tick; returns the alert if one was raised.
    pub fn on_audio(&mut self, event: &AudioSignalEvent, threshold: f32) -> Option<&Alert> {
        if !event.fired || event.voice_likely || event.score < threshold + self.margin {
            return None;
        }
        self.push(Alert {
            modality: Modality::Audio,
            label: AUDIO_ALERT_LABEL,
            score: event.score,
            at_ms: event.at_ms,
        })
    }

    /// Consider a video tick; returns the alert if one was raised.
    pub fn on_video(&mut self, event: &VideoSignalEvent, threshold: f32) -> Option<&Alert> {
        if !event.fired || event.impact < threshold + self.margin {
            return None;
        }
        self.push(Alert {
            modality: Modality::Video,
            label: VIDEO_ALERT_LABEL,
            score: event.impact,
            at_ms: event.at_ms,
        })
    }

    /// Newest first.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    fn push(&mut self, alert: Alert) -> Option<&Alert> {
        self.alerts.push_front(alert);
        self.alerts.truncate(self.capacity);
        self.alerts.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(score: f32, fired: bool, voice_likely: bool, at_ms: i64) -> AudioSignalEvent {
        AudioSignalEvent {
            seq: 0,
            at_ms,
            score,
            spike: fired,
            fired,
            centroid: 0.3,
            voice_likely,
            rms: 0.2,
            flux: 10.0,
            high_freq_ratio: 0.2,
        }
    }

    fn video(impact: f32, fired: bool) -> VideoSignalEvent {
        VideoSignalEvent {
            seq: 0,
            at_ms: 0,
            impact,
            spike: fired,
            fired,
            mean_luma_diff: 12.0,
            heatmap: None,
        }
    }

    #[test]
    fn margin_filters_marginal_spikes() {
        let mut feed = AlertFeed::default();
        assert!(feed.on_audio(&audio(2.5, true, false, 0), 2.2).is_none());
        let alert = feed.on_audio(&audio(2.9, true, false, 0), 2.2).expect("clears margin");
        assert_eq!(alert.label, AUDIO_ALERT_LABEL);
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn voice_and_unfired_ticks_never_alert() {
        let mut feed = AlertFeed::default();
        assert!(feed.on_audio(&audio(9.0, true, true, 0), 2.2).is_none());
        assert!(feed.on_audio(&audio(9.0, false, false, 0), 2.2).is_none());
        assert!(feed.on_video(&video(9.0, false), 2.0).is_none());
        assert!(feed.is_empty());
    }

    #[test]
    fn video_alerts_use_impact() {
        let mut feed = AlertFeed::default();
        assert!(feed.on_video(&video(2.5, true), 2.0).is_none());
        let alert = feed.on_video(&video(2.7, true), 2.0).expect("alert");
        assert_eq!(alert.modality, Modality::Video);
        assert_eq!(alert.label, VIDEO_ALERT_LABEL);
    }

    #[test]
    fn feed_keeps_newest_ten() {
        let mut feed = AlertFeed::default();
        for i in 0..12 {
            feed.on_audio(&audio(5.0, true, false, i), 2.2);
        }
        assert_eq!(feed.len(), DEFAULT_FEED_LEN);
        let times: Vec<i64> = feed.alerts().map(|a| a.at_ms).collect();
        assert_eq!(times.first(), Some(&11));
        assert_eq!(times.last(), Some(&2));
    }

    #[test]
    fn alert_serializes_camel_case() {
        let alert = Alert {
            modality: Modality::Audio,
            label: AUDIO_ALERT_LABEL,
            score: 3.0,
            at_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"atMs\":1700000000000"));
        assert!(json.contains("\"modality\":\"audio\""));
        assert!(alert.local_time().is_some());
    }
}
