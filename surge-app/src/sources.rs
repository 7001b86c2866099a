//! Host-side stream sources that don't belong in the core SDK.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::RgbaImage;
use surge_core::{error::SurgeError, VideoTrack};
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Plays a directory of still images as a video track, advancing one image
/// per `1 / fps` seconds. The track ends after the last image unless it
/// loops.
pub struct ImageSequenceTrack {
    label: String,
    paths: Vec<PathBuf>,
    frame_interval: Duration,
    looping: bool,
    next_index: usize,
    shown_at: Option<Instant>,
    current: Option<RgbaImage>,
    stopped: bool,
}

impl ImageSequenceTrack {
    /// Collect the images in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path, fps: f32, looping: bool) -> surge_core::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_path(p))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(SurgeError::UnsupportedEnvironment(format!(
                "no images found in {}",
                dir.display()
            )));
        }
        Ok(Self::from_paths(dir.display().to_string(), paths, fps, looping))
    }

    pub fn from_paths(label: impl Into<String>, paths: Vec<PathBuf>, fps: f32, looping: bool) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 1.0 };
        Self {
            label: label.into(),
            paths,
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            looping,
            next_index: 0,
            shown_at: None,
            current: None,
            stopped: false,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    fn due(&self, now: Instant) -> bool {
        match self.shown_at {
            None => true,
            Some(at) => now.duration_since(at) >= self.frame_interval,
        }
    }

    fn advance(&mut self, now: Instant) -> surge_core::Result<()> {
        if self.next_index >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Err(SurgeError::TrackEnded(format!("{} finished", self.label)));
            }
            self.next_index = 0;
        }
        let path = &self.paths[self.next_index];
        let frame = image::open(path)?.to_rgba8();
        debug!(path = %path.display(), w = frame.width(), h = frame.height(), "image frame");
        self.current = Some(frame);
        self.next_index += 1;
        self.shown_at = Some(now);
        Ok(())
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl VideoTrack for ImageSequenceTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn start(&mut self) -> surge_core::Result<()> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        Ok(())
    }

    fn current_frame(&mut self) -> surge_core::Result<Option<&RgbaImage>> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        let now = Instant::now();
        if self.due(now) {
            self.advance(now)?;
        }
        Ok(self.current.as_ref())
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.current = None;
    }
}
