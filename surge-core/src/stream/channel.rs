//! Video track fed through a bounded crossbeam channel.
//!
//! The reader keeps only the most recent frame, mirroring a playing video
//! element: whatever is on screen when the tick fires is what gets sampled.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use image::RgbaImage;

use crate::{
    error::{Result, SurgeError},
    stream::VideoTrack,
};

#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<RgbaImage>,
}

impl FrameSender {
    /// Offer a frame. Returns `false` when the channel is full or the track
    /// has gone away; the frame is dropped in both cases.
    pub fn send(&self, frame: RgbaImage) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Block until the frame is queued. Fails only once the track is gone.
    pub fn send_blocking(&self, frame: RgbaImage) -> bool {
        self.tx.send(frame).is_ok()
    }
}

pub struct ChannelVideoTrack {
    label: String,
    rx: Receiver<RgbaImage>,
    current: Option<RgbaImage>,
    stopped: bool,
    /// Sender gone; reported once the last drained frame has been shown.
    disconnected: bool,
}

/// Create a channel-fed video track buffering at most `capacity` frames.
pub fn channel_video_track(
    label: impl Into<String>,
    capacity: usize,
) -> (FrameSender, ChannelVideoTrack) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        FrameSender { tx },
        ChannelVideoTrack {
            label: label.into(),
            rx,
            current: None,
            stopped: false,
            disconnected: false,
        },
    )
}

impl VideoTrack for ChannelVideoTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn start(&mut self) -> Result<()> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        Ok(())
    }

    fn current_frame(&mut self) -> Result<Option<&RgbaImage>> {
        if self.stopped {
            return Err(SurgeError::TrackEnded(format!("{} was stopped", self.label)));
        }
        if self.disconnected {
            return Err(SurgeError::TrackEnded(format!(
                "{} source disconnected",
                self.label
            )));
        }
        let mut fresh = false;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => {
                    self.current = Some(frame);
                    fresh = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    if fresh {
                        break;
                    }
                    return Err(SurgeError::TrackEnded(format!(
                        "{} source disconnected",
                        self.label
                    )));
                }
            }
        }
        Ok(self.current.as_ref())
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([v, v, v, 255]))
    }

    #[test]
    fn keeps_latest_frame() {
        let (tx, mut track) = channel_video_track("cam", 4);
        track.start().unwrap();
        assert!(track.current_frame().unwrap().is_none());

        assert!(tx.send(frame(1)));
        assert!(tx.send(frame(2)));
        let current = track.current_frame().unwrap().expect("frame");
        assert_eq!(current.get_pixel(0, 0)[0], 2);
        // No new frame: the previous one stays on display.
        let current = track.current_frame().unwrap().expect("frame");
        assert_eq!(current.get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn full_channel_drops_frames() {
        let (tx, _track) = channel_video_track("cam", 1);
        assert!(tx.send(frame(1)));
        assert!(!tx.send(frame(2)));
    }

    #[test]
    fn disconnect_ends_track_after_draining() {
        let (tx, mut track) = channel_video_track("cam", 2);
        tx.send(frame(7));
        drop(tx);
        // The frame queued before the sender left is still shown once.
        let last = track.current_frame().unwrap().expect("drained frame");
        assert_eq!(last.get_pixel(0, 0)[0], 7);
        assert!(matches!(
            track.current_frame(),
            Err(SurgeError::TrackEnded(_))
        ));
    }

    #[test]
    fn disconnect_without_new_frames_ends_immediately() {
        let (tx, mut track) = channel_video_track("cam", 2);
        assert!(tx.send(frame(3)));
        assert!(track.current_frame().unwrap().is_some());
        drop(tx);
        assert!(matches!(
            track.current_frame(),
            Err(SurgeError::TrackEnded(_))
        ));
    }
}
