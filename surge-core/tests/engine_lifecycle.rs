use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use surge_core::stream::{channel_video_track, ring_audio_track};
use surge_core::{
    AudioConfig, AudioEngine, AudioTrack, MediaStream, PermissionState, PipelineState,
    Sensitivity, SurgeError, VideoConfig, VideoEngine, VideoTrack,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    let start = Instant::now();
    while !cond() {
        if start.elapsed() >= TIMEOUT {
            panic!("timed out waiting for {what}");
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn recv_with_timeout<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= TIMEOUT {
                    panic!("timed out waiting for event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("event channel closed unexpectedly"),
        }
    }
}

fn small_video_config() -> VideoConfig {
    VideoConfig {
        target_fps: 50.0,
        target_size: 32,
        heatmap_scale: 8,
        ..VideoConfig::default()
    }
}

fn frame(v: u8) -> RgbaImage {
    RgbaImage::from_pixel(64, 48, Rgba([v, v, v, 255]))
}

/// Audio track whose attach is refused by the OS.
struct DeniedTrack;

impl AudioTrack for DeniedTrack {
    fn label(&self) -> &str {
        "denied"
    }

    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn start(&mut self) -> surge_core::Result<()> {
        Err(SurgeError::PermissionDenied("user dismissed the prompt".into()))
    }

    fn read(&mut self, _out: &mut [f32]) -> surge_core::Result<usize> {
        Ok(0)
    }

    fn stop(&mut self) {}
}

/// Shared switches for a test track: how often `stop` ran, and whether
/// the next read should fail.
#[derive(Clone, Default)]
struct TrackSwitches {
    stops: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
}

impl TrackSwitches {
    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn break_track(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }
}

/// Silent audio track that counts its releases.
struct CountingAudioTrack {
    switches: TrackSwitches,
    refuse_attach: bool,
}

impl AudioTrack for CountingAudioTrack {
    fn label(&self) -> &str {
        "counting audio"
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn start(&mut self) -> surge_core::Result<()> {
        if self.refuse_attach {
            return Err(SurgeError::UnsupportedEnvironment("no such device".into()));
        }
        Ok(())
    }

    fn read(&mut self, _out: &mut [f32]) -> surge_core::Result<usize> {
        if self.switches.fail_reads.load(Ordering::SeqCst) {
            return Err(SurgeError::TrackEnded("counting audio unplugged".into()));
        }
        Ok(0)
    }

    fn stop(&mut self) {
        self.switches.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Frameless video track that counts its releases.
struct CountingVideoTrack {
    switches: TrackSwitches,
    refuse_attach: bool,
}

impl VideoTrack for CountingVideoTrack {
    fn label(&self) -> &str {
        "counting video"
    }

    fn start(&mut self) -> surge_core::Result<()> {
        if self.refuse_attach {
            return Err(SurgeError::UnsupportedEnvironment("no such window".into()));
        }
        Ok(())
    }

    fn current_frame(&mut self) -> surge_core::Result<Option<&RgbaImage>> {
        if self.switches.fail_reads.load(Ordering::SeqCst) {
            return Err(SurgeError::TrackEnded("counting video closed".into()));
        }
        Ok(None)
    }

    fn stop(&mut self) {
        self.switches.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_audio_stream(refuse_attach: bool) -> (TrackSwitches, MediaStream) {
    let switches = TrackSwitches::default();
    let track = CountingAudioTrack {
        switches: switches.clone(),
        refuse_attach,
    };
    (switches, MediaStream::new("counted").with_audio_track(track))
}

fn counting_video_stream(refuse_attach: bool) -> (TrackSwitches, MediaStream) {
    let switches = TrackSwitches::default();
    let track = CountingVideoTrack {
        switches: switches.clone(),
        refuse_attach,
    };
    (switches, MediaStream::new("counted").with_video_track(track))
}

#[test]
fn start_outside_a_runtime_fails_and_stays_idle() {
    let audio = AudioEngine::new(AudioConfig::default());
    let (_feeder, track) = ring_audio_track("feed", 16_000);
    let mut audio_stream = MediaStream::new("a").with_audio_track(track);
    let err = audio.start(&mut audio_stream).expect_err("no runtime");
    assert!(matches!(err, SurgeError::UnsupportedEnvironment(_)));
    assert_eq!(audio.state(), PipelineState::Idle);
    assert!(audio_stream.has_audio(), "track is not consumed");

    let video = VideoEngine::new(small_video_config());
    let (_tx, track) = channel_video_track("tab", 1);
    let mut video_stream = MediaStream::new("v").with_video_track(track);
    let err = video.start(&mut video_stream).expect_err("no runtime");
    assert!(matches!(err, SurgeError::UnsupportedEnvironment(_)));
    assert_eq!(video.state(), PipelineState::Idle);
    assert!(video_stream.has_video(), "track is not consumed");

    // The same engines and streams work once a runtime is available.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");
    let _guard = rt.enter();
    audio.start(&mut audio_stream).expect("audio starts in a runtime");
    video.start(&mut video_stream).expect("video starts in a runtime");
    assert_eq!(audio.state(), PipelineState::Running);
    assert_eq!(video.state(), PipelineState::Running);
    audio.stop().expect("audio stops");
    video.stop().expect("video stops");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_track_released_once_on_stop() {
    let engine = AudioEngine::new(AudioConfig::default());
    let (switches, mut stream) = counting_audio_stream(false);
    engine.start(&mut stream).expect("engine starts");
    assert_eq!(switches.stops(), 0);
    engine.stop().expect("engine stops");
    assert_eq!(switches.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_track_released_once_on_read_failure() {
    let engine = AudioEngine::new(AudioConfig::default());
    let (switches, mut stream) = counting_audio_stream(false);
    engine.start(&mut stream).expect("engine starts");
    switches.break_track();
    wait_until(|| engine.state() == PipelineState::Idle, "engine idle");
    assert_eq!(switches.stops(), 1);
    assert!(matches!(engine.stop(), Err(SurgeError::NotRunning)));
    assert_eq!(switches.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_track_released_once_on_failed_attach() {
    let engine = AudioEngine::new(AudioConfig::default());
    let (switches, mut stream) = counting_audio_stream(true);
    engine.start(&mut stream).expect_err("attach refused");
    assert_eq!(engine.state(), PipelineState::Idle);
    assert_eq!(switches.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_track_released_once_on_stop() {
    let engine = VideoEngine::new(small_video_config());
    let (switches, mut stream) = counting_video_stream(false);
    engine.start(&mut stream).expect("engine starts");
    assert_eq!(switches.stops(), 0);
    engine.stop().expect("engine stops");
    assert_eq!(switches.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_track_released_once_on_read_failure() {
    let engine = VideoEngine::new(small_video_config());
    let (switches, mut stream) = counting_video_stream(false);
    engine.start(&mut stream).expect("engine starts");
    switches.break_track();
    wait_until(|| engine.state() == PipelineState::Idle, "engine idle");
    assert_eq!(switches.stops(), 1);
    assert!(matches!(engine.stop(), Err(SurgeError::NotRunning)));
    assert_eq!(switches.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_track_released_once_on_failed_attach() {
    let engine = VideoEngine::new(small_video_config());
    let (switches, mut stream) = counting_video_stream(true);
    engine.start(&mut stream).expect_err("attach refused");
    assert_eq!(engine.state(), PipelineState::Idle);
    assert_eq!(switches.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_start_without_audio_track_stays_idle() {
    let engine = AudioEngine::new(AudioConfig::default());
    let (_tx, video) = channel_video_track("video only", 1);
    let mut stream = MediaStream::new("tab").with_video_track(video);

    let err = engine.start(&mut stream).expect_err("no audio track");
    assert!(matches!(err, SurgeError::NoAudioTrack));
    assert_eq!(engine.state(), PipelineState::Idle);
    assert!(engine.outputs().error.is_some());
    // The video track is left for someone else.
    assert!(stream.has_video());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn permission_denial_is_reported() {
    let engine = AudioEngine::new(AudioConfig::default());
    let mut stream = MediaStream::new("mic").with_audio_track(DeniedTrack);

    let err = engine.start(&mut stream).expect_err("attach refused");
    assert!(err.is_permission_denied());
    let outputs = engine.outputs();
    assert_eq!(outputs.permission_state, PermissionState::Denied);
    assert_eq!(engine.state(), PipelineState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_engine_ticks_and_restarts_cleanly() {
    let engine = AudioEngine::new(AudioConfig {
        target_fps: 50.0,
        ..AudioConfig::default()
    });

    for cycle in 0..3 {
        let (mut feeder, track) = ring_audio_track("feed", 48_000);
        let mut stream = MediaStream::new(format!("s{cycle}")).with_audio_track(track);
        let mut signals = engine.subscribe();

        engine.start(&mut stream).expect("engine starts");
        assert_eq!(engine.state(), PipelineState::Running);
        assert_eq!(engine.outputs().permission_state, PermissionState::Granted);
        assert!(matches!(
            engine.start(&mut MediaStream::new("again")),
            Err(SurgeError::AlreadyRunning)
        ));

        feeder.push(&vec![0.01f32; 4_800]);
        let event = recv_with_timeout(&mut signals);
        assert!(event.score >= 0.0 && event.score.is_finite());

        engine.stop().expect("engine stops");
        assert_eq!(engine.state(), PipelineState::Idle);
        assert!(!engine.outputs().spike);
        assert!(engine.diagnostics_snapshot().ticks > 0, "cycle {cycle}");
    }

    assert!(matches!(engine.stop(), Err(SurgeError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_track_end_returns_engine_to_idle_with_error() {
    let engine = AudioEngine::new(AudioConfig::default());
    let (feeder, track) = ring_audio_track("feed", 16_000);
    let mut stream = MediaStream::new("s").with_audio_track(track);
    let mut status = engine.subscribe_status();

    engine.start(&mut stream).expect("engine starts");
    drop(feeder);

    wait_until(|| engine.state() == PipelineState::Idle, "engine idle");
    let error = engine.outputs().error.expect("track end is reported");
    assert!(error.contains("feed closed"), "{error}");

    let mut last = recv_with_timeout(&mut status);
    while last.state != PipelineState::Idle {
        last = recv_with_timeout(&mut status);
    }
    assert!(last.detail.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_engine_primes_then_publishes_heatmaps() {
    let engine = VideoEngine::new(small_video_config());
    let (tx, track) = channel_video_track("tab", 4);
    let mut stream = MediaStream::new("tab").with_video_track(track);
    let mut signals = engine.subscribe();

    engine.start(&mut stream).expect("engine starts");
    assert!(tx.send(frame(10)));

    let first = recv_with_timeout(&mut signals);
    assert_eq!(first.impact, 0.0);
    assert!(first.heatmap.is_none());

    assert!(tx.send_blocking(frame(200)));
    let mut with_heat = recv_with_timeout(&mut signals);
    while with_heat.heatmap.is_none() {
        with_heat = recv_with_timeout(&mut signals);
    }
    let raster = with_heat.heatmap.expect("heatmap");
    assert_eq!(raster.dimensions(), (32, 32));
    let snapshot = engine.outputs().heatmap.expect("snapshot keeps the latest heatmap");
    assert_eq!(snapshot.dimensions(), raster.dimensions());

    engine.stop().expect("engine stops");
    assert_eq!(engine.state(), PipelineState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_source_disconnect_stops_engine() {
    let engine = VideoEngine::new(small_video_config());
    let (tx, track) = channel_video_track("tab", 1);
    let mut stream = MediaStream::new("tab").with_video_track(track);

    engine.start(&mut stream).expect("engine starts");
    drop(tx);

    wait_until(|| engine.state() == PipelineState::Idle, "engine idle");
    assert!(engine.outputs().error.is_some());
    assert!(matches!(engine.stop(), Err(SurgeError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn video_start_without_video_track_fails() {
    let engine = VideoEngine::new(VideoConfig {
        sensitivity: Sensitivity::Aggressive,
        ..VideoConfig::default()
    });
    let err = engine
        .start(&mut MediaStream::new("empty"))
        .expect_err("no video");
    assert!(matches!(err, SurgeError::NoVideoTrack));
    assert_eq!(engine.state(), PipelineState::Idle);
}
