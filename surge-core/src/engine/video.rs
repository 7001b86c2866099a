//! Video motion/impact pipeline and its controller.
//!
//! ## Per tick
//!
//! ```text
//! frame → Letterboxer(target_size) → FrameDifferencer
//!     ├─ mean |Δluma| → RollingBaseline(80) → impact = max(0, z)
//!     │                  → SpikeDetector(threshold, cooldown, 220 ms pulse)
//!     └─ cell grid → HeatmapAccumulator(decay) → RGBA raster
//! ```
//!
//! The first frame after (re)start only primes the previous luma plane:
//! impact 0, no baseline sample, heatmap untouched.

use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use image::RgbaImage;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    analysis::{Modality, RollingBaseline, Sensitivity, SpikeDecision, SpikeDetector},
    clock::{Clock, SystemClock},
    engine::{
        callback_interval, runtime_handle,
        diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics},
        lifecycle::{Lifecycle, WorkerHandle},
        throttle::TickThrottle,
        SIGNAL_BROADCAST_CAP,
    },
    error::{Result, SurgeError},
    ipc::events::{PipelineState, PipelineStatusEvent, VideoOutputs, VideoSignalEvent},
    stream::{MediaStream, VideoTrack},
    video::{
        heatmap::{HeatmapAccumulator, DEFAULT_HEATMAP_DECAY},
        letterbox::Letterboxer,
        motion::{grid_dim_for, FrameDifferencer},
    },
};

/// Spike pulse width.
pub const VIDEO_PULSE_MS: i64 = 220;

const SUMMARY_EVERY_TICKS: u64 = 40;

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub sensitivity: Sensitivity,
    pub cooldown_ms: i64,
    pub target_fps: f32,
    /// Edge of the square analysis canvas (px).
    pub target_size: u32,
    /// Canvas pixels per heatmap cell edge.
    pub heatmap_scale: u32,
    pub heatmap_decay: f32,
    /// Rolling baseline length in ticks.
    pub window: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::Balanced,
            cooldown_ms: 15_000,
            target_fps: 8.0,
            target_size: 416,
            heatmap_scale: 8,
            heatmap_decay: DEFAULT_HEATMAP_DECAY,
            window: 80,
        }
    }
}

impl VideoConfig {
    pub fn grid_dim(&self) -> usize {
        grid_dim_for(self.target_size, self.heatmap_scale)
    }
}

/// Result of one video tick.
#[derive(Debug, Clone)]
pub struct VideoTick {
    pub impact: f32,
    pub mean_luma_diff: f32,
    pub decision: SpikeDecision,
    /// `None` on the priming tick.
    pub heatmap: Option<Arc<RgbaImage>>,
}

pub struct VideoPipeline {
    letterbox: Letterboxer,
    differ: FrameDifferencer,
    baseline: RollingBaseline,
    heatmap: HeatmapAccumulator,
    spike: SpikeDetector,
    display_size: u32,
}

impl VideoPipeline {
    pub fn new(config: &VideoConfig) -> Self {
        let size = config.target_size.max(1);
        let grid_dim = config.grid_dim();
        Self {
            letterbox: Letterboxer::new(size),
            differ: FrameDifferencer::new(size, grid_dim),
            baseline: RollingBaseline::new(config.window),
            heatmap: HeatmapAccumulator::new(grid_dim, config.heatmap_decay),
            spike: SpikeDetector::new(
                config.sensitivity.threshold(Modality::Video),
                config.cooldown_ms,
                VIDEO_PULSE_MS,
            ),
            display_size: size,
        }
    }

    /// Analyse one frame. `None` when the frame is too small to use.
    pub fn tick(&mut self, frame: &RgbaImage, now_ms: i64) -> Option<VideoTick> {
        let canvas = self.letterbox.fit(frame)?;

        let Some(sample) = self.differ.process(canvas) else {
            let decision = SpikeDecision {
                pulse_active: self.spike.refresh(now_ms),
                ..SpikeDecision::default()
            };
            return Some(VideoTick {
                impact: 0.0,
                mean_luma_diff: 0.0,
                decision,
                heatmap: None,
            });
        };

        let mean_luma_diff = sample.mean_luma_diff;
        self.heatmap.accumulate(sample.grid);

        self.baseline.push(mean_luma_diff);
        let impact = self.baseline.zscore(mean_luma_diff).max(0.0);
        let decision = self.spike.evaluate(impact, now_ms, false);

        Some(VideoTick {
            impact,
            mean_luma_diff,
            decision,
            heatmap: Some(Arc::new(self.heatmap.render(self.display_size))),
        })
    }

    pub fn refresh(&mut self, now_ms: i64) -> bool {
        self.spike.refresh(now_ms)
    }

    pub fn heatmap(&self) -> &HeatmapAccumulator {
        &self.heatmap
    }

    pub fn threshold(&self) -> f32 {
        self.spike.threshold()
    }
}

// ---------------------------------------------------------------------------
// Callback loop
// ---------------------------------------------------------------------------

pub(crate) struct VideoWorker {
    pub track: Box<dyn VideoTrack>,
    pub pipeline: VideoPipeline,
    pub target_fps: f32,
    pub callback_interval: Duration,
    pub clock: Arc<dyn Clock>,
    pub handle: WorkerHandle,
    pub signal_tx: broadcast::Sender<VideoSignalEvent>,
    pub outputs: Arc<Mutex<VideoOutputs>>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

pub(crate) fn run(ctx: &mut VideoWorker) -> Result<()> {
    info!(
        track = ctx.track.label(),
        target_fps = ctx.target_fps,
        threshold = ctx.pipeline.threshold(),
        "video pipeline started"
    );

    let mut throttle = TickThrottle::from_fps(ctx.target_fps);
    let mut seq = 0u64;
    let running = Arc::clone(ctx.handle.running());

    while running.load(Ordering::Relaxed) {
        PipelineDiagnostics::bump(&ctx.diagnostics.callbacks);
        let now_ms = ctx.clock.now_ms();

        if !throttle.ready(Instant::now()) {
            PipelineDiagnostics::bump(&ctx.diagnostics.skipped_callbacks);
            let pulse = ctx.pipeline.refresh(now_ms);
            ctx.outputs.lock().spike = pulse;
            std::thread::sleep(ctx.callback_interval);
            continue;
        }

        let tick = match ctx.track.current_frame()? {
            Some(frame) => ctx.pipeline.tick(frame, now_ms),
            None => None,
        };
        match tick {
            Some(tick) => {
                publish_tick(ctx, &tick, seq, now_ms);
                seq = seq.wrapping_add(1);
                if seq % SUMMARY_EVERY_TICKS == 0 {
                    debug!(
                        seq,
                        impact = tick.impact,
                        mean_luma_diff = tick.mean_luma_diff,
                        "video tick summary"
                    );
                }
            }
            None => {
                PipelineDiagnostics::bump(&ctx.diagnostics.frames_skipped);
                let pulse = ctx.pipeline.refresh(now_ms);
                ctx.outputs.lock().spike = pulse;
            }
        }

        std::thread::sleep(ctx.callback_interval);
    }
    Ok(())
}

fn publish_tick(ctx: &VideoWorker, tick: &VideoTick, seq: u64, now_ms: i64) {
    PipelineDiagnostics::bump(&ctx.diagnostics.ticks);
    if tick.decision.fired {
        PipelineDiagnostics::bump(&ctx.diagnostics.spikes);
        info!(impact = tick.impact, "video spike");
    }

    {
        let mut outputs = ctx.outputs.lock();
        outputs.impact = tick.impact;
        outputs.spike = tick.decision.pulse_active;
        if let Some(raster) = &tick.heatmap {
            outputs.heatmap = Some(Arc::clone(raster));
        }
    }

    let _ = ctx.signal_tx.send(VideoSignalEvent {
        seq,
        at_ms: now_ms,
        impact: tick.impact,
        spike: tick.decision.pulse_active,
        fired: tick.decision.fired,
        mean_luma_diff: tick.mean_luma_diff,
        heatmap: tick.heatmap.clone(),
    });
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Video impact engine handle. `Send + Sync`.
pub struct VideoEngine {
    config: VideoConfig,
    clock: Arc<dyn Clock>,
    lifecycle: Lifecycle,
    signal_tx: broadcast::Sender<VideoSignalEvent>,
    outputs: Arc<Mutex<VideoOutputs>>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl VideoEngine {
    pub fn new(config: VideoConfig) -> Self {
        let (signal_tx, _) = broadcast::channel(SIGNAL_BROADCAST_CAP);
        Self {
            config,
            clock: Arc::new(SystemClock),
            lifecycle: Lifecycle::new(Modality::Video),
            signal_tx,
            outputs: Arc::new(Mutex::new(VideoOutputs::default())),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Attach to the stream's video track and start the worker.
    ///
    /// Same contract as `AudioEngine::start`; fails with `NoVideoTrack`
    /// when the stream carries no video.
    pub fn start(&self, stream: &mut MediaStream) -> Result<()> {
        let runtime = runtime_handle()?;
        let (handle, done_tx) = self.lifecycle.begin_start()?;
        self.diagnostics.reset();
        *self.outputs.lock() = VideoOutputs::default();

        let Some(mut track) = stream.take_video_track() else {
            return Err(self.fail_start(SurgeError::NoVideoTrack));
        };
        if self.config.target_size == 0 {
            track.stop();
            return Err(self.fail_start(SurgeError::UnsupportedEnvironment(
                "video target size must be positive".into(),
            )));
        }

        let config = self.config.clone();
        let clock = Arc::clone(&self.clock);
        let signal_tx = self.signal_tx.clone();
        let outputs = Arc::clone(&self.outputs);
        let diagnostics = Arc::clone(&self.diagnostics);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        runtime.spawn_blocking(move || {
            if let Err(e) = track.start() {
                track.stop();
                let _ = open_tx.send(Err(e));
                return;
            }
            handle.promote_running();
            let _ = open_tx.send(Ok(()));

            let mut worker = VideoWorker {
                track,
                pipeline: VideoPipeline::new(&config),
                target_fps: config.target_fps,
                callback_interval: callback_interval(),
                clock,
                handle,
                signal_tx,
                outputs,
                diagnostics,
            };
            let result = run(&mut worker);
            finish_worker(worker, result);
            let _ = done_tx.send(());
        });

        match open_rx.recv() {
            Ok(Ok(())) => {
                info!("video engine running");
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail_start(e)),
            Err(_) => Err(self.fail_start(SurgeError::Other(anyhow::anyhow!(
                "video worker died before attaching"
            )))),
        }
    }

    pub fn stop(&self) -> Result<()> {
        self.lifecycle.stop()
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() != PipelineState::Idle
    }

    pub fn outputs(&self) -> VideoOutputs {
        self.outputs.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VideoSignalEvent> {
        self.signal_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<PipelineStatusEvent> {
        self.lifecycle.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn fail_start(&self, err: SurgeError) -> SurgeError {
        warn!("video engine failed to start: {err}");
        self.outputs.lock().error = Some(err.to_string());
        self.lifecycle.abort_start(err.to_string());
        err
    }
}

impl Drop for VideoEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

fn finish_worker(mut worker: VideoWorker, result: Result<()>) {
    worker.track.stop();

    let detail = match &result {
        Ok(()) => None,
        Err(e) => {
            warn!("video pipeline ended: {e}");
            Some(e.to_string())
        }
    };
    {
        let mut outputs = worker.outputs.lock();
        outputs.spike = false;
        if let Some(msg) = &detail {
            outputs.error = Some(msg.clone());
        }
    }

    let snap = worker.diagnostics.snapshot();
    info!(
        callbacks = snap.callbacks,
        ticks = snap.ticks,
        skipped_callbacks = snap.skipped_callbacks,
        frames_skipped = snap.frames_skipped,
        spikes = snap.spikes,
        "video pipeline stopped, diagnostics"
    );

    let handle = worker.handle.clone();
    // Previous luma plane, baseline and heatmap go with the worker.
    drop(worker);
    handle.finish(detail);
}
