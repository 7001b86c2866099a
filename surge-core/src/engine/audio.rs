//! Audio excitement pipeline and its controller.
//!
//! ## Per tick
//!
//! ```text
//! SampleWindow(fft_size) → SpectrumAnalyzer → AudioFeatureExtractor
//!     → voice heuristic (gate)
//!     → RollingBaseline(rms), RollingBaseline(flux) → z-scores
//!     → score = max(0, 0.3·z_rms + 0.7·z_flux)
//!     → SpikeDetector(threshold, cooldown, 200 ms pulse)
//! ```
//!
//! `AudioPipeline` is the pure per-tick logic; `run` adapts it to a
//! callback loop over an `AudioTrack`; `AudioEngine` owns the lifecycle.

use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    analysis::{Modality, RollingBaseline, Sensitivity, SpikeDecision, SpikeDetector},
    audio::{
        features::{AudioFeatureExtractor, AudioFeatures},
        resample::{RateConverter, DEFAULT_CHUNK_SIZE},
        spectrum::{SpectrumAnalyzer, DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING},
    },
    buffering::window::SampleWindow,
    clock::{Clock, SystemClock},
    engine::{
        callback_interval, runtime_handle,
        diagnostics::{DiagnosticsSnapshot, PipelineDiagnostics},
        lifecycle::{Lifecycle, WorkerHandle},
        throttle::TickThrottle,
        SIGNAL_BROADCAST_CAP,
    },
    error::{Result, SurgeError},
    ipc::events::{AudioOutputs, AudioSignalEvent, PermissionState, PipelineState, PipelineStatusEvent},
    stream::{AudioTrack, MediaStream},
    vad::{SpectralVoiceHeuristic, VoiceActivityDetector},
};

/// Spike pulse width.
pub const AUDIO_PULSE_MS: i64 = 200;

const RMS_WEIGHT: f32 = 0.3;
const FLUX_WEIGHT: f32 = 0.7;

/// Samples pulled from the track per read call.
const READ_CHUNK: usize = 4_096;

/// Ticks between periodic debug summaries (5 s at 20 fps).
const SUMMARY_EVERY_TICKS: u64 = 100;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sensitivity: Sensitivity,
    pub cooldown_ms: i64,
    pub target_fps: f32,
    pub fft_size: usize,
    /// Rolling baseline length in ticks.
    pub window: usize,
    /// Rate the spectrum is analysed at; tracks are resampled to it.
    pub analysis_sample_rate: u32,
    pub smoothing: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::Balanced,
            cooldown_ms: 10_000,
            target_fps: 20.0,
            fft_size: DEFAULT_FFT_SIZE,
            window: 100,
            analysis_sample_rate: 48_000,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

/// Result of one audio tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioTick {
    pub features: AudioFeatures,
    pub score: f32,
    pub voice_likely: bool,
    pub decision: SpikeDecision,
}

pub struct AudioPipeline {
    window: SampleWindow,
    analyzer: SpectrumAnalyzer,
    spectrum: Vec<u8>,
    extractor: AudioFeatureExtractor,
    voice: Box<dyn VoiceActivityDetector>,
    rms_baseline: RollingBaseline,
    flux_baseline: RollingBaseline,
    spike: SpikeDetector,
}

impl AudioPipeline {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        Self::with_detector(config, Box::new(SpectralVoiceHeuristic::default()))
    }

    pub fn with_detector(config: &AudioConfig, voice: Box<dyn VoiceActivityDetector>) -> Result<Self> {
        let analyzer = SpectrumAnalyzer::new(config.fft_size, config.analysis_sample_rate)?
            .with_smoothing(config.smoothing);
        Ok(Self {
            window: SampleWindow::new(config.fft_size),
            spectrum: vec![0; analyzer.bin_count()],
            extractor: AudioFeatureExtractor::new(config.analysis_sample_rate, config.fft_size),
            analyzer,
            voice,
            rms_baseline: RollingBaseline::new(config.window),
            flux_baseline: RollingBaseline::new(config.window),
            spike: SpikeDetector::new(
                config.sensitivity.threshold(Modality::Audio),
                config.cooldown_ms,
                AUDIO_PULSE_MS,
            ),
        })
    }

    /// Append analysis-rate samples to the time-domain window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.window.extend(samples);
    }

    /// Analyse the current window and decide.
    pub fn tick(&mut self, now_ms: i64) -> AudioTick {
        self.analyzer.process(self.window.as_slice(), &mut self.spectrum);
        let features = self.extractor.extract(self.window.as_slice(), &self.spectrum);
        self.evaluate(features, now_ms)
    }

    /// Baseline, voice gate and spike decision for already-extracted features.
    pub fn evaluate(&mut self, features: AudioFeatures, now_ms: i64) -> AudioTick {
        self.voice.classify(&features);
        let voice_likely = self.voice.voice_likely();

        self.rms_baseline.push(features.rms);
        self.flux_baseline.push(features.flux);
        let z_rms = self.rms_baseline.zscore(features.rms);
        let z_flux = self.flux_baseline.zscore(features.flux);
        let score = (RMS_WEIGHT * z_rms + FLUX_WEIGHT * z_flux).max(0.0);

        let decision = self.spike.evaluate(score, now_ms, voice_likely);
        AudioTick {
            features,
            score,
            voice_likely,
            decision,
        }
    }

    /// Clear an expired pulse between ticks; returns the pulse state.
    pub fn refresh(&mut self, now_ms: i64) -> bool {
        self.spike.refresh(now_ms)
    }

    pub fn voice_likely(&self) -> bool {
        self.voice.voice_likely()
    }

    pub fn threshold(&self) -> f32 {
        self.spike.threshold()
    }
}

// ---------------------------------------------------------------------------
// Callback loop
// ---------------------------------------------------------------------------

/// Everything the worker owns or shares, passed as one struct.
pub(crate) struct AudioWorker {
    pub track: Box<dyn AudioTrack>,
    pub pipeline: AudioPipeline,
    pub resampler: RateConverter,
    pub target_fps: f32,
    pub callback_interval: Duration,
    pub clock: Arc<dyn Clock>,
    pub handle: WorkerHandle,
    pub signal_tx: broadcast::Sender<AudioSignalEvent>,
    pub outputs: Arc<Mutex<AudioOutputs>>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run until the running flag clears (Ok) or the track fails (Err).
pub(crate) fn run(ctx: &mut AudioWorker) -> Result<()> {
    info!(
        track = ctx.track.label(),
        source_rate = ctx.track.sample_rate(),
        target_fps = ctx.target_fps,
        threshold = ctx.pipeline.threshold(),
        "audio pipeline started"
    );

    let mut raw = vec![0f32; READ_CHUNK];
    let mut resampled: Vec<f32> = Vec::with_capacity(READ_CHUNK * 2);
    let mut throttle = TickThrottle::from_fps(ctx.target_fps);
    let mut seq = 0u64;
    let running = Arc::clone(ctx.handle.running());

    while running.load(Ordering::Relaxed) {
        PipelineDiagnostics::bump(&ctx.diagnostics.callbacks);

        loop {
            let n = ctx.track.read(&mut raw)?;
            if n == 0 {
                break;
            }
            ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);
            ctx.resampler.process_into(&raw[..n], &mut resampled);
            if n < raw.len() {
                break;
            }
        }
        if !resampled.is_empty() {
            ctx.pipeline.push_samples(&resampled);
            resampled.clear();
        }

        let now_ms = ctx.clock.now_ms();
        if throttle.ready(Instant::now()) {
            let tick = ctx.pipeline.tick(now_ms);
            publish_tick(ctx, &tick, seq, now_ms);
            seq = seq.wrapping_add(1);
            if seq % SUMMARY_EVERY_TICKS == 0 {
                debug!(
                    seq,
                    score = tick.score,
                    rms = tick.features.rms,
                    flux = tick.features.flux,
                    centroid = tick.features.centroid,
                    voice_likely = tick.voice_likely,
                    "audio tick summary"
                );
            }
        } else {
            PipelineDiagnostics::bump(&ctx.diagnostics.skipped_callbacks);
            let pulse = ctx.pipeline.refresh(now_ms);
            ctx.outputs.lock().spike = pulse;
        }

        std::thread::sleep(ctx.callback_interval);
    }
    Ok(())
}

fn publish_tick(ctx: &AudioWorker, tick: &AudioTick, seq: u64, now_ms: i64) {
    PipelineDiagnostics::bump(&ctx.diagnostics.ticks);
    if tick.decision.fired {
        PipelineDiagnostics::bump(&ctx.diagnostics.spikes);
        info!(score = tick.score, "audio spike");
    }
    if tick.decision.suppressed {
        PipelineDiagnostics::bump(&ctx.diagnostics.suppressed_spikes);
        debug!(score = tick.score, "audio spike suppressed by voice gate");
    }

    {
        let mut outputs = ctx.outputs.lock();
        outputs.score = tick.score;
        outputs.spike = tick.decision.pulse_active;
        outputs.centroid = tick.features.centroid;
        outputs.voice_likely = tick.voice_likely;
    }

    let _ = ctx.signal_tx.send(AudioSignalEvent {
        seq,
        at_ms: now_ms,
        score: tick.score,
        spike: tick.decision.pulse_active,
        fired: tick.decision.fired,
        centroid: tick.features.centroid,
        voice_likely: tick.voice_likely,
        rms: tick.features.rms,
        flux: tick.features.flux,
        high_freq_ratio: tick.features.high_freq_ratio,
    });
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Audio excitement engine handle.
///
/// `Send + Sync`; wrap in `Arc` to share between a host's command handlers
/// and event-forwarding tasks.
pub struct AudioEngine {
    config: AudioConfig,
    clock: Arc<dyn Clock>,
    lifecycle: Lifecycle,
    signal_tx: broadcast::Sender<AudioSignalEvent>,
    outputs: Arc<Mutex<AudioOutputs>>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl AudioEngine {
    pub fn new(config: AudioConfig) -> Self {
        let (signal_tx, _) = broadcast::channel(SIGNAL_BROADCAST_CAP);
        Self {
            config,
            clock: Arc::new(SystemClock),
            lifecycle: Lifecycle::new(Modality::Audio),
            signal_tx,
            outputs: Arc::new(Mutex::new(AudioOutputs::default())),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        }
    }

    /// Replace the wall clock used for cooldowns and pulses.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Attach to the stream's audio track and start the worker.
    ///
    /// Blocks until the track is attached (or fails), then returns; the
    /// loop keeps running on a blocking worker thread. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    /// - `UnsupportedEnvironment` outside a Tokio runtime; the engine
    ///   stays Idle and the stream keeps its track.
    /// - `AlreadyRunning` unless Idle.
    /// - `NoAudioTrack` when the stream has no audio.
    /// - Whatever the track's `start` reports (`PermissionDenied`, device
    ///   errors); the engine returns to Idle with `error` set.
    pub fn start(&self, stream: &mut MediaStream) -> Result<()> {
        let runtime = runtime_handle()?;
        let (handle, done_tx) = self.lifecycle.begin_start()?;
        self.diagnostics.reset();
        *self.outputs.lock() = AudioOutputs::default();

        let Some(mut track) = stream.take_audio_track() else {
            return Err(self.fail_start(SurgeError::NoAudioTrack));
        };

        let pipeline = match AudioPipeline::new(&self.config) {
            Ok(p) => p,
            Err(e) => {
                track.stop();
                return Err(self.fail_start(e));
            }
        };

        let config = self.config.clone();
        let clock = Arc::clone(&self.clock);
        let signal_tx = self.signal_tx.clone();
        let outputs = Arc::clone(&self.outputs);
        let diagnostics = Arc::clone(&self.diagnostics);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        runtime.spawn_blocking(move || {
            let attached = track.start().and_then(|()| {
                RateConverter::new(
                    track.sample_rate(),
                    config.analysis_sample_rate,
                    DEFAULT_CHUNK_SIZE,
                )
            });
            let resampler = match attached {
                Ok(r) => r,
                Err(e) => {
                    track.stop();
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };

            outputs.lock().permission_state = PermissionState::Granted;
            handle.promote_running();
            let _ = open_tx.send(Ok(()));

            let mut worker = AudioWorker {
                track,
                pipeline,
                resampler,
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
                info!("audio engine running");
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail_start(e)),
            Err(_) => Err(self.fail_start(SurgeError::Other(anyhow::anyhow!(
                "audio worker died before attaching"
            )))),
        }
    }

    /// Stop the worker and wait for it to release the track.
    ///
    /// # Errors
    /// `NotRunning` when Idle.
    pub fn stop(&self) -> Result<()> {
        self.lifecycle.stop()
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() != PipelineState::Idle
    }

    /// Latest outputs (polled view of the tick stream).
    pub fn outputs(&self) -> AudioOutputs {
        self.outputs.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioSignalEvent> {
        self.signal_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<PipelineStatusEvent> {
        self.lifecycle.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn fail_start(&self, err: SurgeError) -> SurgeError {
        warn!("audio engine failed to start: {err}");
        {
            let mut outputs = self.outputs.lock();
            outputs.error = Some(err.to_string());
            if err.is_permission_denied() {
                outputs.permission_state = PermissionState::Denied;
            }
        }
        self.lifecycle.abort_start(err.to_string());
        err
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

/// Cleanup pass: release the track, clear the pulse, report how the run ended.
fn finish_worker(mut worker: AudioWorker, result: Result<()>) {
    worker.track.stop();

    let detail = match &result {
        Ok(()) => None,
        Err(e) => {
            warn!("audio pipeline ended: {e}");
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
        samples_in = snap.samples_in,
        spikes = snap.spikes,
        suppressed_spikes = snap.suppressed_spikes,
        "audio pipeline stopped, diagnostics"
    );

    let handle = worker.handle.clone();
    // Windows, spectrum history and voice counters go with the worker.
    drop(worker);
    handle.finish(detail);
}
