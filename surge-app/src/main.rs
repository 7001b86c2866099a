//! Surge headless host.
//!
//! Acquires a stream (audio device, WAV file or image sequence), runs the
//! matching engine from `surge-core` and prints alerts as they are raised.
//! Ctrl-C, `--seconds` or the source ending stops the run.

mod alerts;
mod settings;
mod sources;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use settings::{apply_runtime_env_from_settings, default_settings_path, load_settings, save_settings, AppSettings};
use sources::ImageSequenceTrack;
use surge_core::{
    audio::{list_input_devices, CaptureMode, WavFileTrack},
    video::encode_png,
    AudioEngine, CaptureOptions, CpalAudioTrack, MediaStream, Modality, PermissionState,
    PipelineState, PipelineStatusEvent, Sensitivity, VideoEngine,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use alerts::{Alert, AlertFeed};

#[derive(Debug, Parser)]
#[command(name = "surge", version, about = "Live crowd-surge and motion-impact detector")]
struct Cli {
    /// Settings file (defaults to the platform data directory).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Print every tick as a JSON line instead of alerts only.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List audio input devices, best match for the mode first.
    Devices {
        #[arg(long)]
        mode: Option<CaptureMode>,
    },
    /// Watch an audio source for crowd surges.
    Audio(AudioArgs),
    /// Watch an image sequence for motion impacts.
    Video(VideoArgs),
    /// Print the effective settings, or write defaults with `--init`.
    Settings {
        #[arg(long)]
        init: bool,
    },
}

#[derive(Debug, Args)]
struct AudioArgs {
    /// Input device name (exact match).
    #[arg(long)]
    device: Option<String>,
    #[arg(long)]
    mode: Option<CaptureMode>,
    /// Analyse a WAV file in real time instead of a live device.
    #[arg(long, conflicts_with_all = ["device", "mode"])]
    wav: Option<PathBuf>,
    #[arg(long)]
    sensitivity: Option<Sensitivity>,
    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<f64>,
}

#[derive(Debug, Args)]
struct VideoArgs {
    /// Directory of PNG/JPEG frames, played in file-name order.
    #[arg(long)]
    frames: PathBuf,
    /// Playback rate of the image sequence.
    #[arg(long, default_value_t = 8.0)]
    fps: f32,
    #[arg(long = "loop")]
    looping: bool,
    #[arg(long)]
    sensitivity: Option<Sensitivity>,
    #[arg(long)]
    seconds: Option<f64>,
    /// Write the latest heatmap here as PNG on every alert and on exit.
    #[arg(long)]
    heatmap_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("surge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    apply_runtime_env_from_settings(&settings);

    match cli.command {
        Command::Devices { mode } => list_devices(mode.unwrap_or_else(|| settings.capture_mode()), cli.json),
        Command::Settings { init } => show_settings(&settings_path, &settings, init),
        Command::Audio(args) => run_audio(&settings, args, cli.json).await,
        Command::Video(args) => run_video(&settings, args, cli.json).await,
    }
}

fn list_devices(mode: CaptureMode, json: bool) -> anyhow::Result<()> {
    let devices = list_input_devices(mode);
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("no input devices found");
    }
    for d in &devices {
        let mut tags = Vec::new();
        if d.is_recommended {
            tags.push("recommended");
        }
        if d.is_default {
            tags.push("default");
        }
        if d.is_loopback_like {
            tags.push("loopback");
        }
        println!("{:<48} {}", d.name, tags.join(", "));
    }
    Ok(())
}

fn show_settings(path: &Path, settings: &AppSettings, init: bool) -> anyhow::Result<()> {
    if init {
        save_settings(path, settings)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        info!(path = %path.display(), "settings written");
    }
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

async fn run_audio(settings: &AppSettings, args: AudioArgs, json: bool) -> anyhow::Result<()> {
    let mut config = settings.audio_config();
    if let Some(s) = args.sensitivity {
        config.sensitivity = s;
    }
    let threshold = config.sensitivity.threshold(Modality::Audio);

    let stream = match &args.wav {
        Some(path) => {
            let track = WavFileTrack::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            info!(secs = track.duration_secs(), "analysing WAV file");
            MediaStream::new(path.display().to_string()).with_audio_track(track)
        }
        None => {
            let options = CaptureOptions {
                device_name: args
                    .device
                    .clone()
                    .or_else(|| settings.preferred_input_device.clone()),
                mode: args.mode.unwrap_or_else(|| settings.capture_mode()),
            };
            MediaStream::new("capture").with_audio_track(CpalAudioTrack::new(options))
        }
    };

    let engine = Arc::new(AudioEngine::new(config));
    let mut signals = engine.subscribe();
    let mut status = engine.subscribe_status();
    let starter = Arc::clone(&engine);
    let started = run_blocking(move || {
        let mut stream = stream;
        starter.start(&mut stream)
    })
    .await;
    if let Err(e) = started {
        if engine.outputs().permission_state == PermissionState::Denied {
            warn!("audio capture was refused; check the OS privacy settings for this input");
        }
        return Err(e.context("failed to start audio engine"));
    }

    let mut feed = AlertFeed::new(settings.alert_margin, settings.alert_feed_len);
    let run_for = deadline(args.seconds);
    tokio::pin!(run_for);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            _ = &mut run_for => break,
            event = signals.recv() => match event {
                Ok(event) => {
                    if json {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    if let Some(alert) = feed.on_audio(&event, threshold) {
                        report_alert(alert, json)?;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(missed = n, "alert loop fell behind"),
                Err(RecvError::Closed) => break,
            },
            ended = wait_for_idle(&mut status) => {
                if let Some(detail) = ended {
                    warn!("audio pipeline ended: {detail}");
                }
                break;
            }
        }
    }

    if engine.is_running() {
        let stopper = Arc::clone(&engine);
        run_blocking(move || stopper.stop()).await.context("failed to stop audio engine")?;
    }
    let diag = engine.diagnostics_snapshot();
    info!(ticks = diag.ticks, spikes = diag.spikes, suppressed = diag.suppressed_spikes, alerts = feed.len(), "audio run finished");
    if let Some(err) = engine.outputs().error {
        warn!("last audio error: {err}");
    }
    print_feed(&feed, json);
    Ok(())
}

async fn run_video(settings: &AppSettings, args: VideoArgs, json: bool) -> anyhow::Result<()> {
    let mut config = settings.video_config();
    if let Some(s) = args.sensitivity {
        config.sensitivity = s;
    }
    let threshold = config.sensitivity.threshold(Modality::Video);

    let track = ImageSequenceTrack::from_dir(&args.frames, args.fps, args.looping)
        .with_context(|| format!("failed to read frames from {}", args.frames.display()))?;
    info!(frames = track.len(), fps = args.fps, "playing image sequence");
    let stream = MediaStream::new(args.frames.display().to_string()).with_video_track(track);

    let engine = Arc::new(VideoEngine::new(config));
    let mut signals = engine.subscribe();
    let mut status = engine.subscribe_status();
    let starter = Arc::clone(&engine);
    run_blocking(move || {
        let mut stream = stream;
        starter.start(&mut stream)
    })
    .await
    .context("failed to start video engine")?;

    let mut feed = AlertFeed::new(settings.alert_margin, settings.alert_feed_len);
    let run_for = deadline(args.seconds);
    tokio::pin!(run_for);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            _ = &mut run_for => break,
            event = signals.recv() => match event {
                Ok(event) => {
                    if json {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    if let Some(alert) = feed.on_video(&event, threshold) {
                        report_alert(alert, json)?;
                        if let (Some(path), Some(raster)) = (&args.heatmap_out, &event.heatmap) {
                            write_heatmap(path, raster)?;
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(missed = n, "alert loop fell behind"),
                Err(RecvError::Closed) => break,
            },
            ended = wait_for_idle(&mut status) => {
                if let Some(detail) = ended {
                    info!("video pipeline ended: {detail}");
                }
                break;
            }
        }
    }

    if engine.is_running() {
        let stopper = Arc::clone(&engine);
        run_blocking(move || stopper.stop()).await.context("failed to stop video engine")?;
    }
    let outputs = engine.outputs();
    if let (Some(path), Some(raster)) = (&args.heatmap_out, &outputs.heatmap) {
        write_heatmap(path, raster)?;
    }
    let diag = engine.diagnostics_snapshot();
    info!(ticks = diag.ticks, spikes = diag.spikes, skipped_frames = diag.frames_skipped, alerts = feed.len(), "video run finished");
    print_feed(&feed, json);
    Ok(())
}

/// Engine `start`/`stop` block on the worker; keep them off the async threads.
async fn run_blocking<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> surge_core::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("engine task panicked")??;
    Ok(())
}

async fn deadline(seconds: Option<f64>) {
    match seconds.filter(|s| s.is_finite() && *s > 0.0) {
        Some(s) => tokio::time::sleep(Duration::from_secs_f64(s)).await,
        None => std::future::pending().await,
    }
}

/// Resolve once the pipeline reports Idle, yielding the status detail.
async fn wait_for_idle(status: &mut broadcast::Receiver<PipelineStatusEvent>) -> Option<String> {
    loop {
        match status.recv().await {
            Ok(PipelineStatusEvent {
                state: PipelineState::Idle,
                detail,
                ..
            }) => return detail,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertLine<'a> {
    alert: &'a Alert,
}

fn report_alert(alert: &Alert, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(&AlertLine { alert })?);
        return Ok(());
    }
    let when = alert
        .local_time()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".into());
    println!("[{when}] {} (score {:.2})", alert.label, alert.score);
    Ok(())
}

/// Recap of the most recent alerts, oldest first.
fn print_feed(feed: &AlertFeed, json: bool) {
    if json || feed.is_empty() {
        return;
    }
    println!("recent alerts:");
    let recent: Vec<&Alert> = feed.alerts().collect();
    for alert in recent.iter().rev() {
        let when = alert
            .local_time()
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        println!("  {when} {:<24} {:.2}", alert.label, alert.score);
    }
}

fn write_heatmap(path: &Path, raster: &image::RgbaImage) -> anyhow::Result<()> {
    let png = encode_png(raster).context("failed to encode heatmap")?;
    std::fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
