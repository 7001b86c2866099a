//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block or perform I/O, so it only down-mixes to mono and
//! writes into an SPSC ring producer whose `push_slice` is lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `CpalAudioTrack::start` therefore parks the stream on a dedicated
//! device thread that builds it, keeps it alive and drops it on shutdown. The
//! track itself only holds the consumer half and is freely `Send`.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc, Arc,
    },
    thread::JoinHandle,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig, StreamError,
};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{
    audio::device::{pick_device, CaptureMode},
    buffering::{create_audio_ring, AudioConsumer, AudioProducer, Consumer, Producer},
    error::{Result, SurgeError},
    stream::AudioTrack,
};

/// Which input to open.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Exact device name; falls back to mode-based selection when absent
    /// or not found.
    pub device_name: Option<String>,
    pub mode: CaptureMode,
}

#[derive(Debug, Clone)]
enum StreamFault {
    DeviceLost,
    Backend(String),
}

type FaultSlot = Arc<Mutex<Option<StreamFault>>>;

/// Live input device exposed as an [`AudioTrack`].
///
/// Construction only records which device to use. The device is opened in
/// `start`, so a refused open surfaces through the engine's start path.
pub struct CpalAudioTrack {
    label: String,
    options: CaptureOptions,
    /// Reported by the device once `start` succeeds.
    sample_rate: u32,
    producer: Option<AudioProducer>,
    consumer: AudioConsumer,
    /// Callback no-ops until `start`.
    gate: Arc<AtomicBool>,
    fault: FaultSlot,
    dropped: Arc<AtomicU64>,
    shutdown: Option<mpsc::Sender<()>>,
    device_thread: Option<JoinHandle<()>>,
    stopped: bool,
}

impl CpalAudioTrack {
    pub fn new(options: CaptureOptions) -> Self {
        let (producer, consumer) = create_audio_ring();
        let label = options
            .device_name
            .clone()
            .unwrap_or_else(|| format!("{} input", options.mode));
        Self {
            label,
            options,
            sample_rate: 0,
            producer: Some(producer),
            consumer,
            gate: Arc::new(AtomicBool::new(false)),
            fault: Arc::new(Mutex::new(None)),
            dropped: Arc::new(AtomicU64::new(0)),
            shutdown: None,
            device_thread: None,
            stopped: false,
        }
    }

    /// Samples lost because the ring was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn ended(&self) -> SurgeError {
        SurgeError::TrackEnded(format!("{} was stopped", self.label))
    }
}

impl AudioTrack for CpalAudioTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Open the device and begin streaming.
    ///
    /// Blocks until the device thread reports success or failure.
    ///
    /// # Errors
    /// `NoDefaultInputDevice` when the host has no inputs at all,
    /// `PermissionDenied` when the OS refuses access, `AudioStream` otherwise.
    fn start(&mut self) -> Result<()> {
        if self.stopped || self.shutdown.is_some() {
            return Err(self.ended());
        }
        let Some(producer) = self.producer.take() else {
            return Err(self.ended());
        };

        let (open_tx, open_rx) = mpsc::sync_channel::<Result<(String, u32)>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let options = self.options.clone();
        let gate = Arc::clone(&self.gate);
        let fault = Arc::clone(&self.fault);
        let dropped = Arc::clone(&self.dropped);
        let device_thread = std::thread::Builder::new()
            .name("surge-audio-device".into())
            .spawn(move || match open_stream(&options, producer, gate, fault, dropped) {
                Ok((stream, name, rate)) => {
                    let _ = open_tx.send(Ok((name, rate)));
                    // Returns on explicit shutdown or when the track is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                }
            })?;

        let opened = open_rx
            .recv()
            .map_err(|_| SurgeError::AudioStream("audio device thread exited".into()))
            .and_then(|r| r);
        let (label, sample_rate) = match opened {
            Ok(v) => v,
            Err(e) => {
                self.stopped = true;
                if device_thread.join().is_err() {
                    warn!("audio device thread panicked while opening");
                }
                return Err(e);
            }
        };

        info!(device = label.as_str(), sample_rate, "audio track open");
        self.label = label;
        self.sample_rate = sample_rate;
        self.shutdown = Some(shutdown_tx);
        self.device_thread = Some(device_thread);
        self.gate.store(true, Ordering::Release);
        Ok(())
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        if let Some(fault) = self.fault.lock().clone() {
            return Err(match fault {
                StreamFault::DeviceLost => {
                    SurgeError::TrackEnded(format!("{} is no longer available", self.label))
                }
                StreamFault::Backend(msg) => SurgeError::AudioStream(msg),
            });
        }
        if self.stopped || self.shutdown.is_none() {
            return Err(self.ended());
        }
        Ok(self.consumer.pop_slice(out))
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.gate.store(false, Ordering::Release);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.device_thread.take() {
            if handle.join().is_err() {
                warn!("audio device thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CpalAudioTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(
    options: &CaptureOptions,
    producer: AudioProducer,
    gate: Arc<AtomicBool>,
    fault: FaultSlot,
    dropped: Arc<AtomicU64>,
) -> Result<(Stream, String, u32)> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| classify_open_error(e.to_string()))?
        .collect();
    if devices.is_empty() {
        if let Some(default) = host.default_input_device() {
            devices.push(default);
        } else {
            return Err(SurgeError::NoDefaultInputDevice);
        }
    }
    let names: Vec<String> = devices
        .iter()
        .enumerate()
        .map(|(idx, d)| d.name().unwrap_or_else(|_| format!("Input Device {}", idx + 1)))
        .collect();

    let preferred = options
        .device_name
        .as_deref()
        .and_then(|wanted| names.iter().position(|n| n == wanted));
    if let (Some(wanted), None) = (options.device_name.as_deref(), preferred) {
        warn!("preferred input device '{wanted}' not found, falling back");
    }
    let idx = preferred
        .or_else(|| pick_device(&names, default_name.as_deref(), options.mode))
        .ok_or(SurgeError::NoDefaultInputDevice)?;
    let device = devices.swap_remove(idx);
    let name = names[idx].clone();

    let supported = device
        .default_input_config()
        .map_err(|e| classify_open_error(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let config: StreamConfig = supported.config();

    info!(
        device = name.as_str(),
        mode = %options.mode,
        sample_rate,
        channels = config.channels,
        "opening input device"
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&device, &config, producer, gate, fault, dropped),
        SampleFormat::F64 => build_input::<f64>(&device, &config, producer, gate, fault, dropped),
        SampleFormat::I8 => build_input::<i8>(&device, &config, producer, gate, fault, dropped),
        SampleFormat::I16 => build_input::<i16>(&device, &config, producer, gate, fault, dropped),
        SampleFormat::I32 => build_input::<i32>(&device, &config, producer, gate, fault, dropped),
        SampleFormat::U8 => build_input::<u8>(&device, &config, producer, gate, fault, dropped),
        SampleFormat::U16 => build_input::<u16>(&device, &config, producer, gate, fault, dropped),
        fmt => {
            return Err(SurgeError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| classify_open_error(e.to_string()))?;

    Ok((stream, name, sample_rate))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    gate: Arc<AtomicBool>,
    fault: FaultSlot,
    dropped: Arc<AtomicU64>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut mix: Vec<f32> = Vec::with_capacity(8192);

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !gate.load(Ordering::Relaxed) {
                    return;
                }
                mix.clear();
                mix.extend(data.chunks_exact(channels).map(|frame| {
                    frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / channels as f32
                }));
                let written = producer.push_slice(&mix);
                if written < mix.len() {
                    dropped.fetch_add((mix.len() - written) as u64, Ordering::Relaxed);
                }
            },
            move |err| {
                error!("audio stream error: {err}");
                let next = match err {
                    StreamError::DeviceNotAvailable => StreamFault::DeviceLost,
                    StreamError::BackendSpecific { err } => StreamFault::Backend(err.description),
                };
                *fault.lock() = Some(next);
            },
            None,
        )
        .map_err(|e| classify_open_error(e.to_string()))
}

/// Backends report refused access only through their error text.
fn classify_open_error(message: String) -> SurgeError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("permission")
        || lowered.contains("access denied")
        || lowered.contains("not allowed")
        || lowered.contains("not authorized")
    {
        SurgeError::PermissionDenied(message)
    } else {
        SurgeError::AudioStream(message)
    }
}
