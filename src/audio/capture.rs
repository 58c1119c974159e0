use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Raw audio as delivered by the input device, before any conversion.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Interleaved PCM samples at the device's native layout.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Milliseconds since capture started.
    pub timestamp_ms: u64,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio capture error: {0}")]
    Backend(String),
}

/// Capture frames buffered between the device callback and the encoder task.
/// A full queue drops frames rather than blocking the hardware thread.
const RAW_FRAME_QUEUE: usize = 32;

/// Capture holds an exclusive hardware tap; one per process.
static CAPTURE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Audio capture backend trait
///
/// `start` hands back a channel of raw frames; `stop` is idempotent and
/// releases the hardware tap before returning, so a subsequent `start`
/// never races the previous teardown.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn start(&mut self) -> Result<mpsc::Receiver<RawFrame>, CaptureError>;

    async fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_capturing(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Microphone capture via cpal.
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated OS
/// thread; the device callback hands frames off through a bounded channel.
pub struct MicrophoneBackend {
    device_name: Option<String>,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<RawFrame>, CaptureError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CaptureError::Backend("capture already started".into()));
        }
        if CAPTURE_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CaptureError::Backend(
                "another capture is active in this process".into(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(RAW_FRAME_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let capturing = Arc::clone(&self.capturing);

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(device_name.as_deref(), frame_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
                    let _ = ready_tx.send(Err(map_message(&e.to_string())));
                    return;
                }

                capturing.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                // Parked until stop() signals or the backend is dropped.
                let _ = stop_rx.recv();

                drop(stream);
                capturing.store(false, Ordering::SeqCst);
                CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
                debug!("microphone capture thread finished");
            })
            .map_err(|e| {
                CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
                CaptureError::Backend(e.to_string())
            })?;

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("microphone capture started");
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                CAPTURE_ACTIVE.store(false, Ordering::SeqCst);
                Err(CaptureError::Backend("capture thread exited early".into()))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        // Idempotent: nothing to do when not running.
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };
        let _ = stop_tx.send(());
        drop(stop_tx);

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    warn!("microphone capture thread panicked");
                }
            })
            .await
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        }

        info!("microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn open_input_stream(
    device_name: Option<&str>,
    frame_tx: mpsc::Sender<RawFrame>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| map_message(&e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceUnavailable(name.to_string()))?,
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input".into()))?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| map_config_error(e))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    info!(
        device = %device.name().unwrap_or_else(|_| "<unknown>".into()),
        sample_rate,
        channels,
        ?sample_format,
        "opening input stream"
    );

    let started = Instant::now();
    let err_fn = |e| warn!("input stream error: {}", e);

    let stream = match sample_format {
        SampleFormat::I16 => device
            .build_input_stream(
                &config,
                move |data: &[i16], _| {
                    push_frame(&frame_tx, data.to_vec(), sample_rate, channels, started);
                },
                err_fn,
                None,
            )
            .map_err(map_build_error)?,
        SampleFormat::F32 => device
            .build_input_stream(
                &config,
                move |data: &[f32], _| {
                    let samples = data
                        .iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    push_frame(&frame_tx, samples, sample_rate, channels, started);
                },
                err_fn,
                None,
            )
            .map_err(map_build_error)?,
        SampleFormat::U16 => device
            .build_input_stream(
                &config,
                move |data: &[u16], _| {
                    let samples = data
                        .iter()
                        .map(|s| (*s as i32 - 32_768) as i16)
                        .collect();
                    push_frame(&frame_tx, samples, sample_rate, channels, started);
                },
                err_fn,
                None,
            )
            .map_err(map_build_error)?,
        other => {
            return Err(CaptureError::Backend(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };

    Ok(stream)
}

/// Runs on the device callback thread: hand off, never block. A full queue
/// means the consumer is behind and the frame is dropped.
fn push_frame(
    frame_tx: &mpsc::Sender<RawFrame>,
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    started: Instant,
) {
    let frame = RawFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: started.elapsed().as_millis() as u64,
    };
    if frame_tx.try_send(frame).is_err() {
        trace!("raw frame queue full, dropping frame");
    }
}

fn map_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device disappeared".into())
        }
        other => map_message(&other.to_string()),
    }
}

fn map_config_error(e: cpal::DefaultStreamConfigError) -> CaptureError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device disappeared".into())
        }
        other => map_message(&other.to_string()),
    }
}

/// OS permission failures surface as backend-specific errors with no typed
/// variant in cpal; classify by message.
fn map_message(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Backend(message.to_string())
    }
}
