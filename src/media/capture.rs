//! Microphone capture
//!
//! cpal::Stream is not Send, so the stream lives on a dedicated thread and
//! is driven through a command channel. Samples are mixed to mono and
//! resampled to the configured rate inside the stream callback.

use crate::config::AudioConfig;
use crate::error::MediaError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// How long `stop` waits for the capture thread to hand back its buffer
const STOP_TIMEOUT_SECS: u32 = 2;

/// Trait for audio capture implementations
#[async_trait::async_trait]
pub trait AudioCapture: Send {
    /// Open the input device and start buffering samples
    async fn start(&mut self) -> Result<(), MediaError>;

    /// Stop capturing and return all buffered samples (mono, configured rate).
    /// An empty buffer is a valid result.
    async fn stop(&mut self) -> Result<Vec<f32>, MediaError>;
}

/// Factory function to create the platform capture backend
pub fn create_capture(config: &AudioConfig) -> Box<dyn AudioCapture> {
    Box::new(CpalCapture::new(config))
}

enum CaptureCommand {
    Stop(oneshot::Sender<Vec<f32>>),
}

struct StreamBuildParams {
    samples: Arc<Mutex<Vec<f32>>>,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// cpal-based capture
pub struct CpalCapture {
    config: AudioConfig,
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            cmd_tx: None,
            thread_handle: None,
        }
    }
}

/// Find an input device by exact, case-insensitive or substring match
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, MediaError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| MediaError::Stream(e.to_string()))?
        .collect();

    let search_lower = device_name.to_lowercase();
    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();

    let index = names
        .iter()
        .position(|n| n == device_name)
        .or_else(|| names.iter().position(|n| n.to_lowercase() == search_lower))
        .or_else(|| {
            names
                .iter()
                .position(|n| n.to_lowercase().contains(&search_lower))
        });

    match index {
        Some(i) => {
            tracing::debug!("Matched audio device '{}' for '{}'", names[i], device_name);
            devices
                .into_iter()
                .nth(i)
                .ok_or_else(|| MediaError::DeviceNotFound(device_name.to_string()))
        }
        None => {
            tracing::warn!("Available input devices: {:?}", names);
            Err(MediaError::DeviceNotFound(device_name.to_string()))
        }
    }
}

/// Open the configured input device and start its stream.
///
/// Runs on the capture thread; the returned stream must stay there.
fn open_stream(
    config: &AudioConfig,
    samples: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream, MediaError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let device = {
        let host = cpal::default_host();
        if config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| MediaError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &config.device)?
        }
    };

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    tracing::debug!("Using audio device: {}", device_name);

    let supported_config = device
        .default_input_config()
        .map_err(|e| MediaError::Stream(e.to_string()))?;

    let source_channels = supported_config.channels() as usize;
    let sample_format = supported_config.sample_format();

    tracing::debug!(
        "Device config: {} Hz, {} channel(s), format: {:?}",
        supported_config.sample_rate().0,
        source_channels,
        sample_format
    );

    let stream_config = cpal::StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err| tracing::error!("Audio stream error: {}", err);

    let params = StreamBuildParams {
        samples,
        source_rate: supported_config.sample_rate().0,
        target_rate: config.sample_rate,
        source_channels,
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, params, err_fn),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, params, err_fn),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, params, err_fn),
        format => Err(MediaError::Stream(format!(
            "Unsupported sample format: {:?}",
            format
        ))),
    }?;

    stream
        .play()
        .map_err(|e| MediaError::Stream(e.to_string()))?;
    Ok(stream)
}

#[async_trait::async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> Result<(), MediaError> {
        if self.cmd_tx.is_some() {
            return Err(MediaError::InvalidState("capture already running".into()));
        }

        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), MediaError>>();
        let config = self.config.clone();

        // Device lookup and stream setup block, so they happen here too
        let thread_handle = thread::spawn(move || {
            let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
            let stream = match open_stream(&config, samples.clone()) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            tracing::debug!("Audio capture thread started");

            if let Ok(CaptureCommand::Stop(response_tx)) = cmd_rx.recv() {
                drop(stream);
                let collected = match samples.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                let _ = response_tx.send(collected);
            }

            tracing::debug!("Audio capture thread stopped");
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.cmd_tx = Some(cmd_tx);
                self.thread_handle = Some(thread_handle);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MediaError::Stream("capture thread exited".into())),
        }
    }

    async fn stop(&mut self) -> Result<Vec<f32>, MediaError> {
        let samples = if let Some(cmd_tx) = self.cmd_tx.take() {
            let (response_tx, response_rx) = oneshot::channel();

            if cmd_tx.send(CaptureCommand::Stop(response_tx)).is_ok() {
                match tokio::time::timeout(
                    Duration::from_secs(STOP_TIMEOUT_SECS as u64),
                    response_rx,
                )
                .await
                {
                    Ok(Ok(samples)) => samples,
                    Ok(Err(_)) => return Err(MediaError::Stream("Channel closed".to_string())),
                    Err(_) => return Err(MediaError::Timeout(STOP_TIMEOUT_SECS)),
                }
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        tracing::debug!(
            "Audio capture stopped: {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f32 / self.config.sample_rate as f32
        );

        Ok(samples)
    }
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: StreamBuildParams,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, MediaError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let StreamBuildParams {
        samples,
        source_rate,
        target_rate,
        source_channels,
    } = params;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = resample(&mono, source_rate, target_rate);

                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| MediaError::Stream(e.to_string()))
}

/// Linear interpolation resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..new_len)
        .map(|i| {
            let src_idx = i as f64 / ratio;
            let idx = src_idx.floor() as usize;
            let frac = (src_idx - idx as f64) as f32;
            if idx + 1 < samples.len() {
                samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
            } else {
                samples.get(idx).copied().unwrap_or(0.0)
            }
        })
        .collect()
}
