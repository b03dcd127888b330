//! cpal-based microphone capture
//!
//! cpal::Stream is not Send, so the stream lives on a dedicated thread and
//! start/stop talk to it over channels. Incoming chunks are mixed to mono,
//! resampled to the target rate, accumulated into the session buffer, and
//! reported to the level callback as an RMS value.
//!
//! Device policy: virtual loopback devices (BlackHole, Soundflower, ...)
//! are never picked automatically because they capture system output, not
//! the user's voice. A built-in microphone is preferred for reliability.

use super::{AudioBuffer, AudioCapture, LevelCallback};
use crate::config::AudioConfig;
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Virtual audio loopback devices excluded from automatic selection
const VIRTUAL_DEVICE_PATTERNS: &[&str] = &["blackhole", "soundflower", "loopback", "virtual"];

/// Name fragments that indicate the machine's built-in microphone
const BUILTIN_HINTS: &[&str] = &["macbook", "built-in"];

/// How long stop() waits for the stream thread to hand back the buffer
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

enum CaptureCommand {
    Stop(mpsc::Sender<AudioBuffer>),
}

/// Everything the input-stream callback needs
struct StreamParams {
    samples: Arc<Mutex<AudioBuffer>>,
    level: LevelCallback,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// Microphone capture controller
pub struct MicCapture {
    config: AudioConfig,
    level: LevelCallback,
    cmd_tx: Option<mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MicCapture {
    pub fn new(config: &AudioConfig, level: LevelCallback) -> Self {
        Self {
            config: config.clone(),
            level,
            cmd_tx: None,
            thread_handle: None,
        }
    }
}

/// True when the device name matches the virtual-loopback denylist
fn is_virtual_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    VIRTUAL_DEVICE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// True when the device name looks like the built-in microphone
fn is_builtin_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    BUILTIN_HINTS.iter().any(|h| lower.contains(h))
}

/// Pick an input device per the selection policy: skip virtual loopbacks,
/// prefer the built-in microphone, otherwise the first real candidate,
/// otherwise whatever the OS calls the default.
fn select_input_device(host: &cpal::Host) -> Result<cpal::Device, AudioError> {
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?;

    let mut builtin: Option<cpal::Device> = None;
    let mut first_real: Option<cpal::Device> = None;

    for device in devices {
        let name = match device.name() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if is_virtual_device(&name) {
            tracing::debug!("Skipping virtual audio device: {}", name);
            continue;
        }
        if builtin.is_none() && is_builtin_device(&name) {
            builtin = Some(device);
        } else if first_real.is_none() {
            first_real = Some(device);
        }
    }

    builtin
        .or(first_real)
        .or_else(|| host.default_input_device())
        .ok_or(AudioError::NoInputDevice)
}

/// Find a named input device, by exact then case-insensitive substring match
fn find_input_device(host: &cpal::Host, wanted: &str) -> Result<cpal::Device, AudioError> {
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let wanted_lower = wanted.to_lowercase();
    let mut substring_match: Option<cpal::Device> = None;

    for device in devices {
        let name = match device.name() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if name == wanted {
            return Ok(device);
        }
        if substring_match.is_none() && name.to_lowercase().contains(&wanted_lower) {
            substring_match = Some(device);
        }
    }

    substring_match.ok_or_else(|| AudioError::Connection(format!("device not found: {}", wanted)))
}

impl AudioCapture for MicCapture {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.cmd_tx.is_some() {
            return Err(AudioError::Stream("capture already running".to_string()));
        }

        let host = cpal::default_host();
        let device = if self.config.device == "auto" || self.config.device == "default" {
            select_input_device(&host)?
        } else {
            find_input_device(&host, &self.config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let sample_format = supported_config.sample_format();
        let target_rate = self.config.sample_rate;

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format {:?}",
            source_rate,
            source_channels,
            sample_format
        );

        let (cmd_tx, cmd_rx) = mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

        let samples = Arc::new(Mutex::new(AudioBuffer::new()));
        let samples_thread = samples.clone();
        let level = self.level.clone();

        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio stream error: {}", err);

            let params = StreamParams {
                samples: samples_thread.clone(),
                level,
                source_rate,
                target_rate,
                source_channels,
            };

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, params, err_fn),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, params, err_fn),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, params, err_fn),
                format => Err(AudioError::Stream(format!(
                    "unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            tracing::debug!("Audio capture thread started");

            // Block until stop; dropping the stream ends delivery
            if let Ok(CaptureCommand::Stop(reply_tx)) = cmd_rx.recv() {
                drop(stream);
                let collected = samples_thread.lock().unwrap().clone();
                let _ = reply_tx.send(collected);
            }

            tracing::debug!("Audio capture thread stopped");
        });

        // Surface stream setup failures to the caller instead of recording
        // silently into nothing
        match ready_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                return Err(AudioError::Stream(
                    "audio stream did not start in time".to_string(),
                ));
            }
        }

        self.cmd_tx = Some(cmd_tx);
        self.thread_handle = Some(thread_handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioBuffer, AudioError> {
        let cmd_tx = self
            .cmd_tx
            .take()
            .ok_or_else(|| AudioError::Stream("capture not running".to_string()))?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let samples = if cmd_tx.send(CaptureCommand::Stop(reply_tx)).is_ok() {
            match reply_rx.recv_timeout(STOP_TIMEOUT) {
                Ok(samples) => samples,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(AudioError::StopTimeout(STOP_TIMEOUT.as_secs()))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(AudioError::Stream("capture thread died".to_string()))
                }
            }
        } else {
            AudioBuffer::new()
        };

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        tracing::debug!(
            "Audio capture stopped: {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f32 / self.config.sample_rate as f32
        );

        if samples.is_empty() {
            return Err(AudioError::EmptyRecording);
        }

        Ok(samples)
    }
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: StreamParams,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let StreamParams {
        samples,
        level,
        source_rate,
        target_rate,
        source_channels,
    } = params;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Mix interleaved frames down to mono f32
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

                // Level feedback from the raw mono signal; must stay O(1)-ish
                // per chunk and never block
                level(chunk_rms(&mono));

                let resampled = if source_rate != target_rate {
                    resample(&mono, source_rate, target_rate)
                } else {
                    mono
                };

                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    Ok(stream)
}

/// Root-mean-square amplitude of a chunk, clamped to [0, 1]
fn chunk_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_sq.sqrt().clamp(0.0, 1.0)
}

/// Linear interpolation resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src = i as f64 / ratio;
        let idx = src.floor() as usize;
        let frac = (src - idx as f64) as f32;
        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };
        out.push(sample);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_device_denylist() {
        assert!(is_virtual_device("BlackHole 2ch"));
        assert!(is_virtual_device("Soundflower (64ch)"));
        assert!(is_virtual_device("Loopback Audio"));
        assert!(is_virtual_device("My Virtual Cable"));
        assert!(!is_virtual_device("MacBook Pro Microphone"));
        assert!(!is_virtual_device("USB Audio Device"));
    }

    #[test]
    fn test_builtin_preference() {
        assert!(is_builtin_device("MacBook Pro Microphone"));
        assert!(is_builtin_device("Built-in Microphone"));
        assert!(!is_builtin_device("Elgato Wave:3"));
    }

    #[test]
    fn test_chunk_rms() {
        assert_eq!(chunk_rms(&[]), 0.0);
        assert_eq!(chunk_rms(&[0.0, 0.0]), 0.0);
        let rms = chunk_rms(&[0.5, -0.5, 0.5, -0.5]);
        assert!((rms - 0.5).abs() < 1e-6);
        // Clipped input still lands in [0, 1]
        assert!(chunk_rms(&[2.0, -2.0]) <= 1.0);
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        assert_eq!(resample(&samples, 8000, 16000).len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }
}
