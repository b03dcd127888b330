//! Feedback sound cues
//!
//! Short tones for recording start/stop/cancel and errors. The tones are
//! generated at startup rather than shipped as binary assets. rodio's
//! OutputStream is not Send, so playback runs on its own thread fed by a
//! channel; play() just enqueues and never blocks the caller.

use crate::config::FeedbackConfig;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::Cursor;
use tokio::sync::mpsc;

/// Sound event types
#[derive(Debug, Clone, Copy)]
pub enum SoundEvent {
    /// Recording started
    RecordingStart,
    /// Recording stopped, processing begins
    RecordingStop,
    /// Recording cancelled by a quick tap
    Cancelled,
    /// Something went wrong
    Error,
}

/// Handle to the feedback playback thread
pub struct SoundPlayer {
    tx: mpsc::UnboundedSender<SoundEvent>,
}

impl SoundPlayer {
    /// Spawn the playback thread. Returns None when feedback is disabled;
    /// failures to open the output device are logged on the thread and
    /// silently drop subsequent events.
    pub fn spawn(config: &FeedbackConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let volume = config.volume.clamp(0.0, 1.0);
        let (tx, mut rx) = mpsc::unbounded_channel::<SoundEvent>();

        std::thread::Builder::new()
            .name("voxbar-sound".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("Audio feedback disabled, no output device: {}", e);
                        return;
                    }
                };

                let tones = ToneSet::generate();

                while let Some(event) = rx.blocking_recv() {
                    let data = tones.for_event(event);
                    let source = match Decoder::new(Cursor::new(data.to_vec())) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!("Failed to decode feedback tone: {}", e);
                            continue;
                        }
                    };
                    match Sink::try_new(&handle) {
                        Ok(sink) => {
                            sink.append(source.amplify(volume));
                            sink.detach();
                        }
                        Err(e) => tracing::warn!("Failed to play feedback tone: {}", e),
                    }
                }
            })
            .ok()?;

        Some(Self { tx })
    }

    /// Enqueue a sound cue; cheap and non-blocking
    pub fn play(&self, event: SoundEvent) {
        let _ = self.tx.send(event);
    }
}

/// Pre-generated WAV data for each event
struct ToneSet {
    start: Vec<u8>,
    stop: Vec<u8>,
    cancel: Vec<u8>,
    error: Vec<u8>,
}

impl ToneSet {
    fn generate() -> Self {
        Self {
            // Rising pair: recording is live
            start: sweep_wav(440.0, 880.0, 150, 20),
            // Falling pair: recording done
            stop: sweep_wav(880.0, 440.0, 150, 20),
            // Single short blip for cancel
            cancel: tone_wav(600.0, 80, 10),
            // Low warning
            error: sweep_wav(300.0, 200.0, 200, 30),
        }
    }

    fn for_event(&self, event: SoundEvent) -> &[u8] {
        match event {
            SoundEvent::RecordingStart => &self.start,
            SoundEvent::RecordingStop => &self.stop,
            SoundEvent::Cancelled => &self.cancel,
            SoundEvent::Error => &self.error,
        }
    }
}

const TONE_SAMPLE_RATE: u32 = 44100;

/// Render a single sine tone with a fade envelope as WAV bytes
fn tone_wav(frequency: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    render_wav(duration_ms, fade_ms, |_| frequency)
}

/// Render a two-segment tone (first half freq_a, second half freq_b)
fn sweep_wav(freq_a: f32, freq_b: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    render_wav(duration_ms, fade_ms, move |progress| {
        if progress < 0.5 {
            freq_a
        } else {
            freq_b
        }
    })
}

fn render_wav(duration_ms: u32, fade_ms: u32, freq_at: impl Fn(f32) -> f32) -> Vec<u8> {
    let num_samples = (TONE_SAMPLE_RATE * duration_ms / 1000) as usize;
    let fade_samples = ((TONE_SAMPLE_RATE * fade_ms / 1000) as usize).max(1);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TONE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = match hound::WavWriter::new(&mut cursor, spec) {
            Ok(w) => w,
            Err(_) => return Vec::new(),
        };
        for i in 0..num_samples {
            let t = i as f32 / TONE_SAMPLE_RATE as f32;
            let progress = i as f32 / num_samples as f32;
            let mut amplitude = (2.0 * std::f32::consts::PI * freq_at(progress) * t).sin();

            // Fade in/out to avoid clicks
            if i < fade_samples {
                amplitude *= i as f32 / fade_samples as f32;
            } else if i >= num_samples - fade_samples {
                amplitude *= (num_samples - i) as f32 / fade_samples as f32;
            }

            if writer.write_sample((amplitude * 16000.0) as i16).is_err() {
                return Vec::new();
            }
        }
        if writer.finalize().is_err() {
            return Vec::new();
        }
    }

    cursor.into_inner()
}
