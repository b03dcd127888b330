//! Audio capture module
//!
//! Microphone capture via cpal. The capture controller exclusively owns the
//! input stream between start() and stop(); stop() hands the finalized
//! sample buffer to the caller.

pub mod capture;

use crate::config::AudioConfig;
use crate::error::AudioError;
use std::sync::Arc;

/// Audio samples collected during recording (f32, mono, at the configured rate)
pub type AudioBuffer = Vec<f32>;

/// Callback receiving the RMS level of each captured chunk, in [0, 1].
/// Invoked on the audio stream context: implementations must be O(1) and
/// must not block.
pub type LevelCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Trait for audio capture implementations.
///
/// Both calls are blocking but fast: start() spawns the stream, stop()
/// tears it down and returns everything captured since start().
pub trait AudioCapture: Send {
    /// Begin capturing from the microphone
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop capturing and return all recorded samples.
    /// Fails with [`AudioError::EmptyRecording`] when nothing was captured.
    fn stop(&mut self) -> Result<AudioBuffer, AudioError>;
}

/// Factory function to create the microphone capture controller
pub fn create_capture(
    config: &AudioConfig,
    level: LevelCallback,
) -> Result<Box<dyn AudioCapture>, AudioError> {
    Ok(Box::new(capture::MicCapture::new(config, level)))
}
