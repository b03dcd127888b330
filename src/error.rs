//! Error types for voxbar
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the voxbar application
#[derive(Error, Debug)]
pub enum VoxbarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Text injection error: {0}")]
    Inject(#[from] InjectError),

    #[error("History store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the global key listener
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error(
        "Cannot observe global key events: {0}\n  \
         Grant access in: System Settings > Privacy & Security > Accessibility\n  \
         Add your terminal application to the list, then restart voxbar."
    )]
    AccessDenied(String),

    #[error("Unknown key name: '{0}'. Try RIGHTCOMMAND, RIGHTOPTION, CAPSLOCK, FN, or F13-F20.")]
    UnknownKey(String),

    #[error("Key listener failed: {0}")]
    Listener(String),

    #[error("Global key listening is not supported on this platform: {0}")]
    NotSupported(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No usable audio input device found. Check that a microphone is connected.")]
    NoInputDevice,

    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("No audio was captured. Check your microphone.")]
    EmptyRecording,

    #[error("Audio capture did not respond within {0} seconds")]
    StopTimeout(u64),
}

/// Errors from the speech-to-text collaborator
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("No transcription command configured.\n  Set [transcribe] command in config.toml.")]
    NotConfigured,

    #[error("Transcription backend failed to start: {0}")]
    ModelLoad(String),

    #[error("Transcription failed: {0}")]
    Inference(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),
}

/// Errors related to clipboard paste injection
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Nothing to inject: text is empty")]
    EmptyText,

    #[error("Clipboard write failed: {0}")]
    Clipboard(String),

    #[error("Paste keystroke failed: {0}")]
    Keystroke(String),

    #[error("Text injection is not supported on this platform")]
    Unsupported,
}

/// Errors from the transcription history store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using VoxbarError
pub type Result<T> = std::result::Result<T, VoxbarError>;
