//! Configuration loading and types for voxbar
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/voxbar/config.toml)
//! 3. Environment variables (VOXBAR_*)
//! 4. CLI arguments (highest priority)
//!
//! The selected trigger key can additionally be overridden by the rebind
//! record in the history store's settings table (written by `voxbar set-key`),
//! which the daemon reads at startup.

use crate::error::VoxbarError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Voxbar Configuration
#
# Location: ~/.config/voxbar/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (menu bar helpers, scripts).
# Use "auto" for the default location, a custom path, or "disabled".
# The daemon writes state ("idle", "recording", "processing") to this
# file whenever it changes.
state_file = "auto"

[hotkey]
# Key to use as the push-to-talk trigger.
# Common choices: RIGHTCOMMAND, RIGHTOPTION, CAPSLOCK, FN, F13-F20
key = "RIGHTCOMMAND"

[audio]
# Audio input device ("auto" picks a real microphone, skipping virtual
# loopback devices like BlackHole; a name matches by substring)
device = "auto"

# Sample rate in Hz (most local ASR models expect 16000)
sample_rate = 16000

# Maximum recording duration in seconds (safety limit)
max_duration_secs = 120

[audio.feedback]
# Audio cues when recording starts/stops
enabled = true
volume = 0.7

[transcribe]
# Model key passed through to the transcription command
model = "parakeet"

# External transcription command. Receives the path to a 16 kHz mono WAV
# file ("{file}" placeholder, or appended as the last argument) and must
# print the transcript (plain text or {"text": ...} JSON) on stdout.
# command = "parakeet-cli transcribe {file}"

[cleanup]
# Pass transcripts through a cleanup step (filler-word removal, grammar)
enabled = true

# Optional external cleanup command (e.g. a local LLM). Receives the raw
# transcript on stdin, prints the cleaned text on stdout. On any failure
# the built-in filler-word stripper is used instead.
# command = "ollama run llama3.2:3b 'Fix grammar and remove filler words. Output only the text:'"

# Timeout for the cleanup command in milliseconds
timeout_ms = 30000

[inject]
# Delay between setting the clipboard and sending the paste keystroke
settle_delay_ms = 50

# Show a notification when text has been injected
notify_on_complete = true

[session]
# Failsafe: force the session back to idle if processing has not
# finished after this many seconds
failsafe_secs = 30
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub transcribe: TranscribeConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub inject: InjectConfig,

    #[serde(default)]
    pub session: SessionTimingConfig,

    /// Optional path to a state file for external integrations.
    /// "auto" resolves to the runtime dir; "disabled" turns it off.
    #[serde(default = "default_state_file")]
    pub state_file: Option<String>,
}

/// Trigger key configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key name, e.g. "RIGHTCOMMAND", "F13", "CAPSLOCK"
    #[serde(default = "default_hotkey_key")]
    pub key: String,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Input device: "auto" for the selection policy, or a name substring
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,

    /// Feedback sound settings
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// Feedback sound configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Volume level (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Speech-to-text collaborator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    /// Model key passed through to the command
    #[serde(default = "default_model")]
    pub model: String,

    /// External transcription command ("{file}" placeholder for the WAV path)
    #[serde(default)]
    pub command: Option<String>,
}

/// Transcript cleanup configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optional external cleanup command (stdin -> stdout)
    #[serde(default)]
    pub command: Option<String>,

    /// Timeout for the cleanup command in milliseconds
    #[serde(default = "default_cleanup_timeout")]
    pub timeout_ms: u64,
}

/// Text injection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InjectConfig {
    /// Delay between clipboard write and paste keystroke
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Notify when text has been injected
    #[serde(default = "default_true")]
    pub notify_on_complete: bool,
}

/// Session orchestration timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionTimingConfig {
    /// Failsafe timeout in seconds
    #[serde(default = "default_failsafe_secs")]
    pub failsafe_secs: u64,
}

fn default_hotkey_key() -> String {
    "RIGHTCOMMAND".to_string()
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration() -> u32 {
    120
}

fn default_volume() -> f32 {
    0.7
}

fn default_model() -> String {
    "parakeet".to_string()
}

fn default_cleanup_timeout() -> u64 {
    30000
}

fn default_settle_delay() -> u64 {
    50
}

fn default_failsafe_secs() -> u64 {
    30
}

fn default_state_file() -> Option<String> {
    Some("auto".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            command: None,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            timeout_ms: default_cleanup_timeout(),
        }
    }
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            notify_on_complete: true,
        }
    }
}

impl Default for SessionTimingConfig {
    fn default() -> Self {
        Self {
            failsafe_secs: default_failsafe_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            transcribe: TranscribeConfig::default(),
            cleanup: CleanupConfig::default(),
            inject: InjectConfig::default(),
            session: SessionTimingConfig::default(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxbar")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state, pid lock)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir())
            .join("voxbar")
    }

    /// Get the data directory (history database)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "voxbar")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path of the transcription history database
    pub fn history_db_path() -> PathBuf {
        Self::data_dir().join("history.db")
    }

    /// Resolve the state file path from config.
    /// Returns None if unset or explicitly disabled.
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file
            .as_ref()
            .and_then(|path| match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            })
    }

    /// Failsafe duration for the session orchestrator
    pub fn failsafe_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session.failsafe_secs.max(1))
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, VoxbarError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| VoxbarError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| VoxbarError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Environment variable overrides
    if let Ok(key) = std::env::var("VOXBAR_HOTKEY") {
        config.hotkey.key = key;
    }
    if let Ok(model) = std::env::var("VOXBAR_MODEL") {
        config.transcribe.model = model;
    }
    if let Ok(cmd) = std::env::var("VOXBAR_TRANSCRIBE_COMMAND") {
        config.transcribe.command = Some(cmd);
    }

    Ok(config)
}
