//! Voxbar: push-to-talk dictation for the macOS menu bar
//!
//! This library provides the core functionality for:
//! - Detecting the trigger key globally via a CGEventTap
//! - Classifying tap/hold gestures (hold = record, tap = cancel,
//!   double-tap = re-paste, triple-tap = undo)
//! - Capturing audio via cpal with live level feedback
//! - Handing audio to an external transcription command
//! - Cleaning transcripts (external LLM command or built-in filler stripper)
//! - Persisting history to SQLite and pasting via clipboard + Cmd+V
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────┐ press/release ┌───────────────────┐  intents  ┌──────────────┐
//!  │ KeyListener │ ─────────────▶│ GestureClassifier │ ─────────▶│   Session    │
//!  │ (CGEventTap)│               └───────────────────┘           │ Orchestrator │
//!  └─────────────┘                                               └──────┬───────┘
//!                                                                       │
//!                  ┌──────────────┬──────────────┬──────────────┬───────┴──────┐
//!                  ▼              ▼              ▼              ▼              ▼
//!            ┌──────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐
//!            │ Capture  │  │ Transcriber│  │ Cleaner  │  │ History  │  │ Injector │
//!            │  (cpal)  │  │ (command)  │  │(command /│  │ (SQLite) │  │(pbcopy + │
//!            └──────────┘  └────────────┘  │  regex)  │  └──────────┘  │  Cmd+V)  │
//!                                          └──────────┘                └──────────┘
//! ```
//!
//! The session phase machine is Idle -> Recording -> Processing -> Idle,
//! with a direct cancel edge back to Idle and a failsafe timer that forces
//! the reset if processing hangs.

pub mod audio;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gesture;
pub mod history;
pub mod hotkey;
pub mod indicator;
pub mod inject;
pub mod session;
pub mod sound;
pub mod transcribe;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, VoxbarError};
pub use session::{Session, SessionConfig, SessionDeps};
