// Command-line interface definitions for voxbar

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voxbar")]
#[command(author, version, about = "Push-to-talk dictation for the macOS menu bar")]
#[command(long_about = "
Voxbar is a push-to-talk dictation daemon for macOS.
Hold the trigger key (Right Command by default) to record, release to
transcribe and paste into the focused application. A quick tap cancels,
a double tap pastes the last transcript again, a triple tap undoes.

SETUP:
  1. Grant Accessibility permission to your terminal (System Settings >
     Privacy & Security > Accessibility)
  2. Configure a transcription command in ~/.config/voxbar/config.toml
  3. Run: voxbar (to start the daemon)
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the trigger key (e.g. RIGHTCOMMAND, F13, CAPSLOCK)
    #[arg(long, value_name = "KEY")]
    pub hotkey: Option<String>,

    /// Override the transcription model key
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Show recent transcriptions
    History {
        /// Maximum number of records to show
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show usage statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config,

    /// Rebind the push-to-talk trigger key (persisted)
    SetKey {
        /// Key name, e.g. RIGHTCOMMAND, RIGHTOPTION, F13
        key: String,
    },

    /// Delete all transcription history
    ClearHistory,
}
