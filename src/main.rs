//! Voxbar - Push-to-talk dictation for the macOS menu bar
//!
//! Run with `voxbar` or `voxbar daemon` to start the daemon.
//! Use `voxbar history` / `voxbar stats` to inspect past transcriptions,
//! and `voxbar set-key` to rebind the trigger key.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxbar::cli::{Cli, Commands};
use voxbar::config::{self, Config};
use voxbar::history::{HistoryStore, SETTING_TRIGGER_KEY};
use voxbar::{daemon, hotkey};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voxbar={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // CLI overrides
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }
    if let Some(model) = cli.model {
        config.transcribe.model = model;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }

        Commands::History { limit, json } => {
            show_history(limit, json)?;
        }

        Commands::Stats { json } => {
            show_stats(json)?;
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::SetKey { key } => {
            rebind_key(&key)?;
        }

        Commands::ClearHistory => {
            let store = HistoryStore::open(&Config::history_db_path())?;
            let removed = store.clear_history()?;
            println!("Deleted {} transcription(s)", removed);
        }
    }

    Ok(())
}

/// Print recent transcriptions
fn show_history(limit: u32, json: bool) -> anyhow::Result<()> {
    let store = HistoryStore::open(&Config::history_db_path())?;
    let records = store.get_transcriptions(limit, 0)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No transcriptions yet.");
        return Ok(());
    }

    for record in records {
        let when = record
            .created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M");
        let preview: String = record.text.chars().take(60).collect();
        let ellipsis = if record.text.chars().count() > 60 { "..." } else { "" };
        println!(
            "{:>5}  {}  {:>5.1}s  {:>4}w  {}{}",
            record.id, when, record.duration_seconds, record.word_count, preview, ellipsis
        );
    }

    Ok(())
}

/// Print usage statistics
fn show_stats(json: bool) -> anyhow::Result<()> {
    let store = HistoryStore::open(&Config::history_db_path())?;
    let stats = store.get_statistics()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Transcriptions: {}", stats.total_transcriptions);
    println!("Words:          {}", stats.total_words);
    println!("Recorded:       {:.1} min", stats.total_minutes);
    println!("Average speed:  {:.1} wpm", stats.avg_wpm);
    println!(
        "Today:          {} transcription(s), {} word(s)",
        stats.today_count, stats.today_words
    );

    Ok(())
}

/// Validate and persist a trigger-key rebind. The daemon picks it up at
/// next startup.
fn rebind_key(key: &str) -> anyhow::Result<()> {
    let canonical = hotkey::canonical_key_name(key)?;
    let store = HistoryStore::open(&Config::history_db_path())?;
    store.set_setting(SETTING_TRIGGER_KEY, &canonical)?;
    println!("Trigger key set to {}", canonical);
    println!("Restart the daemon for the change to take effect.");
    Ok(())
}
