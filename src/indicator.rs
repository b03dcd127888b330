//! Recording indicator collaborator
//!
//! The session reports its visual state through this trait; rendering is
//! someone else's job. The shipped implementation writes the state to a
//! runtime file that menu-bar helpers and scripts can watch, keeps the
//! latest audio level in an atomic cell, and surfaces status lines through
//! the log (plus an optional macOS notification on completed injections).
//!
//! All methods are called from non-UI threads; update_level runs on the
//! audio stream context and therefore only touches the atomic cell.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

/// Session-facing indicator contract
pub trait Indicator: Send + Sync {
    /// Recording has started
    fn show(&self);

    /// The session is back to idle
    fn hide(&self);

    /// Toggle the processing visual (spinner vs. live level)
    fn set_processing(&self, on: bool);

    /// Latest capture level in [0, 1]; must be O(1) and non-blocking
    fn update_level(&self, level: f32);

    /// Short user-visible status line
    fn set_status(&self, status: &str);

    /// Announce a completed injection (e.g. a desktop notification)
    fn notify_complete(&self, summary: &str);
}

/// State-file backed indicator
pub struct StateFileIndicator {
    state_file: Option<PathBuf>,
    level_bits: AtomicU32,
    notify_on_complete: bool,
}

impl StateFileIndicator {
    pub fn new(state_file: Option<PathBuf>, notify_on_complete: bool) -> Self {
        Self {
            state_file,
            level_bits: AtomicU32::new(0),
            notify_on_complete,
        }
    }

    /// The most recent audio level reported by the capture stream
    pub fn current_level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    fn write_state(&self, state: &str) {
        let Some(ref path) = self.state_file else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create state file directory: {}", e);
                return;
            }
        }
        if let Err(e) = std::fs::write(path, state) {
            tracing::warn!("Failed to write state file: {}", e);
        } else {
            tracing::trace!("State file updated: {}", state);
        }
    }

    /// Remove the state file on shutdown
    pub fn remove_state_file(&self) {
        if let Some(ref path) = self.state_file {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!("Failed to remove state file: {}", e);
                }
            }
        }
    }
}

impl Indicator for StateFileIndicator {
    fn show(&self) {
        self.write_state("recording");
    }

    fn hide(&self) {
        self.level_bits.store(0, Ordering::Relaxed);
        self.write_state("idle");
    }

    fn set_processing(&self, on: bool) {
        if on {
            self.write_state("processing");
        }
    }

    fn update_level(&self, level: f32) {
        self.level_bits
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn set_status(&self, status: &str) {
        tracing::info!("Status: {}", status);
    }

    fn notify_complete(&self, summary: &str) {
        if !self.notify_on_complete {
            return;
        }
        send_notification(summary);
    }
}

/// Post a desktop notification via osascript. Called from the pipeline
/// worker, which may block.
#[cfg(target_os = "macos")]
fn send_notification(text: &str) {
    let preview: String = text.chars().take(80).collect();
    let preview = if text.chars().count() > 80 {
        format!("{}...", preview)
    } else {
        preview
    };
    let escaped = preview.replace('\\', "\\\\").replace('"', "\\\"");
    let script = format!(
        r#"display notification "{}" with title "Voxbar""#,
        escaped
    );

    let _ = std::process::Command::new("osascript")
        .args(["-e", &script])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}

#[cfg(not(target_os = "macos"))]
fn send_notification(_text: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let indicator = StateFileIndicator::new(Some(path.clone()), false);

        indicator.show();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "recording");

        indicator.set_processing(true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "processing");

        indicator.hide();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "idle");

        indicator.remove_state_file();
        assert!(!path.exists());
    }

    #[test]
    fn test_level_cell() {
        let indicator = StateFileIndicator::new(None, false);
        indicator.update_level(0.42);
        assert!((indicator.current_level() - 0.42).abs() < 1e-6);

        // Out-of-range levels are clamped to the contract
        indicator.update_level(7.0);
        assert_eq!(indicator.current_level(), 1.0);
        indicator.update_level(-1.0);
        assert_eq!(indicator.current_level(), 0.0);
    }

    #[test]
    fn test_no_state_file_is_fine() {
        let indicator = StateFileIndicator::new(None, false);
        indicator.show();
        indicator.hide();
    }
}
