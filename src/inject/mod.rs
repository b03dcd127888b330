//! Text injection module
//!
//! Delivers transcribed text into the focused application: clipboard write,
//! short settle delay, then a simulated paste shortcut. The previous
//! clipboard contents are deliberately not restored, so the transcript
//! stays available for manual pasting; restoring would reintroduce
//! read-modify-write races on a shared OS resource.

#[cfg(target_os = "macos")]
pub mod macos;

use crate::config::InjectConfig;
use crate::error::InjectError;
use std::sync::Arc;

/// Trait for text injection implementations
#[async_trait::async_trait]
pub trait TextInjector: Send + Sync {
    /// Place `text` on the clipboard and simulate the paste shortcut.
    /// Empty text is a failure, not a panic.
    async fn inject(&self, text: &str) -> Result<(), InjectError>;

    /// Simulate the platform undo shortcut. Best-effort: errors are logged,
    /// never propagated.
    async fn undo(&self);
}

/// Factory function to create the platform injector
#[cfg(target_os = "macos")]
pub fn create_injector(config: &InjectConfig) -> Result<Arc<dyn TextInjector>, InjectError> {
    Ok(Arc::new(macos::PasteInjector::new(config)))
}

/// Factory function to create the platform injector
#[cfg(not(target_os = "macos"))]
pub fn create_injector(_config: &InjectConfig) -> Result<Arc<dyn TextInjector>, InjectError> {
    Err(InjectError::Unsupported)
}
