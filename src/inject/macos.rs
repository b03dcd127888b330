//! macOS paste injection via pbcopy + CGEvent
//!
//! The clipboard is written through the native pbcopy command; the paste
//! (Cmd+V) and undo (Cmd+Z) keystrokes are posted as CGEvents. Flags are
//! always set explicitly on the events so Caps Lock or a stuck modifier
//! cannot corrupt the shortcut.
//!
//! Requires Accessibility permission for the keystroke posting.

use super::TextInjector;
use crate::config::InjectConfig;
use crate::error::InjectError;
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

// macOS virtual key codes (Carbon HIToolbox Events.h)
const KEYCODE_V: CGKeyCode = 0x09;
const KEYCODE_Z: CGKeyCode = 0x06;

/// Delay between the key-down and key-up of a simulated shortcut, so the
/// target application observes a plausible ordering
const KEYSTROKE_GAP: Duration = Duration::from_millis(10);

/// Paste-based text injector
pub struct PasteInjector {
    settle_delay: Duration,
}

impl PasteInjector {
    pub fn new(config: &InjectConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    /// Copy text to the clipboard using pbcopy
    async fn copy_to_clipboard(&self, text: &str) -> Result<(), InjectError> {
        let mut child = Command::new("pbcopy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| InjectError::Clipboard(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| InjectError::Clipboard(e.to_string()))?;
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| InjectError::Clipboard(e.to_string()))?;

        if !status.success() {
            return Err(InjectError::Clipboard("pbcopy exited with error".to_string()));
        }

        Ok(())
    }
}

/// Post a key-down/key-up pair with explicit modifier flags.
/// CGEventSource is not Send, so callers run this inside spawn_blocking.
fn press_shortcut(keycode: CGKeyCode, flags: CGEventFlags) -> Result<(), InjectError> {
    let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| InjectError::Keystroke("failed to create CGEventSource".to_string()))?;

    let key_down = CGEvent::new_keyboard_event(source.clone(), keycode, true)
        .map_err(|_| InjectError::Keystroke("failed to create key down event".to_string()))?;
    key_down.set_flags(flags);
    key_down.post(CGEventTapLocation::HID);

    std::thread::sleep(KEYSTROKE_GAP);

    let key_up = CGEvent::new_keyboard_event(source, keycode, false)
        .map_err(|_| InjectError::Keystroke("failed to create key up event".to_string()))?;
    key_up.set_flags(flags);
    key_up.post(CGEventTapLocation::HID);

    Ok(())
}

#[async_trait::async_trait]
impl TextInjector for PasteInjector {
    async fn inject(&self, text: &str) -> Result<(), InjectError> {
        if text.is_empty() {
            return Err(InjectError::EmptyText);
        }

        self.copy_to_clipboard(text).await?;

        // Let the pasteboard settle before the paste keystroke lands
        tokio::time::sleep(self.settle_delay).await;

        tokio::task::spawn_blocking(|| {
            press_shortcut(KEYCODE_V, CGEventFlags::CGEventFlagCommand)
        })
        .await
        .map_err(|e| InjectError::Keystroke(format!("task join error: {}", e)))??;

        tracing::info!("Injected {} chars via clipboard paste", text.chars().count());
        Ok(())
    }

    async fn undo(&self) {
        let result = tokio::task::spawn_blocking(|| {
            press_shortcut(KEYCODE_Z, CGEventFlags::CGEventFlagCommand)
        })
        .await;

        match result {
            Ok(Ok(())) => tracing::debug!("Sent undo keystroke"),
            Ok(Err(e)) => tracing::warn!("Undo keystroke failed: {}", e),
            Err(e) => tracing::warn!("Undo task failed: {}", e),
        }
    }
}
