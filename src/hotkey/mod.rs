//! Global trigger-key detection
//!
//! On macOS, key events come from a CGEventTap (Quartz Event Services),
//! which requires Accessibility permission. The listener reports raw
//! press/release events for the single configured trigger key; tap/hold
//! interpretation happens in the gesture classifier, not here.

#[cfg(target_os = "macos")]
pub mod macos;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use tokio::sync::mpsc;

/// Raw trigger-key events, pre-classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// The trigger key went down
    Pressed,
    /// The trigger key was released
    Released,
}

/// Trait for global key listener implementations
#[async_trait::async_trait]
pub trait KeyListener: Send {
    /// Start listening; returns a channel of raw key events
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyEvent>, HotkeyError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Key names accepted as a trigger key. Modifier keys and the high function
/// keys work best because they do not type anything on their own.
pub const KNOWN_KEYS: &[&str] = &[
    "RIGHTCOMMAND",
    "LEFTCOMMAND",
    "RIGHTOPTION",
    "LEFTOPTION",
    "RIGHTCONTROL",
    "LEFTCONTROL",
    "RIGHTSHIFT",
    "LEFTSHIFT",
    "CAPSLOCK",
    "FN",
    "F13",
    "F14",
    "F15",
    "F16",
    "F17",
    "F18",
    "F19",
    "F20",
];

/// Normalize a user-supplied key name: uppercase, separators stripped
pub fn normalize_key_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Validate a key name for rebinding, returning the canonical form
pub fn canonical_key_name(name: &str) -> Result<String, HotkeyError> {
    let normalized = normalize_key_name(name);
    let canonical = match normalized.as_str() {
        "RCMD" | "RIGHTCMD" => "RIGHTCOMMAND",
        "LCMD" | "LEFTCMD" | "CMD" | "COMMAND" => "LEFTCOMMAND",
        "RALT" | "RIGHTALT" => "RIGHTOPTION",
        "LALT" | "LEFTALT" | "OPTION" => "LEFTOPTION",
        "RCTRL" => "RIGHTCONTROL",
        "LCTRL" | "CONTROL" | "CTRL" => "LEFTCONTROL",
        "RSHIFT" => "RIGHTSHIFT",
        "LSHIFT" | "SHIFT" => "LEFTSHIFT",
        "GLOBE" | "FUNCTION" => "FN",
        other => other,
    };
    if KNOWN_KEYS.contains(&canonical) {
        Ok(canonical.to_string())
    } else {
        Err(HotkeyError::UnknownKey(name.to_string()))
    }
}

/// Factory function to create the platform key listener
#[cfg(target_os = "macos")]
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn KeyListener>, HotkeyError> {
    Ok(Box::new(macos::EventTapListener::new(config)?))
}

/// Factory function to create the platform key listener
///
/// Only macOS is supported; other platforms get a clear error instead of a
/// silently dead daemon.
#[cfg(not(target_os = "macos"))]
pub fn create_listener(_config: &HotkeyConfig) -> Result<Box<dyn KeyListener>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "voxbar's global key listener requires macOS Quartz Event Services".to_string(),
    ))
}
