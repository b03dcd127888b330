//! macOS key listener using CGEventTap
//!
//! Captures global key events through Quartz Event Services. Modifier keys
//! (the default Right Command trigger) do not produce KeyDown/KeyUp; their
//! state arrives as FlagsChanged events, so both paths are handled.
//!
//! Requires Accessibility permission (System Settings > Privacy & Security
//! > Accessibility) for the process hosting voxbar.

use super::{canonical_key_name, KeyEvent, KeyListener};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventType, EventField,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// macOS virtual key codes (Carbon HIToolbox Events.h kVK_* constants)
/// for the keys voxbar accepts as a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum TriggerKeyCode {
    Capslock = 0x39,
    LeftShift = 0x38,
    RightShift = 0x3C,
    LeftControl = 0x3B,
    RightControl = 0x3E,
    LeftOption = 0x3A,
    RightOption = 0x3D,
    LeftCommand = 0x37,
    RightCommand = 0x36,
    Fn = 0x3F,
    F13 = 0x69,
    F14 = 0x6B,
    F15 = 0x71,
    F16 = 0x6A,
    F17 = 0x40,
    F18 = 0x4F,
    F19 = 0x50,
    F20 = 0x5A,
}

impl TriggerKeyCode {
    /// Whether this key reports through FlagsChanged instead of KeyDown/KeyUp
    fn is_modifier(self) -> bool {
        !matches!(
            self,
            Self::F13
                | Self::F14
                | Self::F15
                | Self::F16
                | Self::F17
                | Self::F18
                | Self::F19
                | Self::F20
        )
    }

    /// The modifier flag that indicates this key is held, for FlagsChanged
    /// events. Capslock toggles rather than holds, so it is matched by key
    /// code transitions instead of its flag.
    fn held_flag(self) -> Option<CGEventFlags> {
        match self {
            Self::LeftShift | Self::RightShift => Some(CGEventFlags::CGEventFlagShift),
            Self::LeftControl | Self::RightControl => Some(CGEventFlags::CGEventFlagControl),
            Self::LeftOption | Self::RightOption => Some(CGEventFlags::CGEventFlagAlternate),
            Self::LeftCommand | Self::RightCommand => Some(CGEventFlags::CGEventFlagCommand),
            Self::Fn => Some(CGEventFlags::CGEventFlagSecondaryFn),
            _ => None,
        }
    }
}

/// Map a canonical key name to its virtual key code
fn key_code_for(name: &str) -> Result<TriggerKeyCode, HotkeyError> {
    let canonical = canonical_key_name(name)?;
    Ok(match canonical.as_str() {
        "RIGHTCOMMAND" => TriggerKeyCode::RightCommand,
        "LEFTCOMMAND" => TriggerKeyCode::LeftCommand,
        "RIGHTOPTION" => TriggerKeyCode::RightOption,
        "LEFTOPTION" => TriggerKeyCode::LeftOption,
        "RIGHTCONTROL" => TriggerKeyCode::RightControl,
        "LEFTCONTROL" => TriggerKeyCode::LeftControl,
        "RIGHTSHIFT" => TriggerKeyCode::RightShift,
        "LEFTSHIFT" => TriggerKeyCode::LeftShift,
        "CAPSLOCK" => TriggerKeyCode::Capslock,
        "FN" => TriggerKeyCode::Fn,
        "F13" => TriggerKeyCode::F13,
        "F14" => TriggerKeyCode::F14,
        "F15" => TriggerKeyCode::F15,
        "F16" => TriggerKeyCode::F16,
        "F17" => TriggerKeyCode::F17,
        "F18" => TriggerKeyCode::F18,
        "F19" => TriggerKeyCode::F19,
        "F20" => TriggerKeyCode::F20,
        other => return Err(HotkeyError::UnknownKey(other.to_string())),
    })
}

/// Check whether the process may observe global key events
fn check_accessibility_permission() -> bool {
    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
    }
    unsafe { AXIsProcessTrusted() }
}

/// CGEventTap-based key listener
pub struct EventTapListener {
    target_key: TriggerKeyCode,
    stop_flag: Arc<AtomicBool>,
}

impl EventTapListener {
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let target_key = key_code_for(&config.key)?;

        if !check_accessibility_permission() {
            return Err(HotkeyError::AccessDenied(
                "Accessibility permission is not granted".to_string(),
            ));
        }

        Ok(Self {
            target_key,
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait::async_trait]
impl KeyListener for EventTapListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        self.stop_flag.store(false, Ordering::SeqCst);

        let target_key = self.target_key;
        let stop_flag = self.stop_flag.clone();

        // CFRunLoop blocks, so the tap lives on a blocking task
        tokio::task::spawn_blocking(move || {
            if let Err(e) = event_tap_loop(target_key, tx, stop_flag) {
                tracing::error!("macOS key listener error: {}", e);
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        self.stop_flag.store(true, Ordering::SeqCst);
        // Give the run loop a moment to notice
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tracing::debug!("macOS key listener stopping");
        Ok(())
    }
}

/// Event tap loop running on a blocking task
fn event_tap_loop(
    target_key: TriggerKeyCode,
    tx: mpsc::Sender<KeyEvent>,
    stop_flag: Arc<AtomicBool>,
) -> Result<(), HotkeyError> {
    // Suppress repeat transitions (KeyDown auto-repeat, redundant flag events)
    let is_pressed = Arc::new(AtomicBool::new(false));
    let is_pressed_cb = is_pressed.clone();
    let stop_flag_cb = stop_flag.clone();

    let (event_tx, event_rx) = std_mpsc::channel::<KeyEvent>();

    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        if stop_flag_cb.load(Ordering::SeqCst) {
            CFRunLoop::get_current().stop();
            return Some(event.clone());
        }

        let key_code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
        let flags = event.get_flags();

        match event_type {
            CGEventType::KeyDown => {
                if key_code == target_key as u16 && !is_pressed_cb.load(Ordering::SeqCst) {
                    is_pressed_cb.store(true, Ordering::SeqCst);
                    let _ = event_tx.send(KeyEvent::Pressed);
                }
            }
            CGEventType::KeyUp => {
                if key_code == target_key as u16 && is_pressed_cb.load(Ordering::SeqCst) {
                    is_pressed_cb.store(false, Ordering::SeqCst);
                    let _ = event_tx.send(KeyEvent::Released);
                }
            }
            CGEventType::FlagsChanged if target_key.is_modifier() => {
                // Modifier keys only show up here. FN is identified purely
                // by its flag; the rest are matched by key code so the left
                // and right variants stay distinct.
                let held = match (target_key, target_key.held_flag()) {
                    (TriggerKeyCode::Fn, Some(flag)) => flags.contains(flag),
                    (_, Some(flag)) => key_code == target_key as u16 && flags.contains(flag),
                    // Capslock has no held flag; each FlagsChanged with its
                    // key code is one press/release transition
                    (_, None) => {
                        key_code == target_key as u16 && !is_pressed_cb.load(Ordering::SeqCst)
                    }
                };
                let was = is_pressed_cb.load(Ordering::SeqCst);
                if held && !was {
                    is_pressed_cb.store(true, Ordering::SeqCst);
                    let _ = event_tx.send(KeyEvent::Pressed);
                } else if !held && was {
                    // Only the trigger key's own transition releases it
                    if target_key == TriggerKeyCode::Fn || key_code == target_key as u16 {
                        is_pressed_cb.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(KeyEvent::Released);
                    }
                }
            }
            _ => {}
        }

        // Never consume the event; voxbar only observes
        Some(event.clone())
    };

    let event_tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    )
    .map_err(|_| {
        HotkeyError::AccessDenied("failed to create event tap".to_string())
    })?;

    event_tap.enable();

    let run_loop_source = event_tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HotkeyError::Listener("failed to create run loop source".to_string()))?;

    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&run_loop_source, unsafe { kCFRunLoopCommonModes });

    tracing::info!("Listening for trigger key {:?}", target_key);

    // Forward from the callback's std channel into the tokio channel,
    // checking the stop flag between timeouts
    let forward_stop = stop_flag.clone();
    std::thread::spawn(move || loop {
        if forward_stop.load(Ordering::SeqCst) {
            break;
        }
        match event_rx.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(event) => {
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    });

    while !stop_flag.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopDefaultMode },
            std::time::Duration::from_millis(100),
            true,
        );
    }

    tracing::debug!("macOS key listener loop exited");
    Ok(())
}
