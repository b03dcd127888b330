//! Daemon module - main event loop orchestration
//!
//! Wires the key listener, gesture classifier, and session orchestrator
//! together. Raw key events are classified on the event loop; the
//! classifier's intents dispatch synchronously into the session (which is
//! what makes cancel-before-next-start deterministic), while deferred
//! double-tap confirmations come back through a timer queue.

use crate::config::Config;
use crate::error::{Result, VoxbarError};
use crate::gesture::{Gesture, GestureClassifier, PendingDoubleTap};
use crate::history::{HistoryStore, SETTING_TRIGGER_KEY};
use crate::hotkey::{self, KeyEvent};
use crate::indicator::{Indicator, StateFileIndicator};
use crate::session::{Session, SessionConfig, SessionDeps};
use crate::sound::SoundPlayer;
use crate::{audio, cleanup, inject, transcribe};
use pidlock::Pidlock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Main daemon that owns all components for the process lifetime
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until SIGINT/SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting voxbar daemon");

        // Single instance: a second daemon would fight over the event tap
        // and the microphone
        let runtime_dir = Config::runtime_dir();
        std::fs::create_dir_all(&runtime_dir)?;
        let lock_path = runtime_dir.join("daemon.pid").to_string_lossy().to_string();
        let mut pid_lock = Pidlock::new(&lock_path);
        if pid_lock.acquire().is_err() {
            return Err(VoxbarError::Config(
                "another voxbar instance is already running".to_string(),
            ));
        }

        // Persisted trigger-key rebind overrides the config file
        let store = Arc::new(HistoryStore::open(&Config::history_db_path())?);
        if let Some(key) = store.get_setting(SETTING_TRIGGER_KEY)? {
            tracing::info!("Using rebound trigger key: {}", key);
            self.config.hotkey.key = key;
        }

        let indicator = Arc::new(StateFileIndicator::new(
            self.config.resolve_state_file(),
            self.config.inject.notify_on_complete,
        ));

        let level_indicator = indicator.clone();
        let capture = audio::create_capture(
            &self.config.audio,
            Arc::new(move |level| level_indicator.update_level(level)),
        )?;

        let transcriber = transcribe::create_transcriber(&self.config.transcribe)?;
        let cleaner = cleanup::create_cleaner(&self.config.cleanup);
        let injector = inject::create_injector(&self.config.inject)?;
        let sounds = SoundPlayer::spawn(&self.config.audio.feedback);

        let session = Session::spawn(
            SessionDeps {
                capture,
                transcriber,
                cleaner,
                store: store.clone(),
                injector,
                indicator: indicator.clone(),
                sounds,
            },
            SessionConfig {
                model: self.config.transcribe.model.clone(),
                cleanup_enabled: self.config.cleanup.enabled,
                failsafe: self.config.failsafe_duration(),
            },
        );

        let mut listener = hotkey::create_listener(&self.config.hotkey)?;
        let mut key_rx = listener.start().await?;
        let mut classifier = GestureClassifier::new();

        // Deferred double-tap confirmations flow back through this queue so
        // the classifier stays single-context
        let (check_tx, mut check_rx) = mpsc::channel::<PendingDoubleTap>(8);

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| VoxbarError::Config(format!("failed to install SIGTERM handler: {}", e)))?;

        let max_duration = Duration::from_secs(self.config.audio.max_duration_secs as u64);

        tracing::info!(
            "Hold {} to record, tap to cancel, double-tap to re-paste, triple-tap to undo",
            self.config.hotkey.key
        );
        indicator.hide();
        indicator.set_status("Ready");

        loop {
            tokio::select! {
                Some(event) = key_rx.recv() => {
                    let now = Instant::now();
                    match event {
                        KeyEvent::Pressed => {
                            classifier.on_press(now, &mut |gesture| {
                                dispatch(&session, gesture);
                            });
                        }
                        KeyEvent::Released => {
                            let pending = classifier.on_release(now, &mut |gesture| {
                                dispatch(&session, gesture);
                            });
                            if let Some(pending) = pending {
                                let check_tx = check_tx.clone();
                                tokio::spawn(async move {
                                    tokio::time::sleep(pending.delay).await;
                                    let _ = check_tx.send(pending).await;
                                });
                            }
                        }
                    }
                }

                Some(pending) = check_rx.recv() => {
                    if classifier.confirm_double_tap(pending) {
                        tracing::debug!("Double tap confirmed");
                        dispatch(&session, Gesture::DoubleTap);
                    } else {
                        tracing::trace!("Double tap superseded by a later tap");
                    }
                }

                // Safety cap on recording length
                _ = tokio::time::sleep(Duration::from_millis(500)), if session.is_recording() => {
                    if let Some(duration) = session.recording_duration() {
                        if duration > max_duration {
                            tracing::warn!(
                                "Recording exceeded {:.0}s limit, stopping",
                                max_duration.as_secs_f32()
                            );
                            session.on_hold_stop();
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    break;
                }
            }
        }

        listener.stop().await?;
        indicator.remove_state_file();
        let _ = pid_lock.release();
        tracing::info!("Daemon stopped");

        Ok(())
    }
}

/// Route a classifier intent into the session. Start, cancel, and stop run
/// synchronously on the event loop; the tap shortcuts go to background
/// tasks because injection sleeps between keystrokes.
fn dispatch(session: &Arc<Session>, gesture: Gesture) {
    match gesture {
        Gesture::Start => session.on_start(),
        Gesture::QuickCancel => session.on_quick_cancel(),
        Gesture::HoldStop => session.on_hold_stop(),
        Gesture::DoubleTap => {
            let session = session.clone();
            tokio::spawn(async move { session.paste_last().await });
        }
        Gesture::TripleTap => {
            let session = session.clone();
            tokio::spawn(async move { session.undo_last().await });
        }
    }
}
