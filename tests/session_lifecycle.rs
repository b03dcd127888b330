//! Session orchestrator lifecycle tests
//!
//! Drives the session with mock collaborators and asserts the recovery
//! guarantees: every pipeline outcome (success, error, hang, empty capture)
//! lands back in Idle with the indicator hidden and the failsafe disarmed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use voxbar::audio::{AudioBuffer, AudioCapture};
use voxbar::cleanup::Cleaner;
use voxbar::error::{AudioError, InjectError, StoreError, TranscribeError};
use voxbar::history::TranscriptSink;
use voxbar::indicator::Indicator;
use voxbar::inject::TextInjector;
use voxbar::session::{Session, SessionConfig, SessionDeps};
use voxbar::transcribe::Transcriber;

// === Mock collaborators ===

struct MockCapture {
    samples: AudioBuffer,
    fail_start: bool,
    start_count: Arc<AtomicUsize>,
}

impl AudioCapture for MockCapture {
    fn start(&mut self) -> Result<(), AudioError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            Err(AudioError::NoInputDevice)
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<AudioBuffer, AudioError> {
        if self.samples.is_empty() {
            Err(AudioError::EmptyRecording)
        } else {
            Ok(self.samples.clone())
        }
    }
}

struct FixedTranscriber(&'static str);

impl Transcriber for FixedTranscriber {
    fn transcribe(&self, _samples: &[f32], _model: &str) -> Result<String, TranscribeError> {
        Ok(self.0.to_string())
    }
}

struct FailingTranscriber;

impl Transcriber for FailingTranscriber {
    fn transcribe(&self, _samples: &[f32], _model: &str) -> Result<String, TranscribeError> {
        Err(TranscribeError::Inference("model exploded".to_string()))
    }
}

struct HangingTranscriber(Duration);

impl Transcriber for HangingTranscriber {
    fn transcribe(&self, _samples: &[f32], _model: &str) -> Result<String, TranscribeError> {
        std::thread::sleep(self.0);
        Ok("finished far too late".to_string())
    }
}

/// Passthrough cleaner that counts invocations
struct TrackingCleaner {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Cleaner for TrackingCleaner {
    async fn clean(&self, text: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        text.to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SavedRow {
    text: String,
    raw: String,
    model: String,
    cleanup_used: bool,
}

struct MemorySink {
    rows: Arc<Mutex<Vec<SavedRow>>>,
}

impl TranscriptSink for MemorySink {
    fn save(
        &self,
        text: &str,
        raw_text: &str,
        _duration_seconds: f64,
        model: &str,
        cleanup_used: bool,
    ) -> Result<i64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        rows.push(SavedRow {
            text: text.to_string(),
            raw: raw_text.to_string(),
            model: model.to_string(),
            cleanup_used,
        });
        Ok(rows.len() as i64)
    }
}

struct MockInjector {
    injected: Arc<Mutex<Vec<String>>>,
    undo_count: Arc<AtomicUsize>,
}

#[async_trait]
impl TextInjector for MockInjector {
    async fn inject(&self, text: &str) -> Result<(), InjectError> {
        if text.is_empty() {
            return Err(InjectError::EmptyText);
        }
        self.injected.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn undo(&self) {
        self.undo_count.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockIndicator {
    visible: AtomicBool,
    processing: AtomicBool,
    status: Mutex<String>,
}

impl MockIndicator {
    fn new() -> Self {
        Self {
            visible: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            status: Mutex::new(String::new()),
        }
    }

    fn status(&self) -> String {
        self.status.lock().unwrap().clone()
    }
}

impl Indicator for MockIndicator {
    fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }

    fn set_processing(&self, on: bool) {
        self.processing.store(on, Ordering::SeqCst);
    }

    fn update_level(&self, _level: f32) {}

    fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }

    fn notify_complete(&self, _summary: &str) {}
}

// === Harness ===

struct Harness {
    start_count: Arc<AtomicUsize>,
    cleaner_calls: Arc<AtomicUsize>,
    rows: Arc<Mutex<Vec<SavedRow>>>,
    injected: Arc<Mutex<Vec<String>>>,
    undo_count: Arc<AtomicUsize>,
    indicator: Arc<MockIndicator>,
}

impl Harness {
    fn new() -> Self {
        Self {
            start_count: Arc::new(AtomicUsize::new(0)),
            cleaner_calls: Arc::new(AtomicUsize::new(0)),
            rows: Arc::new(Mutex::new(Vec::new())),
            injected: Arc::new(Mutex::new(Vec::new())),
            undo_count: Arc::new(AtomicUsize::new(0)),
            indicator: Arc::new(MockIndicator::new()),
        }
    }

    fn build(
        &self,
        samples: AudioBuffer,
        transcriber: Arc<dyn Transcriber>,
        failsafe: Duration,
    ) -> Arc<Session> {
        Session::spawn(
            SessionDeps {
                capture: Box::new(MockCapture {
                    samples,
                    fail_start: false,
                    start_count: self.start_count.clone(),
                }),
                transcriber,
                cleaner: Arc::new(TrackingCleaner {
                    calls: self.cleaner_calls.clone(),
                }),
                store: Arc::new(MemorySink {
                    rows: self.rows.clone(),
                }),
                injector: Arc::new(MockInjector {
                    injected: self.injected.clone(),
                    undo_count: self.undo_count.clone(),
                }),
                indicator: self.indicator.clone(),
                sounds: None,
            },
            SessionConfig {
                model: "test-model".to_string(),
                cleanup_enabled: true,
                failsafe,
            },
        )
    }
}

async fn wait_until(timeout: Duration, f: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    f()
}

fn speech() -> AudioBuffer {
    vec![0.1f32; 16000]
}

// === Tests ===

#[tokio::test]
async fn successful_pipeline_saves_and_injects() {
    let h = Harness::new();
    let session = h.build(
        speech(),
        Arc::new(FixedTranscriber("hello there friend")),
        Duration::from_secs(30),
    );

    session.on_start();
    assert!(session.is_recording());
    session.on_hold_stop();

    assert!(wait_until(Duration::from_secs(2), || session.is_idle()).await);

    let rows = h.rows.lock().unwrap().clone();
    assert_eq!(
        rows,
        vec![SavedRow {
            text: "hello there friend".to_string(),
            raw: "hello there friend".to_string(),
            model: "test-model".to_string(),
            cleanup_used: true,
        }]
    );
    assert_eq!(
        h.injected.lock().unwrap().as_slice(),
        ["hello there friend"]
    );
    assert_eq!(session.last_transcript().as_deref(), Some("hello there friend"));
    assert_eq!(h.cleaner_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.indicator.status(), "Typed 3 words");
    assert!(!h.indicator.visible.load(Ordering::SeqCst));
    assert!(!h.indicator.processing.load(Ordering::SeqCst));
    assert!(!session.failsafe_armed());
}

#[tokio::test]
async fn pipeline_error_returns_to_idle() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FailingTranscriber), Duration::from_secs(30));

    session.on_start();
    session.on_hold_stop();

    assert!(wait_until(Duration::from_secs(2), || session.is_idle()).await);

    assert!(h.indicator.status().starts_with("Error:"));
    assert!(!h.indicator.visible.load(Ordering::SeqCst));
    assert!(!session.failsafe_armed());
    assert!(h.rows.lock().unwrap().is_empty());
    assert!(h.injected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failsafe_recovers_from_hung_pipeline() {
    let h = Harness::new();
    let session = h.build(
        speech(),
        Arc::new(HangingTranscriber(Duration::from_millis(1500))),
        Duration::from_millis(100),
    );

    session.on_start();
    session.on_hold_stop();
    assert!(session.is_processing());

    // The failsafe must force Idle long before the pipeline wakes up
    assert!(wait_until(Duration::from_millis(800), || session.is_idle()).await);
    assert_eq!(h.indicator.status(), "Timed out");
    assert!(!h.indicator.visible.load(Ordering::SeqCst));
    assert!(!h.indicator.processing.load(Ordering::SeqCst));
    assert!(!session.failsafe_armed());
}

#[tokio::test]
async fn quick_cancel_while_idle_is_noop() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FixedTranscriber("x")), Duration::from_secs(30));

    session.on_quick_cancel();
    assert!(session.is_idle());
    assert_eq!(h.start_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn quick_cancel_discards_recording() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FixedTranscriber("x")), Duration::from_secs(30));

    session.on_start();
    assert!(session.is_recording());
    session.on_quick_cancel();

    // Cancel is synchronous: no waiting, no pipeline, ready for a new start
    assert!(session.is_idle());
    assert!(h.rows.lock().unwrap().is_empty());
    assert!(h.injected.lock().unwrap().is_empty());
    assert!(!h.indicator.visible.load(Ordering::SeqCst));

    session.on_start();
    assert!(session.is_recording());
    assert_eq!(h.start_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_capture_maps_to_no_speech() {
    let h = Harness::new();
    let session = h.build(
        AudioBuffer::new(),
        Arc::new(FixedTranscriber("never called")),
        Duration::from_secs(30),
    );

    session.on_start();
    session.on_hold_stop();

    // The empty-capture path resolves synchronously
    assert!(session.is_idle());
    assert_eq!(h.indicator.status(), "No speech detected");
    assert!(!session.failsafe_armed());
    assert_eq!(h.cleaner_calls.load(Ordering::SeqCst), 0);
    assert!(h.rows.lock().unwrap().is_empty());
    assert!(h.injected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_transcript_skips_cleanup_and_persistence() {
    let h = Harness::new();
    let session = h.build(
        speech(),
        Arc::new(FixedTranscriber("   ")),
        Duration::from_secs(30),
    );

    session.on_start();
    session.on_hold_stop();

    assert!(wait_until(Duration::from_secs(2), || session.is_idle()).await);
    assert_eq!(h.indicator.status(), "No speech detected");
    assert_eq!(h.cleaner_calls.load(Ordering::SeqCst), 0);
    assert!(h.rows.lock().unwrap().is_empty());
    assert!(h.injected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn start_refused_while_processing() {
    let h = Harness::new();
    let session = h.build(
        speech(),
        Arc::new(HangingTranscriber(Duration::from_millis(400))),
        Duration::from_secs(30),
    );

    session.on_start();
    session.on_hold_stop();
    assert!(session.is_processing());

    // A new press during processing is logged and ignored
    session.on_start();
    assert!(session.is_processing());
    assert_eq!(h.start_count.load(Ordering::SeqCst), 1);

    assert!(wait_until(Duration::from_secs(2), || session.is_idle()).await);
}

#[tokio::test]
async fn start_refused_while_recording() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FixedTranscriber("x")), Duration::from_secs(30));

    session.on_start();
    session.on_start();
    assert_eq!(h.start_count.load(Ordering::SeqCst), 1);
    assert!(session.is_recording());
}

#[tokio::test]
async fn double_tap_pastes_last_transcript() {
    let h = Harness::new();
    let session = h.build(
        speech(),
        Arc::new(FixedTranscriber("paste me")),
        Duration::from_secs(30),
    );

    session.on_start();
    session.on_hold_stop();
    assert!(wait_until(Duration::from_secs(2), || session.is_idle()).await);

    session.paste_last().await;

    assert_eq!(
        h.injected.lock().unwrap().as_slice(),
        ["paste me", "paste me"]
    );
    assert_eq!(h.indicator.status(), "Pasted last transcript");
}

#[tokio::test]
async fn double_tap_without_transcript_is_noop() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FixedTranscriber("x")), Duration::from_secs(30));

    session.paste_last().await;
    assert!(h.injected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn triple_tap_sends_undo() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FixedTranscriber("x")), Duration::from_secs(30));

    session.undo_last().await;
    session.undo_last().await;
    assert_eq!(h.undo_count.load(Ordering::SeqCst), 2);
    assert_eq!(h.indicator.status(), "Undo");
}

#[tokio::test]
async fn hold_stop_while_idle_is_ignored() {
    let h = Harness::new();
    let session = h.build(speech(), Arc::new(FixedTranscriber("x")), Duration::from_secs(30));

    session.on_hold_stop();
    assert!(session.is_idle());
    assert!(h.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_capture_start_stays_idle() {
    let h = Harness::new();
    let session = Session::spawn(
        SessionDeps {
            capture: Box::new(MockCapture {
                samples: speech(),
                fail_start: true,
                start_count: h.start_count.clone(),
            }),
            transcriber: Arc::new(FixedTranscriber("x")),
            cleaner: Arc::new(TrackingCleaner {
                calls: h.cleaner_calls.clone(),
            }),
            store: Arc::new(MemorySink {
                rows: h.rows.clone(),
            }),
            injector: Arc::new(MockInjector {
                injected: h.injected.clone(),
                undo_count: h.undo_count.clone(),
            }),
            indicator: h.indicator.clone(),
            sounds: None,
        },
        SessionConfig {
            model: "test-model".to_string(),
            cleanup_enabled: true,
            failsafe: Duration::from_secs(30),
        },
    );

    session.on_start();
    assert!(session.is_idle());
    assert_eq!(h.indicator.status(), "Microphone error");
    assert!(!h.indicator.visible.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cleanup_disabled_uses_raw_transcript() {
    let h = Harness::new();
    let session = Session::spawn(
        SessionDeps {
            capture: Box::new(MockCapture {
                samples: speech(),
                fail_start: false,
                start_count: h.start_count.clone(),
            }),
            transcriber: Arc::new(FixedTranscriber("raw words kept")),
            cleaner: Arc::new(TrackingCleaner {
                calls: h.cleaner_calls.clone(),
            }),
            store: Arc::new(MemorySink {
                rows: h.rows.clone(),
            }),
            injector: Arc::new(MockInjector {
                injected: h.injected.clone(),
                undo_count: h.undo_count.clone(),
            }),
            indicator: h.indicator.clone(),
            sounds: None,
        },
        SessionConfig {
            model: "test-model".to_string(),
            cleanup_enabled: false,
            failsafe: Duration::from_secs(30),
        },
    );

    session.on_start();
    session.on_hold_stop();
    assert!(wait_until(Duration::from_secs(2), || session.is_idle()).await);

    assert_eq!(h.cleaner_calls.load(Ordering::SeqCst), 0);
    let rows = h.rows.lock().unwrap();
    assert_eq!(rows[0].text, "raw words kept");
    assert!(!rows[0].cleanup_used);
}
