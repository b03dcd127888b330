//! Recording session orchestration
//!
//! Binds gesture intents to the capture lifecycle, the transcription and
//! cleanup collaborators, persistence, and text injection. The phase
//! machine is linear: Idle -> Recording -> Processing -> Idle, with a
//! direct Recording -> Idle edge for cancel.
//!
//! Two guarantees hold at all times:
//! - at most one pipeline runs at once (a single long-lived worker drains a
//!   bounded job queue; the phase guard refuses overlapping starts), and
//! - the session never wedges in Processing: every pipeline outcome, error
//!   included, resets to Idle, and a failsafe timer armed on each hold-stop
//!   forces the reset if the pipeline never reports back.

use crate::audio::AudioCapture;
use crate::cleanup::Cleaner;
use crate::error::{AudioError, InjectError, TranscribeError};
use crate::history::TranscriptSink;
use crate::indicator::Indicator;
use crate::inject::TextInjector;
use crate::sound::{SoundEvent, SoundPlayer};
use crate::transcribe::Transcriber;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Session phase
#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Waiting for the trigger key
    Idle,
    /// Trigger key held, capturing audio
    Recording { started_at: Instant },
    /// Buffer finalized, pipeline running
    Processing,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Recording { .. } => "recording",
            Phase::Processing => "processing",
        }
    }
}

/// Phase plus the capture controller it guards. One mutex covers both so a
/// transition and its capture side effect are atomic with respect to other
/// intents.
struct PhaseSlot {
    phase: Phase,
    capture: Box<dyn AudioCapture>,
}

/// One queued pipeline run
struct PipelineJob {
    samples: Vec<f32>,
    duration: Duration,
}

/// Errors normalized at the pipeline boundary
#[derive(Debug, Error)]
enum PipelineError {
    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// What a pipeline run produced
enum PipelineOutcome {
    /// Transcript injected; holds the word count
    Injected(usize),
    /// Transcription came back empty
    NoSpeech,
}

/// Collaborators handed to the session at construction
pub struct SessionDeps {
    pub capture: Box<dyn AudioCapture>,
    pub transcriber: Arc<dyn Transcriber>,
    pub cleaner: Arc<dyn Cleaner>,
    pub store: Arc<dyn TranscriptSink>,
    pub injector: Arc<dyn TextInjector>,
    pub indicator: Arc<dyn Indicator>,
    pub sounds: Option<SoundPlayer>,
}

/// Session tuning
pub struct SessionConfig {
    /// Model key passed to the transcriber
    pub model: String,
    /// Whether to run the cleanup collaborator
    pub cleanup_enabled: bool,
    /// Failsafe timeout for the processing phase
    pub failsafe: Duration,
}

/// The recording session orchestrator. One per application instance,
/// constructed at startup and alive until exit.
pub struct Session {
    /// Self-handle for the failsafe callback
    weak_self: std::sync::Weak<Session>,
    slot: Mutex<PhaseSlot>,
    last_transcript: Mutex<Option<String>>,
    transcriber: Arc<dyn Transcriber>,
    cleaner: Arc<dyn Cleaner>,
    store: Arc<dyn TranscriptSink>,
    injector: Arc<dyn TextInjector>,
    indicator: Arc<dyn Indicator>,
    sounds: Option<SoundPlayer>,
    config: SessionConfig,
    failsafe: FailsafeTimer,
    pipeline_tx: mpsc::Sender<PipelineJob>,
}

impl Session {
    /// Construct the session and spawn its pipeline worker.
    /// Must be called within a tokio runtime.
    pub fn spawn(deps: SessionDeps, config: SessionConfig) -> Arc<Self> {
        // Capacity 1: the phase guard already ensures one pipeline at a
        // time; the bound is a backstop, not a queue.
        let (pipeline_tx, mut pipeline_rx) = mpsc::channel::<PipelineJob>(1);

        let session = Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            slot: Mutex::new(PhaseSlot {
                phase: Phase::Idle,
                capture: deps.capture,
            }),
            last_transcript: Mutex::new(None),
            transcriber: deps.transcriber,
            cleaner: deps.cleaner,
            store: deps.store,
            injector: deps.injector,
            indicator: deps.indicator,
            sounds: deps.sounds,
            config,
            failsafe: FailsafeTimer::new(),
            pipeline_tx,
        });

        let worker = session.clone();
        tokio::spawn(async move {
            while let Some(job) = pipeline_rx.recv().await {
                worker.run_pipeline(job).await;
            }
        });

        session
    }

    /// Idle + Start -> Recording. Refused (logged, not an error) in any
    /// other phase.
    pub fn on_start(&self) {
        let mut slot = self.slot.lock().unwrap();
        match slot.phase {
            Phase::Idle => {}
            other => {
                tracing::warn!("Ignoring start while {}", other.name());
                return;
            }
        }

        self.indicator.show();
        self.play(SoundEvent::RecordingStart);

        match slot.capture.start() {
            Ok(()) => {
                slot.phase = Phase::Recording {
                    started_at: Instant::now(),
                };
                self.indicator.set_status("Recording");
                tracing::info!("Recording started");
            }
            Err(e) => {
                tracing::error!("Failed to start audio capture: {}", e);
                self.indicator.hide();
                self.indicator.set_status("Microphone error");
                self.play(SoundEvent::Error);
            }
        }
    }

    /// Recording + QuickCancel -> Idle. A no-op in any other phase, so a
    /// cancel arriving while idle or processing is harmless. Runs to
    /// completion synchronously: when this returns, a following start
    /// cannot observe a stale recording.
    pub fn on_quick_cancel(&self) {
        let mut slot = self.slot.lock().unwrap();
        if !matches!(slot.phase, Phase::Recording { .. }) {
            tracing::debug!("Ignoring cancel while {}", slot.phase.name());
            return;
        }

        // Best-effort teardown: a stream that never produced samples stops
        // with EmptyRecording, which is exactly what discarding means here
        if let Err(e) = slot.capture.stop() {
            tracing::debug!("Cancel stop: {}", e);
        }
        slot.phase = Phase::Idle;
        drop(slot);

        self.indicator.hide();
        self.indicator.set_status("Ready");
        self.play(SoundEvent::Cancelled);
        tracing::info!("Recording cancelled");
    }

    /// Recording + HoldStop -> Processing, then hand the buffer to the
    /// pipeline worker. An empty capture short-circuits straight back to
    /// Idle without touching cleanup or persistence.
    pub fn on_hold_stop(&self) {
        let mut slot = self.slot.lock().unwrap();
        let started_at = match slot.phase {
            Phase::Recording { started_at } => started_at,
            other => {
                tracing::warn!("Ignoring stop while {}", other.name());
                return;
            }
        };
        let duration = started_at.elapsed();

        self.play(SoundEvent::RecordingStop);

        let samples = match slot.capture.stop() {
            Ok(samples) => samples,
            Err(AudioError::EmptyRecording) => {
                slot.phase = Phase::Idle;
                drop(slot);
                tracing::info!("No audio captured");
                self.indicator.hide();
                self.indicator.set_processing(false);
                self.indicator.set_status("No speech detected");
                return;
            }
            Err(e) => {
                slot.phase = Phase::Idle;
                drop(slot);
                tracing::error!("Failed to stop capture: {}", e);
                self.indicator.hide();
                self.indicator.set_processing(false);
                self.indicator.set_status(&short_error(&e.to_string()));
                self.play(SoundEvent::Error);
                return;
            }
        };

        slot.phase = Phase::Processing;
        drop(slot);

        tracing::info!("Recording stopped ({:.1}s), processing", duration.as_secs_f32());
        self.indicator.set_processing(true);
        self.indicator.set_status("Processing");

        // Armed before the job is queued; disarmed on every pipeline exit
        let failsafe_session = self.weak_self.clone();
        self.failsafe.arm(self.config.failsafe, move || {
            if let Some(session) = failsafe_session.upgrade() {
                session.on_failsafe();
            }
        });

        if self
            .pipeline_tx
            .try_send(PipelineJob { samples, duration })
            .is_err()
        {
            // Queue full means a pipeline is somehow still running; the
            // phase guard should make this unreachable
            tracing::error!("Pipeline worker busy, dropping recording");
            self.failsafe.disarm();
            self.reset_to_idle();
            self.indicator.set_status("Error: busy");
        }
    }

    /// DoubleTap: re-inject the last transcript, if any. No phase change.
    pub async fn paste_last(&self) {
        let text = self.last_transcript.lock().unwrap().clone();
        let Some(text) = text else {
            tracing::debug!("No transcript to paste");
            return;
        };
        match self.injector.inject(&text).await {
            Ok(()) => self.indicator.set_status("Pasted last transcript"),
            Err(e) => {
                tracing::warn!("Re-paste failed: {}", e);
                self.indicator.set_status(&short_error(&e.to_string()));
            }
        }
    }

    /// TripleTap: undo the last paste. Best-effort, no phase change.
    pub async fn undo_last(&self) {
        self.injector.undo().await;
        self.indicator.set_status("Undo");
    }

    /// The most recent cleaned transcript, retained across sessions
    pub fn last_transcript(&self) -> Option<String> {
        self.last_transcript.lock().unwrap().clone()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.slot.lock().unwrap().phase, Phase::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.slot.lock().unwrap().phase, Phase::Recording { .. })
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.slot.lock().unwrap().phase, Phase::Processing)
    }

    /// How long the current recording has been running
    pub fn recording_duration(&self) -> Option<Duration> {
        match self.slot.lock().unwrap().phase {
            Phase::Recording { started_at } => Some(started_at.elapsed()),
            _ => None,
        }
    }

    /// Whether the failsafe timer is currently pending
    pub fn failsafe_armed(&self) -> bool {
        self.failsafe.is_armed()
    }

    /// Run one pipeline job and normalize every outcome back to Idle.
    /// This is the single place where "processing failed" is decided.
    async fn run_pipeline(&self, job: PipelineJob) {
        let outcome = self.process(job).await;

        match outcome {
            Ok(PipelineOutcome::Injected(words)) => {
                let status = format!("Typed {} words", words);
                tracing::info!("{}", status);
                self.indicator.set_status(&status);
            }
            Ok(PipelineOutcome::NoSpeech) => {
                tracing::info!("No speech detected");
                self.indicator.set_status("No speech detected");
            }
            Err(e) => {
                tracing::error!("Processing failed: {}", e);
                self.indicator.set_status(&short_error(&e.to_string()));
                self.play(SoundEvent::Error);
            }
        }

        self.failsafe.disarm();
        self.reset_to_idle();
    }

    /// transcribe -> clean -> persist -> remember -> inject
    async fn process(&self, job: PipelineJob) -> Result<PipelineOutcome, PipelineError> {
        let transcriber = self.transcriber.clone();
        let model = self.config.model.clone();
        let samples = job.samples;

        // The ASR collaborator is an opaque blocking call
        let raw = tokio::task::spawn_blocking(move || transcriber.transcribe(&samples, &model))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;

        let raw = raw.trim().to_string();
        if raw.is_empty() {
            return Ok(PipelineOutcome::NoSpeech);
        }
        tracing::debug!("Raw transcript: {:?}", raw);

        let cleaned = if self.config.cleanup_enabled {
            let cleaned = self.cleaner.clean(&raw).await;
            if cleaned != raw {
                tracing::debug!("Cleaned transcript: {:?}", cleaned);
            }
            cleaned
        } else {
            raw.clone()
        };

        // Persistence is fire-and-forget: a failed insert loses a history
        // row, not the session
        if let Err(e) = self.store.save(
            &cleaned,
            &raw,
            job.duration.as_secs_f64(),
            &self.config.model,
            self.config.cleanup_enabled,
        ) {
            tracing::warn!("Failed to save transcription: {}", e);
        }

        *self.last_transcript.lock().unwrap() = Some(cleaned.clone());

        self.injector.inject(&cleaned).await?;

        let words = cleaned.split_whitespace().count();
        self.indicator.notify_complete(&cleaned);
        Ok(PipelineOutcome::Injected(words))
    }

    /// Failsafe expiry: the pipeline did not report back in time. The
    /// worker is not killed, but the session stops waiting for it.
    fn on_failsafe(&self) {
        let mut slot = self.slot.lock().unwrap();
        if !matches!(slot.phase, Phase::Processing) {
            return;
        }
        slot.phase = Phase::Idle;
        drop(slot);

        tracing::warn!(
            "Failsafe triggered: processing did not finish within {:?}",
            self.config.failsafe
        );
        self.indicator.hide();
        self.indicator.set_processing(false);
        self.indicator.set_status("Timed out");
        self.failsafe.disarm();
    }

    /// Processing -> Idle, unless the failsafe already got there first
    fn reset_to_idle(&self) {
        let mut slot = self.slot.lock().unwrap();
        if matches!(slot.phase, Phase::Processing) {
            slot.phase = Phase::Idle;
        }
        drop(slot);
        self.indicator.set_processing(false);
        self.indicator.hide();
    }

    fn play(&self, event: SoundEvent) {
        if let Some(ref sounds) = self.sounds {
            sounds.play(event);
        }
    }
}

/// Truncate an error message into a status line
fn short_error(message: &str) -> String {
    let mut short: String = message.chars().take(40).collect();
    if message.chars().count() > 40 {
        short.push_str("...");
    }
    format!("Error: {}", short)
}

/// Cancellable one-shot timer for the processing failsafe.
///
/// arm() replaces any pending timer; disarm() cancels without firing.
/// The callback runs on a spawned task, never on the caller's thread.
pub struct FailsafeTimer {
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl FailsafeTimer {
    pub fn new() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    pub fn arm(&self, after: Duration, on_fire: impl FnOnce() + Send + 'static) {
        let (tx, rx) = oneshot::channel::<()>();
        // Dropping a previous sender cancels its timer
        *self.cancel.lock().unwrap() = Some(tx);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => on_fire(),
                _ = rx => {}
            }
        });
    }

    pub fn disarm(&self) {
        self.cancel.lock().unwrap().take();
    }

    pub fn is_armed(&self) -> bool {
        self.cancel.lock().unwrap().is_some()
    }
}

impl Default for FailsafeTimer {
    fn default() -> Self {
        Self::new()
    }
}
