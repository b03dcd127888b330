//! Tap/hold gesture classification for the trigger key
//!
//! Turns raw press/release events into session intents. Recording starts
//! optimistically on every press because hold vs. tap can only be decided
//! at release time; a quick tap unwinds the start with a cancel before any
//! tap counting runs. Double taps are confirmed after a short delay so a
//! third tap can still promote the gesture to a triple tap.
//!
//! All methods are called from a single execution context (the key event
//! stream), so the tap history needs no locking.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum press duration for a hold (anything shorter is a tap)
pub const HOLD_THRESHOLD: Duration = Duration::from_millis(250);

/// Window within which consecutive taps are grouped into one gesture
pub const TAP_WINDOW: Duration = Duration::from_millis(350);

/// Presses arriving this close to the previous start are key-repeat bounce
pub const START_DEBOUNCE: Duration = Duration::from_millis(100);

/// Intents emitted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Trigger key went down: begin recording
    Start,
    /// Trigger key released after a hold: stop and process
    HoldStop,
    /// Trigger key released quickly: discard the optimistic start
    QuickCancel,
    /// Two taps: paste the last transcript again
    DoubleTap,
    /// Three taps: undo the last paste
    TripleTap,
}

/// A deferred double-tap check, to be confirmed after `delay` has passed
/// with no further tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDoubleTap {
    generation: u64,
    /// How long to wait before confirming
    pub delay: Duration,
}

/// Classifies raw key events into gestures.
///
/// Intents are delivered through the `emit` sink synchronously, in order;
/// in particular `QuickCancel` is emitted (and must be handled) before any
/// tap-count outcome of the same release.
pub struct GestureClassifier {
    hold_threshold: Duration,
    tap_window: Duration,
    debounce: Duration,
    /// When the current press started; None while released
    pressed_at: Option<Instant>,
    /// When the last Start intent was emitted (debounce reference)
    last_start: Option<Instant>,
    /// Recent tap release times, oldest first
    taps: VecDeque<Instant>,
    /// Bumped on every recorded tap and every history clear. A pending
    /// double-tap check only fires if the generation it captured is still
    /// current, so a late third tap (or a hold) invalidates it.
    generation: u64,
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self::with_timing(HOLD_THRESHOLD, TAP_WINDOW, START_DEBOUNCE)
    }

    /// Construct with explicit timing, used by tests to compress timelines
    pub fn with_timing(hold_threshold: Duration, tap_window: Duration, debounce: Duration) -> Self {
        Self {
            hold_threshold,
            tap_window,
            debounce,
            pressed_at: None,
            last_start: None,
            taps: VecDeque::new(),
            generation: 0,
        }
    }

    /// Handle a key-down event for the trigger key.
    pub fn on_press(&mut self, now: Instant, emit: &mut dyn FnMut(Gesture)) {
        if self.pressed_at.is_some() {
            // OS key repeat while held
            return;
        }
        if let Some(last) = self.last_start {
            if now.duration_since(last) < self.debounce {
                tracing::trace!("press debounced ({:?} since last start)", now - last);
                return;
            }
        }
        self.pressed_at = Some(now);
        self.last_start = Some(now);
        emit(Gesture::Start);
    }

    /// Handle a key-up event for the trigger key.
    ///
    /// Returns a pending double-tap check when exactly two taps landed in
    /// the window; the caller schedules it and calls [`confirm_double_tap`]
    /// after `delay`.
    ///
    /// [`confirm_double_tap`]: GestureClassifier::confirm_double_tap
    pub fn on_release(
        &mut self,
        now: Instant,
        emit: &mut dyn FnMut(Gesture),
    ) -> Option<PendingDoubleTap> {
        let pressed_at = self.pressed_at.take()?;
        let held = now.duration_since(pressed_at);

        if held >= self.hold_threshold {
            self.clear_taps();
            emit(Gesture::HoldStop);
            return None;
        }

        // Quick tap: unwind the optimistic start before counting taps, so a
        // rapid tap-then-press sequence never sees a stale recording.
        emit(Gesture::QuickCancel);

        self.taps.push_back(now);
        self.generation += 1;

        let prune_horizon = self.tap_window * 3;
        while let Some(&oldest) = self.taps.front() {
            if now.duration_since(oldest) > prune_horizon {
                self.taps.pop_front();
            } else {
                break;
            }
        }

        let count_window = self.tap_window.mul_f64(2.5);
        let count = self
            .taps
            .iter()
            .filter(|&&t| now.duration_since(t) <= count_window)
            .count();

        if count >= 3 {
            self.clear_taps();
            emit(Gesture::TripleTap);
            None
        } else if count == 2 {
            Some(PendingDoubleTap {
                generation: self.generation,
                delay: self.tap_window + Duration::from_millis(50),
            })
        } else {
            None
        }
    }

    /// Confirm a deferred double-tap check. Returns true exactly when no
    /// further tap was recorded (and the history was not cleared) since the
    /// check was scheduled.
    pub fn confirm_double_tap(&self, pending: PendingDoubleTap) -> bool {
        pending.generation == self.generation
    }

    fn clear_taps(&mut self) {
        self.taps.clear();
        self.generation += 1;
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> GestureClassifier {
        GestureClassifier::new()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Drive a press/release pair, collecting emitted gestures.
    fn press_release(
        c: &mut GestureClassifier,
        press: Instant,
        release: Instant,
    ) -> (Vec<Gesture>, Option<PendingDoubleTap>) {
        let mut emitted = Vec::new();
        c.on_press(press, &mut |g| emitted.push(g));
        let pending = c.on_release(release, &mut |g| emitted.push(g));
        (emitted, pending)
    }

    #[test]
    fn test_hold_emits_start_then_hold_stop() {
        let mut c = classifier();
        let t0 = Instant::now();
        let (emitted, pending) = press_release(&mut c, t0, t0 + ms(400));
        assert_eq!(emitted, vec![Gesture::Start, Gesture::HoldStop]);
        assert!(pending.is_none());
    }

    #[test]
    fn test_tap_emits_start_then_quick_cancel() {
        let mut c = classifier();
        let t0 = Instant::now();
        let (emitted, pending) = press_release(&mut c, t0, t0 + ms(100));
        assert_eq!(emitted, vec![Gesture::Start, Gesture::QuickCancel]);
        assert!(pending.is_none());
    }

    #[test]
    fn test_tap_never_emits_hold_stop() {
        let mut c = classifier();
        let t0 = Instant::now();
        // Just under the threshold is still a tap
        let (emitted, _) = press_release(&mut c, t0, t0 + ms(249));
        assert!(!emitted.contains(&Gesture::HoldStop));
        assert_eq!(
            emitted.iter().filter(|&&g| g == Gesture::QuickCancel).count(),
            1
        );
    }

    #[test]
    fn test_hold_at_exact_threshold() {
        let mut c = classifier();
        let t0 = Instant::now();
        let (emitted, _) = press_release(&mut c, t0, t0 + HOLD_THRESHOLD);
        assert_eq!(emitted, vec![Gesture::Start, Gesture::HoldStop]);
    }

    #[test]
    fn test_quick_cancel_precedes_tap_outcome() {
        let mut c = classifier();
        let t0 = Instant::now();
        // Three rapid taps: the cancel of the third tap must come before
        // the triple-tap signal.
        press_release(&mut c, t0, t0 + ms(50));
        press_release(&mut c, t0 + ms(200), t0 + ms(250));
        let (emitted, _) = press_release(&mut c, t0 + ms(400), t0 + ms(450));
        let cancel_idx = emitted
            .iter()
            .position(|&g| g == Gesture::QuickCancel)
            .unwrap();
        let triple_idx = emitted
            .iter()
            .position(|&g| g == Gesture::TripleTap)
            .unwrap();
        assert!(cancel_idx < triple_idx);
    }

    #[test]
    fn test_triple_tap_fires_once_without_double() {
        let mut c = classifier();
        let t0 = Instant::now();
        let mut all = Vec::new();
        let mut pendings = Vec::new();
        for i in 0..3 {
            let press = t0 + ms(250 * i);
            let (emitted, pending) = press_release(&mut c, press, press + ms(60));
            all.extend(emitted);
            pendings.extend(pending);
        }
        assert_eq!(all.iter().filter(|&&g| g == Gesture::TripleTap).count(), 1);
        // The second tap scheduled a double-tap check, but the third tap
        // must have invalidated it.
        assert_eq!(pendings.len(), 1);
        assert!(!c.confirm_double_tap(pendings[0]));
    }

    #[test]
    fn test_double_tap_confirmed_after_silence() {
        let mut c = classifier();
        let t0 = Instant::now();
        press_release(&mut c, t0, t0 + ms(60));
        let (_, pending) = press_release(&mut c, t0 + ms(250), t0 + ms(310));
        let pending = pending.expect("second tap schedules a check");
        assert_eq!(pending.delay, TAP_WINDOW + ms(50));
        // No further tap: the check confirms.
        assert!(c.confirm_double_tap(pending));
    }

    #[test]
    fn test_single_tap_schedules_nothing() {
        let mut c = classifier();
        let t0 = Instant::now();
        let (_, pending) = press_release(&mut c, t0, t0 + ms(60));
        assert!(pending.is_none());
    }

    #[test]
    fn test_hold_clears_tap_history() {
        let mut c = classifier();
        let t0 = Instant::now();
        press_release(&mut c, t0, t0 + ms(60));
        press_release(&mut c, t0 + ms(200), t0 + ms(600));
        // The hold wiped the first tap: this tap counts as the first of a
        // fresh gesture, so no double-tap check is scheduled.
        let (_, pending) = press_release(&mut c, t0 + ms(750), t0 + ms(810));
        assert!(pending.is_none());
    }

    #[test]
    fn test_hold_invalidates_pending_double_tap() {
        let mut c = classifier();
        let t0 = Instant::now();
        press_release(&mut c, t0, t0 + ms(60));
        let (_, pending) = press_release(&mut c, t0 + ms(200), t0 + ms(260));
        let pending = pending.unwrap();
        // A hold lands before the check deadline
        press_release(&mut c, t0 + ms(400), t0 + ms(800));
        assert!(!c.confirm_double_tap(pending));
    }

    #[test]
    fn test_taps_outside_window_do_not_group() {
        let mut c = classifier();
        let t0 = Instant::now();
        press_release(&mut c, t0, t0 + ms(60));
        // Second tap lands past 2.5x the tap window: counts as a lone tap
        let (_, pending) = press_release(&mut c, t0 + ms(1200), t0 + ms(1260));
        assert!(pending.is_none());
    }

    #[test]
    fn test_debounce_rejects_bounce_press() {
        let mut c = classifier();
        let t0 = Instant::now();
        let mut emitted = Vec::new();
        c.on_press(t0, &mut |g| emitted.push(g));
        c.on_release(t0 + ms(20), &mut |g| emitted.push(g));
        // Bounce press 50ms after the start: rejected outright, and the
        // matching release is ignored too.
        c.on_press(t0 + ms(50), &mut |g| emitted.push(g));
        let pending = c.on_release(t0 + ms(70), &mut |g| emitted.push(g));
        assert_eq!(emitted, vec![Gesture::Start, Gesture::QuickCancel]);
        assert!(pending.is_none());
    }

    #[test]
    fn test_repeat_press_while_held_ignored() {
        let mut c = classifier();
        let t0 = Instant::now();
        let mut emitted = Vec::new();
        c.on_press(t0, &mut |g| emitted.push(g));
        // OS auto-repeat delivers more key-down events while held
        c.on_press(t0 + ms(150), &mut |g| emitted.push(g));
        c.on_press(t0 + ms(300), &mut |g| emitted.push(g));
        assert_eq!(emitted, vec![Gesture::Start]);
        // Release classifies against the original press time
        c.on_release(t0 + ms(400), &mut |g| emitted.push(g));
        assert_eq!(emitted, vec![Gesture::Start, Gesture::HoldStop]);
    }

    #[test]
    fn test_release_without_press_ignored() {
        let mut c = classifier();
        let mut emitted = Vec::new();
        let pending = c.on_release(Instant::now(), &mut |g| emitted.push(g));
        assert!(emitted.is_empty());
        assert!(pending.is_none());
    }

    #[test]
    fn test_stale_taps_pruned() {
        let mut c = classifier();
        let t0 = Instant::now();
        press_release(&mut c, t0, t0 + ms(60));
        // Far past the prune horizon (3x tap window = 1.05s)
        press_release(&mut c, t0 + ms(2000), t0 + ms(2060));
        assert_eq!(c.taps.len(), 1);
    }
}
