//! Trigger controller implementation
//!
//! Decides, once per tick, whether the API window is open and, after a
//! classification, whether the cooldown allows firing the action. All
//! timing decisions use the tick's `now` so the controller is driven
//! entirely by its caller's clock.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::action::ActionSink;
use crate::capture::Frame;
use crate::classify::{ClassificationOutcome, Classifier};
use crate::config::Config;
use crate::events::SessionEvent;

/// Controller phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Session not started or just reset
    #[default]
    Idle,
    /// Waiting for the next API window
    AwaitingApiWindow,
    /// A classification call is in flight
    Classifying,
    /// The action fired; further detections are suppressed until it elapses
    Cooldown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::AwaitingApiWindow => write!(f, "AwaitingApiWindow"),
            Phase::Classifying => write!(f, "Classifying"),
            Phase::Cooldown => write!(f, "Cooldown"),
        }
    }
}

/// Per-session timestamps; `None` means "never"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopState {
    /// Start of the last attempted classification, whatever its outcome
    pub last_api_call_at: Option<Instant>,
    /// Last time the action actually fired
    pub last_trigger_at: Option<Instant>,
    pub running: bool,
}

/// Timing settings for the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSettings {
    pub api_interval: Duration,
    pub cooldown: Duration,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            api_interval: Duration::from_secs(2),
            cooldown: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for TriggerSettings {
    fn from(config: &Config) -> Self {
        Self {
            api_interval: config.api_interval,
            cooldown: config.cooldown,
        }
    }
}

/// In-memory counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub classifications: u64,
    pub classification_failures: u64,
    pub gestures_detected: u64,
    pub volume_changes: u64,
    pub suppressed: u64,
    pub action_failures: u64,
}

/// What happened on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// API window still closed; nothing called
    Skipped,
    /// Classified, no gesture
    NoGesture,
    /// Classification failed
    Failed,
    /// Gesture seen and the action fired
    Fired,
    /// Gesture seen inside the cooldown
    Suppressed,
    /// Gesture seen, action attempted and failed
    ActionFailed,
}

/// The sense → classify → debounce → act state machine
pub struct TriggerController {
    settings: TriggerSettings,
    state: LoopState,
    phase: Phase,
    stats: SessionStats,
    started_at: Option<Instant>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl TriggerController {
    /// Create a new controller
    pub fn new(settings: TriggerSettings, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            settings,
            state: LoopState::default(),
            phase: Phase::Idle,
            stats: SessionStats::default(),
            started_at: None,
            event_tx,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Begin a session, discarding any previous timestamps and counters
    pub fn start(&mut self, now: Instant, source: &str) {
        self.state = LoopState {
            running: true,
            ..LoopState::default()
        };
        self.stats = SessionStats::default();
        self.started_at = Some(now);
        self.phase = Phase::Idle;

        info!(
            api_interval_ms = self.settings.api_interval.as_millis() as u64,
            cooldown_ms = self.settings.cooldown.as_millis() as u64,
            source,
            "trigger controller started"
        );
        self.emit(SessionEvent::SessionStarted {
            source: source.to_string(),
        });
    }

    /// End the session and return its counters
    pub fn stop(&mut self, now: Instant) -> SessionStats {
        let uptime_ms = self
            .started_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0);

        self.state.running = false;
        self.started_at = None;
        self.transition_to(Phase::Idle);

        self.emit(SessionEvent::SessionStopped {
            uptime_ms,
            gestures_detected: self.stats.gestures_detected,
            volume_changes: self.stats.volume_changes,
        });
        self.stats
    }

    /// True once `api_interval` has passed since the last attempted call
    pub fn api_window_open(&self, now: Instant) -> bool {
        elapsed_at_least(self.state.last_api_call_at, now, self.settings.api_interval)
    }

    /// True once `cooldown` has passed since the last fired action
    pub fn cooldown_elapsed(&self, now: Instant) -> bool {
        elapsed_at_least(self.state.last_trigger_at, now, self.settings.cooldown)
    }

    /// Run one tick against `frame`
    ///
    /// Classification and the action both happen synchronously inside this
    /// call, so a session can never have overlapping requests.
    pub fn tick(
        &mut self,
        now: Instant,
        frame: &Frame,
        classifier: &dyn Classifier,
        sink: &dyn ActionSink,
    ) -> TickReport {
        if !self.api_window_open(now) {
            return TickReport::Skipped;
        }

        self.state.last_api_call_at = Some(now);
        self.stats.classifications += 1;
        self.transition_to(Phase::Classifying);

        let outcome = classifier.classify(frame);
        let report = self.handle_outcome(now, frame, outcome, sink);

        if self.phase == Phase::Classifying {
            self.transition_to(Phase::AwaitingApiWindow);
        }
        report
    }

    fn handle_outcome(
        &mut self,
        now: Instant,
        frame: &Frame,
        outcome: ClassificationOutcome,
        sink: &dyn ActionSink,
    ) -> TickReport {
        let kind = outcome.kind();
        let signal = match outcome {
            ClassificationOutcome::Success(signal) => signal,
            ClassificationOutcome::ServiceError(message)
            | ClassificationOutcome::TransportError(message) => {
                return self.classification_failed(kind, message);
            }
        };

        if !signal.is_present() {
            debug!(sequence = frame.sequence(), response = %signal.raw(), "no gesture");
            return TickReport::NoGesture;
        }

        self.stats.gestures_detected += 1;
        self.emit(SessionEvent::GestureDetected {
            confidence: signal.confidence(),
        });

        if !self.cooldown_elapsed(now) {
            let since_last_ms = self
                .state
                .last_trigger_at
                .map(|t| now.saturating_duration_since(t).as_millis() as u64)
                .unwrap_or(0);
            self.stats.suppressed += 1;
            debug!(since_last_ms, "detection inside cooldown, action suppressed");
            self.emit(SessionEvent::TriggerSuppressed { since_last_ms });
            return TickReport::Suppressed;
        }

        match sink.trigger() {
            Ok(()) => {
                self.state.last_trigger_at = Some(now);
                self.stats.volume_changes += 1;
                info!(
                    sink = sink.name(),
                    confidence = signal.confidence(),
                    total = self.stats.volume_changes,
                    "action fired"
                );
                self.emit(SessionEvent::VolumeRaised {
                    total: self.stats.volume_changes,
                });
                self.transition_to(Phase::Cooldown);
                TickReport::Fired
            }
            Err(e) => {
                self.stats.action_failures += 1;
                warn!(sink = sink.name(), error = %e, "action failed");
                self.emit(SessionEvent::ActionFailed {
                    message: e.to_string(),
                });
                TickReport::ActionFailed
            }
        }
    }

    fn classification_failed(&mut self, kind: &'static str, message: String) -> TickReport {
        self.stats.classification_failures += 1;
        warn!(kind, error = %message, "classification failed, waiting for next window");
        self.emit(SessionEvent::ClassificationFailed {
            kind: kind.to_string(),
            message,
        });
        TickReport::Failed
    }

    /// Perform a phase transition
    fn transition_to(&mut self, new_phase: Phase) {
        if new_phase != self.phase {
            debug!(from = %self.phase, to = %new_phase, "phase transition");
            self.phase = new_phase;
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

fn elapsed_at_least(since: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match since {
        None => true,
        Some(t) => now.saturating_duration_since(t) >= interval,
    }
}
