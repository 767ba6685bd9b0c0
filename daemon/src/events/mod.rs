//! Events module for detection session activity
//!
//! The trigger controller emits these on a broadcast channel; the daemon
//! logs them and anything else interested can subscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Events emitted while a detection session runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session loop started
    SessionStarted {
        /// Frame source description
        source: String,
    },

    /// A classification found the gesture
    GestureDetected {
        /// Confidence in 0..=100
        confidence: f64,
    },

    /// The action fired
    VolumeRaised {
        /// Number of successful volume changes this session
        total: u64,
    },

    /// A detection arrived during cooldown
    TriggerSuppressed {
        /// Time since the last fired action
        since_last_ms: u64,
    },

    /// Classification failed; retried at the next API window
    ClassificationFailed {
        /// `service_error` or `transport_error`
        kind: String,
        message: String,
    },

    /// The action was attempted but failed
    ActionFailed { message: String },

    /// Session loop ended
    SessionStopped {
        /// Session length in milliseconds
        uptime_ms: u64,
        gestures_detected: u64,
        volume_changes: u64,
    },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::SessionStarted { source } => write!(f, "SESSION_STARTED ({})", source),
            SessionEvent::GestureDetected { confidence } => {
                write!(f, "GESTURE_DETECTED ({:.1}%)", confidence)
            }
            SessionEvent::VolumeRaised { total } => write!(f, "VOLUME_RAISED (#{})", total),
            SessionEvent::TriggerSuppressed { since_last_ms } => {
                write!(f, "TRIGGER_SUPPRESSED ({}ms since last)", since_last_ms)
            }
            SessionEvent::ClassificationFailed { kind, message } => {
                write!(f, "CLASSIFICATION_FAILED ({}: {})", kind, message)
            }
            SessionEvent::ActionFailed { message } => write!(f, "ACTION_FAILED ({})", message),
            SessionEvent::SessionStopped { uptime_ms, .. } => {
                write!(f, "SESSION_STOPPED ({}ms)", uptime_ms)
            }
        }
    }
}

/// Log every event until the channel closes; returns how many were seen
pub async fn log_events(mut rx: broadcast::Receiver<SessionEvent>) -> u64 {
    let mut seen = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                seen += 1;
                match &event {
                    SessionEvent::ClassificationFailed { .. } | SessionEvent::ActionFailed { .. } => {
                        warn!(%event, "session event")
                    }
                    _ => info!(%event, "session event"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "session event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    seen
}
