//! Trigger state machine
//!
//! Four phases:
//! - Idle: session not started
//! - AwaitingApiWindow: rate limit in force, frames are pulled but not sent
//! - Classifying: one request in flight
//! - Cooldown: action fired, repeated detections are suppressed

mod machine;

pub use machine::{SessionStats, TriggerController, TriggerSettings};
