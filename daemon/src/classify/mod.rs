//! Gesture classification module
//!
//! Sends frames to the remote recognition service and reduces whatever
//! comes back to a single `ClassificationOutcome`.

mod client;
mod normalize;
mod outcome;

pub use client::{Classifier, GestureClient};
pub use outcome::{ClassificationOutcome, GestureSignal};
