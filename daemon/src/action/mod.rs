//! Action module: the externally visible side effect
//!
//! The backend is chosen once at startup; a failing command is reported,
//! not retried with a different one.

mod volume;

pub use volume::{ActionSink, VolumeBackend, VolumeControl};
