//! Frame capture module
//!
//! Provides the `FrameSource` pull interface plus two implementations:
//! a camera source that streams from a long-running `ffmpeg` process, and a
//! still image source for headless runs.

mod frame;
mod source;

pub use frame::Frame;
pub use source::{CameraSource, FrameSource, StillImageSource};
