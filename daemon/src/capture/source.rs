//! Frame sources
//!
//! The control loop pulls exactly one frame per tick. Any error returned here,
//! including a frame that misses its deadline, means the device is gone and
//! ends the session.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::frame::Frame;
use crate::error::DeviceError;

/// Pull-based producer of frames
pub trait FrameSource: Send {
    /// Capture the next frame
    fn next_frame(&mut self) -> Result<Frame, DeviceError>;

    /// Release the underlying device
    fn release(&mut self) {}

    /// Human-readable name for logs
    fn describe(&self) -> String;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Width every camera frame is scaled to
pub const CAPTURE_WIDTH: u32 = 640;

/// Height every camera frame is scaled to
pub const CAPTURE_HEIGHT: u32 = 480;

/// Streams a local camera through a long-running `ffmpeg` process
///
/// The device stays open for the whole session. A reader thread decodes raw
/// RGB frames from the pipe and keeps only the newest one, so each tick sees
/// a current frame rather than a backlog.
pub struct CameraSource {
    name: String,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    frames: Receiver<RgbImage>,
    deadline: Duration,
    sequence: u64,
}

impl CameraSource {
    /// Open the camera at `index`; `deadline` bounds the wait for each frame
    pub fn open(index: u32, deadline: Duration) -> Result<Self, DeviceError> {
        let input = input_args(index).ok_or(DeviceError::Unsupported(index))?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(input)
            .arg("-vf")
            .arg(format!("scale={CAPTURE_WIDTH}:{CAPTURE_HEIGHT}"))
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "-"]);

        let source = Self::from_command(
            cmd,
            format!("camera {index}"),
            (CAPTURE_WIDTH, CAPTURE_HEIGHT),
            deadline,
        )?;
        info!(
            camera = index,
            width = CAPTURE_WIDTH,
            height = CAPTURE_HEIGHT,
            deadline_ms = deadline.as_millis() as u64,
            "camera stream opened"
        );
        Ok(source)
    }

    /// Stream raw `rgb24` frames of `size` from the stdout of `cmd`
    pub(crate) fn from_command(
        mut cmd: Command,
        name: String,
        size: (u32, u32),
        deadline: Duration,
    ) -> Result<Self, DeviceError> {
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let Some(stdout) = child.stdout.take() else {
            stop_child(&name, &mut child);
            return Err(DeviceError::Capture(format!("{name}: no output pipe")));
        };

        let (tx, rx) = bounded(1);
        let stale = rx.clone();
        let reader = thread::Builder::new()
            .name("camera-reader".to_string())
            .spawn(move || read_frames(stdout, size, tx, stale));

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                stop_child(&name, &mut child);
                return Err(DeviceError::Spawn(e));
            }
        };

        Ok(Self {
            name,
            child: Some(child),
            reader: Some(reader),
            frames: rx,
            deadline,
            sequence: 0,
        })
    }
}

/// Platform-specific ffmpeg input arguments for a camera index
fn input_args(index: u32) -> Option<Vec<String>> {
    if cfg!(target_os = "linux") {
        Some(vec![
            "-f".to_string(),
            "v4l2".to_string(),
            "-i".to_string(),
            format!("/dev/video{index}"),
        ])
    } else if cfg!(target_os = "macos") {
        Some(vec![
            "-f".to_string(),
            "avfoundation".to_string(),
            "-framerate".to_string(),
            "30".to_string(),
            "-i".to_string(),
            format!("{index}"),
        ])
    } else {
        None
    }
}

/// Reader thread body; ends when the pipe closes
fn read_frames(
    mut stdout: ChildStdout,
    (width, height): (u32, u32),
    tx: Sender<RgbImage>,
    stale: Receiver<RgbImage>,
) {
    let len = width as usize * height as usize * 3;
    loop {
        let mut buf = vec![0u8; len];
        if let Err(e) = stdout.read_exact(&mut buf) {
            debug!(error = %e, "camera stream closed");
            return;
        }
        let Some(image) = RgbImage::from_raw(width, height, buf) else {
            return;
        };

        // Only this thread sends, so after dropping the stale frame the slot is free
        let _ = stale.try_recv();
        if tx.send(image).is_err() {
            return;
        }
    }
}

fn stop_child(name: &str, child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(source = name, error = %e, "capture process already exited");
    }
    match child.wait() {
        Ok(status) => debug!(source = name, %status, "capture process reaped"),
        Err(e) => warn!(source = name, error = %e, "failed to reap capture process"),
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        let Some(child) = self.child.as_mut() else {
            return Err(DeviceError::Capture(format!("{} already released", self.name)));
        };

        let image = match self.frames.recv_timeout(self.deadline) {
            Ok(image) => image,
            Err(RecvTimeoutError::Timeout) => {
                return Err(DeviceError::Timeout {
                    device: self.name.clone(),
                    waited: self.deadline,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                let status = match child.try_wait() {
                    Ok(Some(status)) => status.to_string(),
                    Ok(None) => "still running".to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(DeviceError::Capture(format!(
                    "{}: stream ended ({status})",
                    self.name
                )));
            }
        };

        self.sequence += 1;
        debug!(
            sequence = self.sequence,
            width = image.width(),
            height = image.height(),
            "frame captured"
        );
        Ok(Frame::new(image, self.sequence))
    }

    fn release(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        stop_child(&self.name, &mut child);

        // The pipe is closed once the process is gone
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!(source = %self.name, "camera reader thread panicked");
            }
        }
        info!(source = %self.name, "camera released");
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads frames from an image file on disk
///
/// The file is re-read on every call so an external tool can keep
/// overwriting it with fresh snapshots.
pub struct StillImageSource {
    path: PathBuf,
    sequence: u64,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sequence: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        let image = image::open(&self.path)?.to_rgb8();
        self.sequence += 1;
        Ok(Frame::new(image, self.sequence))
    }

    fn describe(&self) -> String {
        format!("image file {}", self.path.display())
    }
}
