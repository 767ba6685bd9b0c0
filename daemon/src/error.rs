//! Error taxonomy for a detection session
//!
//! Only configuration and device errors end a session. Classification
//! failures travel as `ClassificationOutcome` variants instead of errors,
//! and action failures are logged and absorbed by the controller.

use thiserror::Error;

/// Missing or malformed configuration; aborts before the loop starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("keys file {path} could not be read: {source}")]
    KeysFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("keys file {0} must contain two non-empty lines (API key, API secret)")]
    KeysFileFormat(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// The frame source became unavailable; fatal for the session
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera {0} is not supported on this platform")]
    Unsupported(u32),

    #[error("failed to run capture command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("capture command failed: {0}")]
    Capture(String),

    #[error("{device} produced no frame within {waited:?}")]
    Timeout {
        device: String,
        waited: std::time::Duration,
    },

    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// The volume side effect failed; logged and otherwise ignored
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("no volume backend available: {0}")]
    Unavailable(String),
}

/// Errors that terminate a detection session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("frame source unavailable: {0}")]
    Device(#[from] DeviceError),
}
