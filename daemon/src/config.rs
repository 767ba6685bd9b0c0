//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Face++ US endpoint for gesture recognition
pub const DEFAULT_ENDPOINT: &str = "https://api-us.faceplusplus.com/humanbodypp/v1/gesture";

/// Default credentials file: API key on the first line, secret on the second
pub const DEFAULT_KEYS_FILE: &str = "facepp_keys.txt";

/// API key and secret for the recognition service
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Service credentials
    pub credentials: Credentials,

    /// Gesture recognition endpoint
    pub endpoint: String,

    /// Minimum spacing between classification calls
    pub api_interval: Duration,

    /// Minimum spacing between volume increases
    pub cooldown: Duration,

    /// A `thumb_up` score must exceed this to count as a detection
    pub confidence_threshold: f64,

    /// Camera device index
    pub camera_index: u32,

    /// Read frames from this image instead of the camera
    pub frame_file: Option<PathBuf>,

    /// Upper bound on a single classification request
    pub request_timeout: Duration,

    /// Upper bound on the wait for one camera frame
    pub capture_timeout: Duration,

    /// JPEG quality used for uploads
    pub jpeg_quality: u8,

    /// Loop tick period
    pub tick: Duration,

    /// Volume increase per trigger, in percent
    pub volume_step: u8,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = load_credentials(&lookup)?;

        let api_interval = parse_secs(&lookup, "GESTURE_API_INTERVAL_SECS", 2.0)?;
        let cooldown = parse_secs(&lookup, "GESTURE_COOLDOWN_SECS", 1.0)?;
        let request_timeout = parse_secs(&lookup, "GESTURE_REQUEST_TIMEOUT_SECS", 10.0)?;
        let capture_timeout = parse_secs(&lookup, "GESTURE_CAPTURE_TIMEOUT_SECS", 5.0)?;

        let confidence_threshold: f64 = parse(&lookup, "GESTURE_CONFIDENCE_THRESHOLD", 50.0)?;
        if !(0.0..=100.0).contains(&confidence_threshold) {
            return Err(invalid(
                "GESTURE_CONFIDENCE_THRESHOLD",
                confidence_threshold.to_string(),
                "must be within 0..=100",
            ));
        }

        let jpeg_quality: u8 = parse(&lookup, "GESTURE_JPEG_QUALITY", 85)?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(invalid(
                "GESTURE_JPEG_QUALITY",
                jpeg_quality.to_string(),
                "must be within 1..=100",
            ));
        }

        let volume_step: u8 = parse(&lookup, "GESTURE_VOLUME_STEP", 5)?;
        if !(1..=100).contains(&volume_step) {
            return Err(invalid(
                "GESTURE_VOLUME_STEP",
                volume_step.to_string(),
                "must be within 1..=100",
            ));
        }

        let tick_ms: u64 = parse(&lookup, "GESTURE_TICK_MS", 100)?;
        if tick_ms == 0 {
            return Err(invalid("GESTURE_TICK_MS", "0".to_string(), "must be positive"));
        }

        Ok(Self {
            credentials,
            endpoint: lookup("GESTURE_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_interval,
            cooldown,
            confidence_threshold,
            camera_index: parse(&lookup, "GESTURE_CAMERA_INDEX", 0)?,
            frame_file: lookup("GESTURE_FRAME_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            request_timeout,
            capture_timeout,
            jpeg_quality,
            tick: Duration::from_millis(tick_ms),
            volume_step,
        })
    }
}

/// Environment variables win; otherwise fall back to the keys file
fn load_credentials<F>(lookup: &F) -> Result<Credentials, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let key = non_empty(lookup("FACEPP_API_KEY"));
    let secret = non_empty(lookup("FACEPP_API_SECRET"));

    if let (Some(api_key), Some(api_secret)) = (key.clone(), secret.clone()) {
        return Ok(Credentials { api_key, api_secret });
    }

    let path = lookup("GESTURE_KEYS_FILE").unwrap_or_else(|| DEFAULT_KEYS_FILE.to_string());
    let path = Path::new(&path);

    if !path.exists() {
        return Err(if key.is_none() {
            ConfigError::MissingCredential("FACEPP_API_KEY")
        } else {
            ConfigError::MissingCredential("FACEPP_API_SECRET")
        });
    }

    let from_file = read_keys_file(path)?;
    Ok(Credentials {
        api_key: key.unwrap_or(from_file.api_key),
        api_secret: secret.unwrap_or(from_file.api_secret),
    })
}

/// Read a two-line keys file, ignoring blank lines
pub fn read_keys_file(path: &Path) -> Result<Credentials, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::KeysFile {
        path: path.display().to_string(),
        source,
    })?;

    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(key), Some(secret)) => Ok(Credentials {
            api_key: key.to_string(),
            api_secret: secret.to_string(),
        }),
        _ => Err(ConfigError::KeysFileFormat(path.display().to_string())),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, raw.clone(), e.to_string())),
    }
}

fn parse_secs<F>(lookup: &F, name: &'static str, default: f64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: f64 = parse(lookup, name, default)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(name, secs.to_string(), "must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| invalid(name, secs.to_string(), e.to_string()))
}

fn invalid(name: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value,
        reason: reason.into(),
    }
}
