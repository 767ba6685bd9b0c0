//! Gesture recognition client
//!
//! Posts JPEG snapshots to the Face++ gesture endpoint as a multipart form.
//! Calls are blocking; the session loop runs on its own thread and must
//! never have more than one request in flight.

use std::time::{Duration, Instant};

use reqwest::blocking::{multipart, Client};
use serde_json::Value;
use tracing::{debug, warn};

use super::normalize::ResponseNormalizer;
use super::outcome::ClassificationOutcome;
use crate::capture::Frame;
use crate::config::{Config, Credentials};

/// Anything that can classify a frame
pub trait Classifier {
    fn classify(&self, frame: &Frame) -> ClassificationOutcome;
}

/// HTTP client for the remote gesture service
pub struct GestureClient {
    http: Client,
    endpoint: String,
    credentials: Credentials,
    jpeg_quality: u8,
    normalizer: ResponseNormalizer,
}

impl GestureClient {
    /// Build a client from the daemon configuration
    ///
    /// Must be called off the async runtime: the blocking client owns its
    /// own runtime internally.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(5)))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            credentials: config.credentials.clone(),
            jpeg_quality: config.jpeg_quality,
            normalizer: ResponseNormalizer::new(config.confidence_threshold),
        })
    }

    fn form(&self, jpeg: Vec<u8>) -> reqwest::Result<multipart::Form> {
        let image = multipart::Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;

        Ok(multipart::Form::new()
            .text("api_key", self.credentials.api_key.clone())
            .text("api_secret", self.credentials.api_secret.clone())
            .part("image_file", image))
    }
}

impl Classifier for GestureClient {
    fn classify(&self, frame: &Frame) -> ClassificationOutcome {
        let jpeg = match frame.to_jpeg(self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => return ClassificationOutcome::TransportError(format!("jpeg encode: {e}")),
        };
        let upload_bytes = jpeg.len();

        let form = match self.form(jpeg) {
            Ok(form) => form,
            Err(e) => return ClassificationOutcome::TransportError(e.to_string()),
        };

        let started = Instant::now();
        let response = match self.http.post(&self.endpoint).multipart(form).send() {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "gesture request failed");
                return ClassificationOutcome::TransportError(e.to_string());
            }
        };

        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => return ClassificationOutcome::TransportError(e.to_string()),
        };

        debug!(
            sequence = frame.sequence(),
            width = frame.width(),
            height = frame.height(),
            frame_age_ms = frame.captured_at().elapsed().as_millis() as u64,
            status = %status,
            upload_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gesture response received"
        );

        interpret_response(status, &body, &self.normalizer)
    }
}

/// Map an HTTP status and body onto an outcome
fn interpret_response(
    status: reqwest::StatusCode,
    body: &str,
    normalizer: &ResponseNormalizer,
) -> ClassificationOutcome {
    let document: Option<Value> = serde_json::from_str(body).ok();

    let error_message = document
        .as_ref()
        .and_then(|doc| doc.get("error_message"))
        .map(|msg| match msg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    if !status.is_success() {
        let detail = error_message.unwrap_or_else(|| truncate(body, 200));
        return ClassificationOutcome::ServiceError(format!("{status}: {detail}"));
    }

    if let Some(message) = error_message {
        return ClassificationOutcome::ServiceError(message);
    }

    match document {
        Some(document) => ClassificationOutcome::Success(normalizer.normalize(&document)),
        None => ClassificationOutcome::TransportError(format!(
            "response is not JSON: {}",
            truncate(body, 200)
        )),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
