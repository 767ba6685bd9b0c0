//! gesture-volume-daemon: raise the system volume with a thumbs up
//!
//! This daemon provides:
//! - Periodic camera snapshots sent to the Face++ gesture API
//! - Tolerant parsing of the API's response layouts
//! - A rate-limited, debounced trigger that raises the volume
//!
//! Out of scope:
//! - Any local gesture model
//! - GUI, preview window or persisted history

mod action;
mod capture;
mod classify;
mod config;
mod error;
mod events;
mod lifecycle;
mod session;
mod state;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::action::VolumeControl;
use crate::capture::{CameraSource, FrameSource, StillImageSource};
use crate::classify::GestureClient;
use crate::config::Config;
use crate::error::{ConfigError, SessionError};
use crate::events::SessionEvent;
use crate::lifecycle::{ShutdownSignal, StopFlag};
use crate::session::Session;
use crate::state::{SessionStats, TriggerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "gesture-volume-daemon starting"
    );

    // Missing credentials abort here, before anything touches the camera
    let config = Config::load().context("failed to load configuration")?;
    info!(
        endpoint = %config.endpoint,
        api_interval_ms = config.api_interval.as_millis() as u64,
        cooldown_ms = config.cooldown.as_millis() as u64,
        threshold = config.confidence_threshold,
        camera = config.camera_index,
        "configuration loaded"
    );

    let sink = select_sink(config.volume_step)?;

    let shutdown = ShutdownSignal::new();
    let stop = StopFlag::new();

    // Session -> event logger
    let (event_tx, event_rx) = broadcast::channel::<SessionEvent>(64);
    let logger = tokio::spawn(events::log_events(event_rx));

    let session_stop = stop.clone();
    let mut session =
        tokio::task::spawn_blocking(move || run_session(config, sink, session_stop, event_tx));

    info!("daemon initialized, entering main loop");

    let joined = tokio::select! {
        joined = &mut session => joined,

        signal = shutdown.wait() => {
            match signal {
                Ok(()) => {
                    info!("shutdown signal received");
                    stop.request();
                }
                Err(e) => {
                    warn!(error = %e, "signal handlers unavailable, running until the camera stops");
                }
            }
            session.await
        }
    };

    let outcome = joined.context("session thread panicked")?;

    // The session owned the only sender, so the logger drains and exits
    if let Err(e) = logger.await {
        warn!(error = %e, "event logger ended abnormally");
    }

    match outcome {
        Ok(stats) => {
            info!(
                classifications = stats.classifications,
                failures = stats.classification_failures,
                gestures_detected = stats.gestures_detected,
                volume_changes = stats.volume_changes,
                suppressed = stats.suppressed,
                action_failures = stats.action_failures,
                "gesture-volume-daemon stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "session ended with an error");
            Err(e.into())
        }
    }
}

/// Choose the volume backend once; a missing backend is reported per trigger
fn select_sink(step: u8) -> Result<VolumeControl> {
    match VolumeControl::detect(step) {
        Ok(sink) => Ok(sink),
        Err(e) => {
            warn!(error = %e, "no volume backend responded to probing");
            VolumeControl::fallback(step).context("volume control is not supported on this platform")
        }
    }
}

/// Build the blocking collaborators and run one session
///
/// Runs on a blocking thread; the HTTP client must not be created or
/// dropped on the async runtime.
fn run_session(
    config: Config,
    sink: VolumeControl,
    stop: StopFlag,
    event_tx: broadcast::Sender<SessionEvent>,
) -> Result<SessionStats, SessionError> {
    let classifier = GestureClient::from_config(&config).map_err(ConfigError::from)?;

    let source: Box<dyn FrameSource> = match &config.frame_file {
        Some(path) => Box::new(StillImageSource::new(path)),
        None => Box::new(CameraSource::open(config.camera_index, config.capture_timeout)?),
    };

    let session = Session::new(
        source,
        classifier,
        sink,
        TriggerSettings::from(&config),
        config.tick,
        stop,
        event_tx,
    );
    session.run()
}
