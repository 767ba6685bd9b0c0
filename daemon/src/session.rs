//! Detection session loop
//!
//! Runs on a dedicated blocking thread: pull a frame, let the controller
//! decide, sleep out the rest of the tick. Returns when the stop flag is
//! raised or the frame source goes away.

use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::action::ActionSink;
use crate::capture::FrameSource;
use crate::classify::Classifier;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::lifecycle::StopFlag;
use crate::state::{SessionStats, TriggerController, TriggerSettings};

/// One detection session over a frame source, classifier and sink
pub struct Session<S, C, A> {
    source: S,
    classifier: C,
    sink: A,
    controller: TriggerController,
    tick: Duration,
    stop: StopFlag,
}

impl<S, C, A> Session<S, C, A>
where
    S: FrameSource,
    C: Classifier,
    A: ActionSink,
{
    pub fn new(
        source: S,
        classifier: C,
        sink: A,
        settings: TriggerSettings,
        tick: Duration,
        stop: StopFlag,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            source,
            classifier,
            sink,
            controller: TriggerController::new(settings, event_tx),
            tick,
            stop,
        }
    }

    /// Run until stopped; a device error ends the session early
    pub fn run(mut self) -> Result<SessionStats, SessionError> {
        let description = self.source.describe();
        self.controller.start(Instant::now(), &description);
        info!(source = %description, sink = self.sink.name(), "session running");

        while !self.stop.is_requested() {
            let tick_started = Instant::now();

            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e) if self.stop.is_requested() => {
                    info!(source = %description, error = %e, "frame source ended during shutdown");
                    break;
                }
                Err(e) => {
                    error!(source = %description, error = %e, "frame source unavailable");
                    self.source.release();
                    self.controller.stop(Instant::now());
                    return Err(e.into());
                }
            };

            self.controller
                .tick(Instant::now(), &frame, &self.classifier, &self.sink);

            if let Some(rest) = self.tick.checked_sub(tick_started.elapsed()) {
                thread::sleep(rest);
            }
        }

        info!("stop requested, ending session");
        self.source.release();
        Ok(self.controller.stop(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use crate::capture::Frame;
    use crate::classify::{ClassificationOutcome, GestureSignal};
    use crate::error::{ActionError, DeviceError};

    /// Yields `limit` frames, then reports the device gone
    struct FiniteSource {
        produced: u64,
        limit: u64,
        released: Arc<AtomicBool>,
        stop_after: Option<(u64, StopFlag)>,
    }

    impl FrameSource for FiniteSource {
        fn next_frame(&mut self) -> Result<Frame, DeviceError> {
            if self.produced >= self.limit {
                return Err(DeviceError::Capture("unplugged".to_string()));
            }
            self.produced += 1;
            if let Some((n, stop)) = &self.stop_after {
                if self.produced >= *n {
                    stop.request();
                }
            }
            Ok(Frame::new(image::RgbImage::new(2, 2), self.produced))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "finite".to_string()
        }
    }

    struct AlwaysThumbsUp;

    impl Classifier for AlwaysThumbsUp {
        fn classify(&self, _frame: &Frame) -> ClassificationOutcome {
            ClassificationOutcome::Success(GestureSignal::present(99.0, json!({})))
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink(Arc<AtomicU32>);

    impl ActionSink for CountingSink {
        fn trigger(&self) -> Result<(), ActionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn fast_settings() -> TriggerSettings {
        TriggerSettings {
            api_interval: Duration::from_millis(1),
            cooldown: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_device_loss_is_fatal_and_releases() {
        let released = Arc::new(AtomicBool::new(false));
        let source = FiniteSource {
            produced: 0,
            limit: 3,
            released: Arc::clone(&released),
            stop_after: None,
        };
        let (tx, _rx) = broadcast::channel(64);
        let session = Session::new(
            source,
            AlwaysThumbsUp,
            CountingSink::default(),
            fast_settings(),
            Duration::from_millis(2),
            StopFlag::new(),
            tx,
        );

        let result = session.run();
        assert!(matches!(result, Err(SessionError::Device(_))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_flag_ends_session_cleanly() {
        let released = Arc::new(AtomicBool::new(false));
        let stop = StopFlag::new();
        let source = FiniteSource {
            produced: 0,
            limit: u64::MAX,
            released: Arc::clone(&released),
            stop_after: Some((4, stop.clone())),
        };
        let sink = CountingSink::default();
        let (tx, mut rx) = broadcast::channel(64);
        let session = Session::new(
            source,
            AlwaysThumbsUp,
            sink.clone(),
            fast_settings(),
            Duration::from_millis(5),
            stop,
            tx,
        );

        let stats = session.run().unwrap();
        assert!(released.load(Ordering::SeqCst));
        // Ticks are 5ms apart, past both the 1ms interval and cooldown
        assert_eq!(stats.classifications, 4);
        assert_eq!(stats.volume_changes, 4);
        assert_eq!(sink.0.load(Ordering::SeqCst), 4);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(SessionEvent::SessionStopped { volume_changes: 4, .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_during_stalled_capture() {
        let mut cmd = std::process::Command::new("sleep");
        cmd.arg("30");
        let camera = crate::capture::CameraSource::from_command(
            cmd,
            "stalled camera".to_string(),
            (4, 2),
            Duration::from_millis(200),
        )
        .unwrap();

        let stop = StopFlag::new();
        let (tx, _rx) = broadcast::channel(8);
        let session = Session::new(
            camera,
            AlwaysThumbsUp,
            CountingSink::default(),
            fast_settings(),
            Duration::from_millis(1),
            stop.clone(),
            tx,
        );

        let started = Instant::now();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            stop.request();
        });

        let stats = session.run().unwrap();
        stopper.join().unwrap();
        assert_eq!(stats.classifications, 0);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_stop_before_start_does_nothing() {
        let stop = StopFlag::new();
        stop.request();
        let source = FiniteSource {
            produced: 0,
            limit: 10,
            released: Arc::new(AtomicBool::new(false)),
            stop_after: None,
        };
        let sink = CountingSink::default();
        let (tx, _rx) = broadcast::channel(8);
        let session = Session::new(
            source,
            AlwaysThumbsUp,
            sink.clone(),
            fast_settings(),
            Duration::from_millis(1),
            stop,
            tx,
        );

        let stats = session.run().unwrap();
        assert_eq!(stats, SessionStats::default());
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
    }
}
