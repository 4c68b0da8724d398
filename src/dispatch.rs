//! Frame dispatch and single-fire result delivery.
//!
//! [`FrameDispatcher`] implements the frame-delivery interface the detection
//! thread drives; [`ResultDelivery`] owns the caller's callback pair and
//! guarantees that at most one of them runs, on the caller's context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::CallbackContext;
use crate::detector::BarcodeDetector;
use crate::errors::ScanError;
use crate::types::{Frame, Observation, ScanResult};

pub type SuccessCallback = Box<dyn FnOnce(String) + Send + 'static>;
pub type FailureCallback = Box<dyn FnOnce(ScanError) + Send + 'static>;

/// Holds one session's callback pair and enforces the single-fire discipline.
///
/// `deliver` is safe to call from any thread and any number of times; the first
/// caller wins and the callbacks are consumed. `cancel` suppresses a result that
/// was already posted to the context but has not run yet.
pub struct ResultDelivery {
    delivered: AtomicBool,
    cancelled: Arc<AtomicBool>,
    context: Arc<dyn CallbackContext>,
    callbacks: Mutex<Option<(SuccessCallback, FailureCallback)>>,
}

impl ResultDelivery {
    pub fn new(
        context: Arc<dyn CallbackContext>,
        on_success: SuccessCallback,
        on_failure: FailureCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            delivered: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            context,
            callbacks: Mutex::new(Some((on_success, on_failure))),
        })
    }

    /// Deliver the session result. First writer wins; later results are dropped.
    pub fn deliver(&self, result: ScanResult) {
        if self
            .delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Result already delivered, dropping a later one");
            return;
        }

        let callbacks = self.callbacks.lock().expect("lock poisoned").take();
        let Some((on_success, on_failure)) = callbacks else {
            return;
        };

        let cancelled = Arc::clone(&self.cancelled);
        self.context.post(Box::new(move || {
            if cancelled.load(Ordering::Acquire) {
                log::debug!("Session stopped before the result ran, suppressing it");
                return;
            }
            match result {
                ScanResult::Success(payload) => on_success(payload),
                ScanResult::Failure(error) => on_failure(error),
            }
        }));
    }

    /// Suppress any result that has not run yet. Called by `stop`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }
}

/// Polymorphic frame-delivery interface driven by the detection thread.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: Frame);
}

/// Forwards each frame to the detector and routes the first result.
pub struct FrameDispatcher {
    detector: Arc<dyn BarcodeDetector>,
    delivery: Arc<ResultDelivery>,
}

impl FrameDispatcher {
    pub fn new(detector: Arc<dyn BarcodeDetector>, delivery: Arc<ResultDelivery>) -> Self {
        Self { detector, delivery }
    }
}

impl FrameSink for FrameDispatcher {
    fn on_frame(&self, frame: Frame) {
        // The session is consumed once a result has fired; later frames are
        // discarded without running detection.
        if self.delivery.is_delivered() {
            return;
        }

        if frame.is_empty() {
            log::trace!("Frame {} has no image buffer, dropping", frame.sequence);
            return;
        }

        match self.detector.detect(&frame) {
            Ok(observations) => {
                let count = observations.len();
                if let Some(payload) = first_payload(observations) {
                    log::info!(
                        "Decoded barcode from frame {} ({} observation(s))",
                        frame.sequence,
                        count
                    );
                    self.delivery.deliver(ScanResult::Success(payload));
                }
            }
            Err(error) => {
                log::warn!(
                    "Barcode detection failed on frame {}: {}",
                    frame.sequence,
                    error
                );
                self.delivery.deliver(ScanResult::Failure(error));
            }
        }
    }
}

/// First observation in detector ordering with a non-empty payload.
fn first_payload(observations: Vec<Observation>) -> Option<String> {
    observations
        .into_iter()
        .find_map(|observation| observation.payload.filter(|payload| !payload.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DirectContext;
    use crate::testing::fakes::ScriptedDetector;
    use crate::testing::synthetic_frame;
    use crate::types::Symbology;
    use std::sync::atomic::AtomicUsize;

    fn counting_delivery() -> (Arc<ResultDelivery>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&successes);
        let f = Arc::clone(&failures);
        let delivery = ResultDelivery::new(
            Arc::new(DirectContext),
            Box::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (delivery, successes, failures)
    }

    #[test]
    fn test_first_writer_wins() {
        let (delivery, successes, failures) = counting_delivery();
        delivery.deliver(ScanResult::Success("first".to_string()));
        delivery.deliver(ScanResult::Failure(ScanError::UnknownPermissionState));
        delivery.deliver(ScanResult::Success("third".to_string()));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert!(delivery.is_delivered());
    }

    #[test]
    fn test_cancel_suppresses_posted_result() {
        let (context, pump) = crate::context::queued();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let delivery = ResultDelivery::new(
            context,
            Box::new(move |_| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|_| panic!("failure callback must not run")),
        );

        delivery.deliver(ScanResult::Success("late".to_string()));
        delivery.cancel();
        pump.run_pending();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_first_payload_skips_empty_observations() {
        let observations = vec![
            Observation {
                symbology: Symbology::Qr,
                payload: None,
            },
            Observation {
                symbology: Symbology::Qr,
                payload: Some(String::new()),
            },
            Observation {
                symbology: Symbology::Code39,
                payload: Some("ABC123".to_string()),
            },
        ];
        assert_eq!(first_payload(observations), Some("ABC123".to_string()));
    }

    #[test]
    fn test_all_empty_observations_produce_no_callback() {
        let (delivery, successes, failures) = counting_delivery();
        let detector = ScriptedDetector::new();
        detector.observation_for(
            1,
            Observation {
                symbology: Symbology::Qr,
                payload: None,
            },
        );
        let dispatcher = FrameDispatcher::new(Arc::new(detector), delivery);

        dispatcher.on_frame(synthetic_frame(0, 32, 32).with_sequence(1));
        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_frame_dropped_without_detection() {
        let (delivery, _successes, _failures) = counting_delivery();
        let detector = Arc::new(ScriptedDetector::new());
        let detector_dyn: Arc<dyn BarcodeDetector> = detector.clone();
        let dispatcher = FrameDispatcher::new(detector_dyn, delivery);

        let mut frame = synthetic_frame(0, 16, 16).with_sequence(1);
        frame.data.clear();
        dispatcher.on_frame(frame);
        assert_eq!(detector.detect_calls(), 0);
    }

    #[test]
    fn test_frames_after_delivery_skip_detection() {
        let (delivery, successes, _failures) = counting_delivery();
        let detector = Arc::new(ScriptedDetector::new());
        detector.payload_for(1, "ABC123");
        let detector_dyn: Arc<dyn BarcodeDetector> = detector.clone();
        let dispatcher = FrameDispatcher::new(detector_dyn, delivery);

        dispatcher.on_frame(synthetic_frame(0, 32, 32).with_sequence(1));
        dispatcher.on_frame(synthetic_frame(1, 32, 32).with_sequence(2));
        dispatcher.on_frame(synthetic_frame(2, 32, 32).with_sequence(3));

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(detector.detect_calls(), 1);
    }

    #[test]
    fn test_detector_error_fires_failure_once() {
        let (delivery, successes, failures) = counting_delivery();
        let detector = Arc::new(ScriptedDetector::new());
        detector.error_for(1, ScanError::DetectorError("boom".to_string()));
        detector.payload_for(2, "ABC123");
        let detector_dyn: Arc<dyn BarcodeDetector> = detector.clone();
        let dispatcher = FrameDispatcher::new(detector_dyn, delivery);

        dispatcher.on_frame(synthetic_frame(0, 32, 32).with_sequence(1));
        dispatcher.on_frame(synthetic_frame(1, 32, 32).with_sequence(2));

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 0);
    }
}
