//! Scripted collaborators for offline session testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CameraSection;
use crate::detector::BarcodeDetector;
use crate::device::{DeviceProvider, FrameSource};
use crate::errors::ScanError;
use crate::permissions::{AuthorizationBackend, PermissionStatus};
use crate::session::PreviewSurface;
use crate::types::{Frame, MediaKind, Observation, Symbology};

use super::blank_frame;

/// Authorization backend that always reports one status.
pub struct FixedAuthorization {
    status: PermissionStatus,
    grant_on_request: bool,
}

impl FixedAuthorization {
    pub fn granted() -> Self {
        Self {
            status: PermissionStatus::Granted,
            grant_on_request: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            status: PermissionStatus::Denied,
            grant_on_request: false,
        }
    }

    pub fn restricted() -> Self {
        Self {
            status: PermissionStatus::Restricted,
            grant_on_request: false,
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: PermissionStatus::Unknown,
            grant_on_request: false,
        }
    }

    /// Not yet decided; the prompt answers with `grant`.
    pub fn prompting(grant: bool) -> Self {
        Self {
            status: PermissionStatus::NotDetermined,
            grant_on_request: grant,
        }
    }
}

impl AuthorizationBackend for FixedAuthorization {
    fn status(&self, _kind: MediaKind) -> PermissionStatus {
        self.status
    }

    fn request_access(&self, _kind: MediaKind) -> bool {
        self.grant_on_request
    }
}

/// Frame source that replays a script, then idles on blank frames.
pub struct ScriptedSource {
    device_id: String,
    steps: Mutex<VecDeque<Result<Frame, ScanError>>>,
    frame_interval: Duration,
    started: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Result<Frame, ScanError>>) -> Self {
        Self {
            device_id: "scripted".to_string(),
            steps: Mutex::new(steps.into()),
            frame_interval: Duration::from_millis(5),
            started: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self::new(frames.into_iter().map(Ok).collect())
    }

    /// Handles observing lifecycle calls after the source moves to the
    /// capture thread.
    pub fn lifecycle(&self) -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        (Arc::clone(&self.started), Arc::clone(&self.stopped))
    }
}

impl FrameSource for ScriptedSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn start(&mut self) -> Result<(), ScanError> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, ScanError> {
        thread::sleep(self.frame_interval);
        if let Some(step) = self.steps.lock().expect("lock poisoned").pop_front() {
            return step;
        }
        // Script exhausted: keep the pump alive with undecodable filler.
        Ok(blank_frame(16, 16))
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Device provider handing out one scripted source, or failing outright.
pub struct ScriptedProvider {
    source: Mutex<Option<ScriptedSource>>,
    failure: Option<ScanError>,
}

impl ScriptedProvider {
    pub fn with_source(source: ScriptedSource) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            failure: None,
        }
    }

    pub fn failing(error: ScanError) -> Self {
        Self {
            source: Mutex::new(None),
            failure: Some(error),
        }
    }
}

impl DeviceProvider for ScriptedProvider {
    fn open_default(&self, _camera: &CameraSection) -> Result<Box<dyn FrameSource>, ScanError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.source
            .lock()
            .expect("lock poisoned")
            .take()
            .map(|source| Box::new(source) as Box<dyn FrameSource>)
            .ok_or_else(|| {
                ScanError::DeviceUnavailable("Scripted source already consumed".to_string())
            })
    }
}

/// Detector that maps frame sequence numbers to scripted outcomes.
/// Unscripted frames detect nothing.
#[derive(Default)]
pub struct ScriptedDetector {
    outcomes: Mutex<HashMap<u64, Result<Vec<Observation>, ScanError>>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame `sequence` decodes to `payload` (as a QR observation).
    pub fn payload_for(&self, sequence: u64, payload: &str) {
        self.observation_for(
            sequence,
            Observation {
                symbology: Symbology::Qr,
                payload: Some(payload.to_string()),
            },
        );
    }

    /// Frame `sequence` yields one more observation.
    pub fn observation_for(&self, sequence: u64, observation: Observation) {
        let mut outcomes = self.outcomes.lock().expect("lock poisoned");
        match outcomes.entry(sequence).or_insert_with(|| Ok(Vec::new())) {
            Ok(observations) => observations.push(observation),
            Err(_) => {}
        }
    }

    /// Frame `sequence` fails detection.
    pub fn error_for(&self, sequence: u64, error: ScanError) {
        self.outcomes
            .lock()
            .expect("lock poisoned")
            .insert(sequence, Err(error));
    }

    pub fn detect_calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

impl BarcodeDetector for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Observation>, ScanError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.outcomes
            .lock()
            .expect("lock poisoned")
            .get(&frame.sequence)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Preview surface that counts lifecycle calls.
#[derive(Default)]
pub struct RecordingSurface {
    attaches: AtomicUsize,
    renders: AtomicUsize,
    detaches: AtomicUsize,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::Acquire)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::Acquire)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::Acquire)
    }
}

impl PreviewSurface for RecordingSurface {
    fn attach(&self) {
        self.attaches.fetch_add(1, Ordering::AcqRel);
    }

    fn render(&self, _frame: &Frame) {
        self.renders.fetch_add(1, Ordering::AcqRel);
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::AcqRel);
    }
}

/// Records result callback invocations for assertions.
#[derive(Default)]
pub struct CallbackRecorder {
    successes: Mutex<Vec<String>>,
    failures: Mutex<Vec<ScanError>>,
}

impl CallbackRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The single-use callback pair to hand to `ScanSession::start`.
    pub fn callbacks(
        self: &Arc<Self>,
    ) -> (
        impl FnOnce(String) + Send + 'static,
        impl FnOnce(ScanError) + Send + 'static,
    ) {
        let on_success = {
            let recorder = Arc::clone(self);
            move |payload: String| {
                recorder
                    .successes
                    .lock()
                    .expect("lock poisoned")
                    .push(payload);
            }
        };
        let on_failure = {
            let recorder = Arc::clone(self);
            move |error: ScanError| {
                recorder.failures.lock().expect("lock poisoned").push(error);
            }
        };
        (on_success, on_failure)
    }

    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().expect("lock poisoned").clone()
    }

    pub fn failures(&self) -> Vec<ScanError> {
        self.failures.lock().expect("lock poisoned").clone()
    }

    pub fn total(&self) -> usize {
        self.successes().len() + self.failures().len()
    }

    /// Poll until any callback fires or `timeout` elapses.
    pub fn wait_for_any(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.total() > 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.total() > 0
    }
}
