//! The scan session controller.
//!
//! `ScanSession` owns the capture lifecycle (configure, start, stop), the
//! permission gate, and the detection pipeline. One session is active per
//! process at a time; starting a second one is rejected deterministically.
//!
//! Threading: `start` returns immediately and configuration happens on a
//! control thread. A capture thread pumps frames into a bounded drop-oldest
//! queue and a detection thread drains it, so detection latency never stalls
//! session control. `stop` joins all three threads (bounded) and suppresses any
//! result that has not yet reached the caller.

use lazy_static::lazy_static;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::context::{CallbackContext, DirectContext};
use crate::detector::{BarcodeDetector, RxingDetector};
use crate::device::{DeviceProvider, FrameSource, NokhwaDeviceProvider};
use crate::dispatch::{FrameDispatcher, FrameSink, ResultDelivery};
use crate::errors::ScanError;
use crate::permissions::{AuthorizationBackend, PermissionGate};
use crate::types::{Frame, MediaKind, ScanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Running,
    Stopped,
}

/// A caller-owned render target for the live preview.
///
/// The session attaches to it exactly once per start, renders frames into it
/// while running, and detaches on stop. It never owns the surface's lifetime.
/// `attach`/`detach` are posted through the caller's context; `render` is
/// called from the capture thread.
pub trait PreviewSurface: Send + Sync {
    fn attach(&self);
    fn render(&self, frame: &Frame);
    fn detach(&self);
}

lazy_static! {
    // One capture session active process-wide.
    static ref ACTIVE_SESSION: Mutex<Option<Uuid>> = Mutex::new(None);
}

enum PopOutcome {
    Frame(Frame),
    Empty,
    Closed,
}

/// Bounded frame queue between the capture and detection threads. When full,
/// the oldest frame is dropped: freshness over completeness.
struct FrameQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    frames: VecDeque<Frame>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

impl FrameQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity.min(64)),
                capacity: capacity.max(1),
                dropped: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn push_drop_oldest(&self, frame: Frame) {
        let mut g = self.inner.lock().expect("lock poisoned");
        if g.closed {
            return;
        }

        if g.frames.len() >= g.capacity {
            g.frames.pop_front();
            g.dropped = g.dropped.saturating_add(1);
        }
        g.frames.push_back(frame);
        self.cv.notify_one();
    }

    fn pop_timeout(&self, timeout: Duration) -> PopOutcome {
        let mut g = self.inner.lock().expect("lock poisoned");
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = g.frames.pop_front() {
                return PopOutcome::Frame(frame);
            }
            if g.closed {
                return PopOutcome::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return PopOutcome::Empty;
            }

            let (ng, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .expect("lock poisoned");
            g = ng;
        }
    }

    fn dropped(&self) -> u64 {
        self.inner.lock().expect("lock poisoned").dropped
    }

    fn close(&self) {
        let mut g = self.inner.lock().expect("lock poisoned");
        g.closed = true;
        self.cv.notify_all();
    }
}

#[derive(Clone)]
struct RunShared {
    stop_flag: Arc<AtomicBool>,
    queue: Arc<FrameQueue>,
    delivery: Arc<ResultDelivery>,
    attached: Arc<AtomicBool>,
    surface: Arc<dyn PreviewSurface>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

struct ActiveRun {
    shared: RunShared,
    control: Option<JoinHandle<()>>,
}

struct SessionInner {
    id: Uuid,
    config: ScanConfig,
    state: Mutex<SessionState>,
    gate: PermissionGate,
    provider: Box<dyn DeviceProvider>,
    detector: Arc<dyn BarcodeDetector>,
    context: Arc<dyn CallbackContext>,
    permission_verified: AtomicBool,
    run: Mutex<Option<ActiveRun>>,
}

/// The scanning session controller.
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

impl ScanSession {
    /// Production session: nokhwa capture, rxing detection, system
    /// authorization, inline callback context.
    pub fn new(config: ScanConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ScanSessionBuilder {
        ScanSessionBuilder::new()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("lock poisoned")
    }

    /// Frames dropped under backpressure during the current run.
    pub fn dropped_frames(&self) -> u64 {
        self.inner
            .run
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|run| run.shared.queue.dropped())
            .unwrap_or(0)
    }

    /// Check camera authorization. The completion fires exactly once; a granted
    /// completion unlocks `start` for this session.
    pub fn check_permission<F>(&self, kind: MediaKind, completion: F)
    where
        F: FnOnce(bool, Option<String>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner.gate.check_permission(kind, move |granted, reason| {
            if granted {
                inner.permission_verified.store(true, Ordering::Release);
            }
            completion(granted, reason);
        });
    }

    /// Start scanning into `surface`, reporting the first decoded payload to
    /// `on_success` or the first error to `on_failure` (at most one of the two,
    /// at most once, on the session's callback context).
    ///
    /// Returns immediately; device acquisition and the frame pump start on
    /// dedicated worker threads. Callers must not assume the preview is
    /// attached when this returns.
    ///
    /// Requires a prior granted `check_permission` on this session; an ungated
    /// start is a logged no-op. A start while another session is active, or
    /// while this one is configuring or running, is rejected.
    pub fn start<S, F>(&self, surface: Arc<dyn PreviewSurface>, on_success: S, on_failure: F)
    where
        S: FnOnce(String) + Send + 'static,
        F: FnOnce(ScanError) + Send + 'static,
    {
        if !self.inner.permission_verified.load(Ordering::Acquire) {
            log::warn!("start called without a successful permission check; ignoring");
            return;
        }

        let mut state = self.inner.state.lock().expect("lock poisoned");
        match *state {
            SessionState::Idle | SessionState::Stopped => {}
            other => {
                log::warn!("Session is {:?}; rejecting start", other);
                return;
            }
        }

        {
            let mut slot = ACTIVE_SESSION.lock().expect("lock poisoned");
            match *slot {
                Some(owner) if owner != self.inner.id => {
                    log::warn!("Another scan session is active; rejecting start");
                    return;
                }
                _ => *slot = Some(self.inner.id),
            }
        }

        *state = SessionState::Configuring;
        drop(state);

        let shared = RunShared {
            stop_flag: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(FrameQueue::new(self.inner.config.pipeline.queue_capacity)),
            delivery: ResultDelivery::new(
                Arc::clone(&self.inner.context),
                Box::new(on_success),
                Box::new(on_failure),
            ),
            attached: Arc::new(AtomicBool::new(false)),
            surface,
            workers: Arc::new(Mutex::new(Vec::new())),
        };

        // Register the run before spawning so a concurrent stop can always
        // reach the stop flag and queue.
        *self.inner.run.lock().expect("lock poisoned") = Some(ActiveRun {
            shared: shared.clone(),
            control: None,
        });

        let inner = Arc::clone(&self.inner);
        let control = thread::Builder::new()
            .name("barscan-control".to_string())
            .spawn(move || configure_and_run(inner, shared));

        match control {
            Ok(handle) => {
                if let Some(run) = self.inner.run.lock().expect("lock poisoned").as_mut() {
                    run.control = Some(handle);
                }
            }
            Err(e) => {
                log::error!("Failed to spawn session control thread: {}", e);
                *self.inner.run.lock().expect("lock poisoned") = None;
                abort_run(&self.inner);
            }
        }
    }

    /// Stop the frame pump and detach the preview. Idempotent; safe to call
    /// when already stopped or never started.
    ///
    /// Joins the control, capture, and detection threads with a bounded
    /// timeout, and suppresses any result callback that has not run yet, so no
    /// on_success/on_failure fires after this returns.
    pub fn stop(&self) {
        let run = self.inner.run.lock().expect("lock poisoned").take();
        let Some(mut run) = run else {
            log::debug!("stop called with no active session");
            return;
        };

        run.shared.delivery.cancel();
        run.shared.stop_flag.store(true, Ordering::Release);
        run.shared.queue.close();

        let timeout = Duration::from_millis(self.inner.config.pipeline.stop_join_timeout_ms);
        if let Some(handle) = run.control.take() {
            join_with_timeout(handle, timeout);
        }
        let workers: Vec<JoinHandle<()>> = {
            let mut workers = run.shared.workers.lock().expect("lock poisoned");
            workers.drain(..).collect()
        };
        for handle in workers {
            join_with_timeout(handle, timeout);
        }

        if run.shared.attached.swap(false, Ordering::AcqRel) {
            let surface = Arc::clone(&run.shared.surface);
            self.inner.context.post(Box::new(move || surface.detach()));
        }

        *self.inner.state.lock().expect("lock poisoned") = SessionState::Stopped;
        release_slot(self.inner.id);
        log::info!("Scan session stopped");
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds a session with injected dependencies. Anything not supplied gets the
/// production implementation.
pub struct ScanSessionBuilder {
    config: ScanConfig,
    provider: Option<Box<dyn DeviceProvider>>,
    detector: Option<Arc<dyn BarcodeDetector>>,
    authorization: Option<Arc<dyn AuthorizationBackend>>,
    context: Option<Arc<dyn CallbackContext>>,
}

impl ScanSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
            provider: None,
            detector: None,
            authorization: None,
            context: None,
        }
    }

    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn device_provider(mut self, provider: Box<dyn DeviceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn BarcodeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn authorization(mut self, backend: Arc<dyn AuthorizationBackend>) -> Self {
        self.authorization = Some(backend);
        self
    }

    pub fn context(mut self, context: Arc<dyn CallbackContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn build(self) -> ScanSession {
        let config = match self.config.validate() {
            Ok(()) => self.config,
            Err(reason) => {
                log::warn!(
                    "Invalid scan configuration ({}), falling back to defaults",
                    reason
                );
                ScanConfig::default()
            }
        };

        let detector = self.detector.unwrap_or_else(|| {
            Arc::new(
                RxingDetector::new(config.detector.symbology_set())
                    .with_try_harder(config.detector.try_harder),
            )
        });
        let gate = match self.authorization {
            Some(backend) => PermissionGate::with_backend(backend),
            None => PermissionGate::new(),
        };

        ScanSession {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                config,
                state: Mutex::new(SessionState::Idle),
                gate,
                provider: self.provider.unwrap_or_else(|| Box::new(NokhwaDeviceProvider)),
                detector,
                context: self.context.unwrap_or_else(|| Arc::new(DirectContext)),
                permission_verified: AtomicBool::new(false),
                run: Mutex::new(None),
            }),
        }
    }
}

impl Default for ScanSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn configure_and_run(inner: Arc<SessionInner>, run: RunShared) {
    if run.stop_flag.load(Ordering::Acquire) {
        set_state(&inner, SessionState::Stopped);
        return;
    }

    log::debug!("Configuring capture session");
    let mut source = match inner.provider.open_default(&inner.config.camera) {
        Ok(source) => source,
        Err(error) => {
            log::error!("Capture device unavailable: {}", error);
            run.delivery.deliver(ScanResult::Failure(error));
            abort_run(&inner);
            return;
        }
    };

    if let Err(error) = source.start() {
        log::error!("Failed to start capture stream: {}", error);
        run.delivery.deliver(ScanResult::Failure(error));
        abort_run(&inner);
        return;
    }
    let device_id = source.device_id().to_string();

    // A stop that raced with device acquisition wins here; the preview must
    // not attach after it.
    if run.stop_flag.load(Ordering::Acquire) {
        set_state(&inner, SessionState::Stopped);
        return;
    }

    // Preview attachment is scheduled on the caller context; the frame pump
    // below starts without waiting for it.
    run.attached.store(true, Ordering::Release);
    {
        let surface = Arc::clone(&run.surface);
        inner.context.post(Box::new(move || surface.attach()));
    }

    let sink = FrameDispatcher::new(Arc::clone(&inner.detector), Arc::clone(&run.delivery));
    let poll_timeout = Duration::from_millis(inner.config.pipeline.poll_timeout_ms);

    let detect = {
        let queue = Arc::clone(&run.queue);
        let stop_flag = Arc::clone(&run.stop_flag);
        thread::Builder::new()
            .name("barscan-detect".to_string())
            .spawn(move || detection_loop(queue, stop_flag, sink, poll_timeout))
    };
    let capture = {
        let queue = Arc::clone(&run.queue);
        let stop_flag = Arc::clone(&run.stop_flag);
        let delivery = Arc::clone(&run.delivery);
        let surface = Arc::clone(&run.surface);
        thread::Builder::new()
            .name("barscan-capture".to_string())
            .spawn(move || capture_loop(source, queue, stop_flag, delivery, surface))
    };

    match (detect, capture) {
        (Ok(detect), Ok(capture)) => {
            let mut workers = run.workers.lock().expect("lock poisoned");
            workers.push(detect);
            workers.push(capture);
        }
        (detect, capture) => {
            log::error!("Failed to spawn pipeline threads");
            run.stop_flag.store(true, Ordering::Release);
            run.queue.close();
            {
                let mut workers = run.workers.lock().expect("lock poisoned");
                workers.extend(detect.into_iter());
                workers.extend(capture.into_iter());
            }
            run.delivery.deliver(ScanResult::Failure(ScanError::DeviceUnavailable(
                "Failed to spawn pipeline threads".to_string(),
            )));
            abort_run(&inner);
            return;
        }
    }

    set_state(&inner, SessionState::Running);
    log::info!("Scan session running on device {}", device_id);
}

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    queue: Arc<FrameQueue>,
    stop_flag: Arc<AtomicBool>,
    delivery: Arc<ResultDelivery>,
    surface: Arc<dyn PreviewSurface>,
) {
    loop {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        match source.next_frame() {
            Ok(frame) => {
                surface.render(&frame);
                queue.push_drop_oldest(frame);
            }
            Err(error) => {
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                // Capture failures are terminal for the session; no retries.
                log::error!("Frame capture failed: {}", error);
                queue.close();
                delivery.deliver(ScanResult::Failure(error));
                break;
            }
        }
    }

    source.stop();
    log::debug!("Capture loop ended");
}

fn detection_loop<S: FrameSink>(
    queue: Arc<FrameQueue>,
    stop_flag: Arc<AtomicBool>,
    sink: S,
    poll_timeout: Duration,
) {
    loop {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        match queue.pop_timeout(poll_timeout) {
            PopOutcome::Frame(frame) => sink.on_frame(frame),
            PopOutcome::Empty => {}
            PopOutcome::Closed => break,
        }
    }

    log::debug!(
        "Detection loop ended; {} frame(s) dropped under backpressure",
        queue.dropped()
    );
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        if start.elapsed() >= timeout {
            // Detach rather than hang; the delivery cancel flag already
            // guarantees no callback runs after stop.
            log::warn!("Worker thread did not stop within {:?}; detaching", timeout);
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn set_state(inner: &SessionInner, state: SessionState) {
    *inner.state.lock().expect("lock poisoned") = state;
}

fn abort_run(inner: &SessionInner) {
    set_state(inner, SessionState::Stopped);
    release_slot(inner.id);
}

fn release_slot(id: Uuid) {
    let mut slot = ACTIVE_SESSION.lock().expect("lock poisoned");
    if *slot == Some(id) {
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_frame;

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let queue = FrameQueue::new(2);
        for i in 0..5 {
            queue.push_drop_oldest(synthetic_frame(i, 8, 8).with_sequence(i + 1));
        }
        assert_eq!(queue.dropped(), 3);

        // The two freshest frames survive.
        match queue.pop_timeout(Duration::from_millis(10)) {
            PopOutcome::Frame(frame) => assert_eq!(frame.sequence, 4),
            _ => panic!("expected a frame"),
        }
        match queue.pop_timeout(Duration::from_millis(10)) {
            PopOutcome::Frame(frame) => assert_eq!(frame.sequence, 5),
            _ => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_queue_pop_times_out_when_empty() {
        let queue = FrameQueue::new(2);
        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(10)),
            PopOutcome::Empty
        ));
    }

    #[test]
    fn test_queue_close_wakes_popper() {
        let queue = Arc::new(FrameQueue::new(2));
        let queue_clone = Arc::clone(&queue);
        let popper = thread::spawn(move || queue_clone.pop_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(matches!(popper.join().unwrap(), PopOutcome::Closed));
    }

    #[test]
    fn test_queue_rejects_push_after_close() {
        let queue = FrameQueue::new(2);
        queue.close();
        queue.push_drop_oldest(synthetic_frame(0, 8, 8));
        assert!(matches!(
            queue.pop_timeout(Duration::ZERO),
            PopOutcome::Closed
        ));
    }

    #[test]
    fn test_queue_drains_before_reporting_closed() {
        let queue = FrameQueue::new(2);
        queue.push_drop_oldest(synthetic_frame(0, 8, 8).with_sequence(1));
        queue.close();
        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(10)),
            PopOutcome::Frame(_)
        ));
        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(10)),
            PopOutcome::Closed
        ));
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = ScanSession::builder().build();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.dropped_frames(), 0);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let session = ScanSession::builder().build();
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }
}
