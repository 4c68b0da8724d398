//! Caller execution contexts for result delivery.
//!
//! Detection runs on a dedicated worker thread; result callbacks are never
//! invoked from it directly. Every callback is posted through a
//! [`CallbackContext`] first, which decides where it actually runs.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where result callbacks and preview attachment run.
pub trait CallbackContext: Send + Sync {
    fn post(&self, task: Task);
}

/// Runs tasks inline on whichever thread posts them.
///
/// Suitable for callers whose callbacks are thread-safe. Callers that need
/// results on a specific thread should use [`QueuedContext`] instead.
#[derive(Debug, Default)]
pub struct DirectContext;

impl CallbackContext for DirectContext {
    fn post(&self, task: Task) {
        task();
    }
}

/// Queues tasks for a thread of the caller's choosing.
///
/// Tasks accumulate until the paired [`ContextPump`] runs them, so a UI caller
/// can drain the pump from its own event loop.
pub struct QueuedContext {
    tx: Mutex<mpsc::Sender<Task>>,
}

/// The receiving half of a [`QueuedContext`]. Owned by the caller's thread.
pub struct ContextPump {
    rx: mpsc::Receiver<Task>,
}

/// Create a queued context and the pump that drains it.
pub fn queued() -> (Arc<QueuedContext>, ContextPump) {
    let (tx, rx) = mpsc::channel();
    (
        Arc::new(QueuedContext { tx: Mutex::new(tx) }),
        ContextPump { rx },
    )
}

impl CallbackContext for QueuedContext {
    fn post(&self, task: Task) {
        let tx = self.tx.lock().expect("lock poisoned");
        if tx.send(task).is_err() {
            log::debug!("callback context pump is gone, dropping task");
        }
    }
}

impl ContextPump {
    /// Run every task currently queued without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it. Returns whether one ran.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }
}
