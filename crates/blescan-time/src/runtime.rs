//! Tokio backed timeline

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::trace;

use blescan_core::{ScanTime, ScannerError, ScannerResult};

use crate::{Task, TaskHandle, Timeline};

/// Timeline whose tasks are timers spawned on an injected tokio runtime.
///
/// Time is read from `tokio::time::Instant`, so a paused test runtime
/// drives it deterministically.
pub struct TokioTimeline {
    handle: Handle,
    origin: Instant,
    tasks: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: AtomicU64,
}

impl TokioTimeline {
    pub fn new(handle: Handle) -> Self {
        TokioTimeline {
            handle,
            origin: Instant::now(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Bind to the runtime of the calling context
    pub fn current() -> ScannerResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ScannerError::NoRuntime(e.to_string()))
    }

    /// Tasks scheduled but not yet run or cancelled
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Timeline for TokioTimeline {
    fn now(&self) -> ScanTime {
        ScanTime::from_duration(Instant::now().saturating_duration_since(self.origin))
    }

    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = self.tasks.clone();

        // Held across spawn so the timer cannot fire before it is registered
        let mut pending = self.tasks.lock();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let live = tasks.lock().remove(&id).is_some();
            if live {
                task();
            }
        });
        pending.insert(id, join.abort_handle());
        trace!(task = id, delay_ms = delay.as_millis() as u64, "scheduled");

        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some(abort) = self.tasks.lock().remove(&handle.0) {
            abort.abort();
            trace!(task = handle.0, "cancelled");
        }
    }
}

impl Drop for TokioTimeline {
    fn drop(&mut self) {
        for (_, abort) in self.tasks.lock().drain() {
            abort.abort();
        }
    }
}

impl std::fmt::Debug for TokioTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTimeline")
            .field("pending", &self.pending())
            .finish()
    }
}
