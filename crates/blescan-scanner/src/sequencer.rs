//! Delayed start/stop sequencing
//!
//! The controller decides *what* the radio should do and *when*; the
//! sequencer carries it out. Every request replaces whatever was pending,
//! so at most one delayed action exists at a time.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use blescan_core::{ScanFilter, ScanSettings};
use blescan_time::{schedule_fn, TaskHandle, Timeline};

use crate::{RateLimiter, ScanDriver, ScanSink, StartStop};

/// Capability answering "is the radio hardware usable right now"
pub type HardwareCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Executes start/stop decisions, optionally after a delay
pub trait ScanSequencer: Send + Sync {
    /// Whether the resource is currently acquired
    fn is_started(&self) -> bool;

    /// Acquire after `delay`, replacing any pending action
    fn start(&self, delay: Duration);

    /// Release after `delay`, replacing any pending action
    fn stop(&self, delay: Duration);
}

#[derive(Default)]
struct Pending {
    generation: u64,
    task: Option<TaskHandle>,
}

struct SequencerInner {
    driver: Arc<dyn ScanDriver>,
    timeline: Arc<dyn Timeline>,
    filters: Vec<ScanFilter>,
    settings: ScanSettings,
    limiter: Option<Arc<RateLimiter>>,
    hardware_check: HardwareCheck,
    gate: StartStop,
    sink: Mutex<Option<Arc<dyn ScanSink>>>,
    pending: Mutex<Pending>,
}

impl SequencerInner {
    fn start_now(&self) {
        if !(self.hardware_check)() {
            debug!("hardware unavailable, start skipped");
            return;
        }
        let Some(sink) = self.sink.lock().clone() else {
            warn!("start requested before an event sink was attached");
            return;
        };
        self.gate.start(|| {
            debug!(mode = ?self.settings.mode, filters = self.filters.len(), "starting scanner for real");
            self.driver.acquire(&self.filters, &self.settings, sink);
            if let Some(limiter) = &self.limiter {
                limiter.record_acquisition(self.timeline.now());
            }
        });
    }

    fn stop_now(&self) {
        let sink = self.sink.lock().clone();
        self.gate.stop(|| {
            debug!("stopping scanner for real");
            if let Some(sink) = &sink {
                self.driver.release(sink);
            }
        });
    }
}

/// [`ScanSequencer`] over a driver and a timeline
pub struct DelayedScanner {
    inner: Arc<SequencerInner>,
}

/// What to acquire with
#[derive(Clone, Default)]
pub struct AcquireParams {
    pub filters: Vec<ScanFilter>,
    pub settings: ScanSettings,
    /// Records every real acquisition when present
    pub limiter: Option<Arc<RateLimiter>>,
}

impl DelayedScanner {
    pub fn new(
        driver: Arc<dyn ScanDriver>,
        timeline: Arc<dyn Timeline>,
        hardware_check: HardwareCheck,
        params: AcquireParams,
    ) -> Self {
        DelayedScanner {
            inner: Arc::new(SequencerInner {
                driver,
                timeline,
                filters: params.filters,
                settings: params.settings,
                limiter: params.limiter,
                hardware_check,
                gate: StartStop::new(),
                sink: Mutex::new(None),
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    /// Where driver output goes; must be set before the first start
    pub fn set_sink(&self, sink: Arc<dyn ScanSink>) {
        *self.inner.sink.lock() = Some(sink);
    }

    /// Whether a delayed action is waiting on the timeline
    pub fn has_pending(&self) -> bool {
        self.inner.pending.lock().task.is_some()
    }

    fn run(&self, delay: Duration, label: &'static str, action: fn(&SequencerInner)) {
        let generation = {
            let mut pending = self.inner.pending.lock();
            pending.generation += 1;
            if let Some(task) = pending.task.take() {
                self.inner.timeline.cancel(task);
            }
            pending.generation
        };

        if delay.is_zero() {
            action(&self.inner);
            return;
        }

        debug!(delay_ms = delay.as_millis() as u64, "scheduling scanner {}", label);
        let weak: Weak<SequencerInner> = Arc::downgrade(&self.inner);
        let task = schedule_fn(self.inner.timeline.as_ref(), delay, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut pending = inner.pending.lock();
                if pending.generation != generation {
                    return;
                }
                pending.task = None;
            }
            action(&inner);
        });

        let mut pending = self.inner.pending.lock();
        if pending.generation == generation {
            pending.task = Some(task);
        } else {
            // Superseded while scheduling
            self.inner.timeline.cancel(task);
        }
    }
}

impl ScanSequencer for DelayedScanner {
    fn is_started(&self) -> bool {
        self.inner.gate.is_started()
    }

    fn start(&self, delay: Duration) {
        self.run(delay, "start", SequencerInner::start_now);
    }

    fn stop(&self, delay: Duration) {
        self.run(delay, "stop", SequencerInner::stop_now);
    }
}

impl<S: ScanSequencer + ?Sized> ScanSequencer for Arc<S> {
    fn is_started(&self) -> bool {
        (**self).is_started()
    }

    fn start(&self, delay: Duration) {
        (**self).start(delay)
    }

    fn stop(&self, delay: Duration) {
        (**self).stop(delay)
    }
}
