//! Timeline abstraction

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use blescan_core::ScanTime;

/// Deferred unit of work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled task, used to cancel it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// A single logical timeline: a monotonic clock plus delayed tasks.
///
/// Cancelling a task that already ran (or was already cancelled) is a no-op.
/// Tasks run without any timeline lock held, so they may schedule or cancel.
pub trait Timeline: Send + Sync {
    /// Current point on the timeline
    fn now(&self) -> ScanTime;

    /// Run `task` once `delay` has elapsed
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Cancel a pending task
    fn cancel(&self, handle: TaskHandle);
}

impl<T: Timeline + ?Sized> Timeline for Arc<T> {
    fn now(&self) -> ScanTime {
        (**self).now()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        (**self).schedule(delay, task)
    }

    fn cancel(&self, handle: TaskHandle) {
        (**self).cancel(handle)
    }
}

/// Schedule a closure; shorthand for boxing it
pub fn schedule_fn(
    timeline: &dyn Timeline,
    delay: Duration,
    task: impl FnOnce() + Send + 'static,
) -> TaskHandle {
    timeline.schedule(delay, Box::new(task))
}
