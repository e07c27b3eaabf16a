//! Manually advanced timeline
//!
//! Virtual time only moves when [`ManualTimeline::advance`] is called. Due
//! tasks run in deadline order (ties in scheduling order) on the calling
//! thread, with the clock set to each task's deadline while it runs.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;

use blescan_core::ScanTime;

use crate::{Task, TaskHandle, Timeline};

struct ManualState {
    now: ScanTime,
    next_id: u64,
    queue: BTreeMap<(ScanTime, u64), Task>,
    deadlines: HashMap<u64, ScanTime>,
}

/// Deterministic virtual timeline
pub struct ManualTimeline {
    state: Mutex<ManualState>,
}

impl ManualTimeline {
    pub fn new() -> Self {
        Self::starting_at(ScanTime::ZERO)
    }

    pub fn starting_at(start: ScanTime) -> Self {
        ManualTimeline {
            state: Mutex::new(ManualState {
                now: start,
                next_id: 1,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
            }),
        }
    }

    /// Move time forward by `by`, running every task that falls due.
    /// Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        self.advance_to(target)
    }

    /// Move time forward to `target` (never backwards)
    pub fn advance_to(&self, target: ScanTime) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut state = self.state.lock();
                let due = state
                    .queue
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(at, _)| *at <= target);
                match due {
                    Some(key) => {
                        state.deadlines.remove(&key.1);
                        if key.0 > state.now {
                            state.now = key.0;
                        }
                        state.queue.remove(&key)
                    }
                    None => {
                        if target > state.now {
                            state.now = target;
                        }
                        return ran;
                    }
                }
            };
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
    }

    /// Run tasks already due without moving time
    pub fn run_due(&self) -> usize {
        self.advance(Duration::ZERO)
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Deadline of the earliest pending task
    pub fn next_deadline(&self) -> Option<ScanTime> {
        self.state.lock().queue.first_key_value().map(|((at, _), _)| *at)
    }
}

impl Default for ManualTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline for ManualTimeline {
    fn now(&self) -> ScanTime {
        self.state.lock().now
    }

    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let at = state.now + delay;
        state.queue.insert((at, id), task);
        state.deadlines.insert(id, at);
        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut state = self.state.lock();
        if let Some(at) = state.deadlines.remove(&handle.0) {
            state.queue.remove(&(at, handle.0));
        }
    }
}

impl std::fmt::Debug for ManualTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualTimeline")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<(&'static str, ScanTime)>>>, Arc<ManualTimeline>) {
        (Arc::new(Mutex::new(Vec::new())), Arc::new(ManualTimeline::new()))
    }

    #[test]
    fn test_tasks_run_in_deadline_order() {
        let (log, timeline) = recorder();

        for (name, ms) in [("late", 30u64), ("early", 10), ("tie", 10)] {
            let log = log.clone();
            let t = timeline.clone();
            timeline.schedule(
                Duration::from_millis(ms),
                Box::new(move || log.lock().push((name, t.now()))),
            );
        }

        assert_eq!(timeline.advance(Duration::from_millis(9)), 0);
        assert_eq!(timeline.advance(Duration::from_millis(25)), 3);
        assert_eq!(
            *log.lock(),
            vec![
                ("early", ScanTime::from_millis(10)),
                ("tie", ScanTime::from_millis(10)),
                ("late", ScanTime::from_millis(30)),
            ]
        );
        assert_eq!(timeline.now(), ScanTime::from_millis(34));
    }

    #[test]
    fn test_cancel_removes_task() {
        let (log, timeline) = recorder();

        let l = log.clone();
        let handle = timeline.schedule(
            Duration::from_millis(5),
            Box::new(move || l.lock().push(("x", ScanTime::ZERO))),
        );
        assert_eq!(timeline.next_deadline(), Some(ScanTime::from_millis(5)));

        timeline.cancel(handle);
        timeline.cancel(handle);
        assert_eq!(timeline.pending(), 0);
        timeline.advance(Duration::from_secs(1));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_task_scheduled_from_task_runs_in_same_advance() {
        let (log, timeline) = recorder();

        let l = log.clone();
        let t = timeline.clone();
        timeline.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                let l2 = l.clone();
                let t2 = t.clone();
                t.schedule(
                    Duration::from_millis(5),
                    Box::new(move || l2.lock().push(("nested", t2.now()))),
                );
            }),
        );

        assert_eq!(timeline.advance(Duration::from_millis(20)), 2);
        assert_eq!(*log.lock(), vec![("nested", ScanTime::from_millis(15))]);
    }

    #[test]
    fn test_zero_delay_waits_for_run_due() {
        let (log, timeline) = recorder();

        let l = log.clone();
        timeline.schedule(
            Duration::ZERO,
            Box::new(move || l.lock().push(("now", ScanTime::ZERO))),
        );
        assert!(log.lock().is_empty());
        assert_eq!(timeline.run_due(), 1);
        assert_eq!(log.lock().len(), 1);
    }
}
