//! Start/stop gate
//!
//! Driver start and stop calls are not idempotent. The gate makes sure that
//! of any number of racing `start` calls exactly one runs its action, and
//! the same for `stop`.

use std::sync::atomic::{AtomicBool, Ordering};

/// Atomic started/stopped flag guarding a side effect
#[derive(Debug, Default)]
pub struct StartStop {
    started: AtomicBool,
}

impl StartStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Run `action` if this call flips the gate to started.
    /// Returns whether it ran.
    pub fn start(&self, action: impl FnOnce()) -> bool {
        let flipped = self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if flipped {
            action();
        }
        flipped
    }

    /// Run `action` if this call flips the gate to stopped
    pub fn stop(&self, action: impl FnOnce()) -> bool {
        let flipped = self
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if flipped {
            action();
        }
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_redundant_calls_are_collapsed() {
        let gate = StartStop::new();
        let mut calls = Vec::new();

        assert!(!gate.stop(|| calls.push("stop")));
        assert!(gate.start(|| calls.push("start")));
        assert!(!gate.start(|| calls.push("start")));
        assert!(gate.is_started());
        assert!(gate.stop(|| calls.push("stop")));
        assert!(!gate.stop(|| calls.push("stop")));

        assert_eq!(calls, vec!["start", "stop"]);
        assert!(!gate.is_started());
    }

    #[test]
    fn test_only_one_concurrent_start_executes() {
        let gate = Arc::new(StartStop::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(100));

        let threads: Vec<_> = (0..100)
            .map(|_| {
                let gate = gate.clone();
                let executed = executed.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    gate.start(|| {
                        executed.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }
}
