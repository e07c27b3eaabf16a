//! Observable values and cancellation
//!
//! [`Observable`] is a publish-subscribe cell: it holds the latest value and
//! delivers every posted value, in post order, to the observers registered at
//! delivery time. Observers do not get the current value replayed on
//! subscription; read [`Observable::value`] for that.
//!
//! Posting can be split in two: [`Observable::enqueue`] while a caller still
//! holds its own lock (fixing the order), then [`Observable::flush`] after the
//! lock is released (running observers without it).

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{CallbackId, DispatchQueue, ObserverId};

/// Observer callback
pub type ObserverFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Called with `true` when the first observer subscribes and `false` when
/// the last one leaves
pub type ActivityFn = Arc<dyn Fn(bool) + Send + Sync>;

struct ObservableState<T> {
    value: Option<T>,
    observers: Vec<(ObserverId, ObserverFn<T>)>,
    next_id: u64,
}

/// Latest-value cell with ordered fan-out to observers
pub struct Observable<T> {
    state: Mutex<ObservableState<T>>,
    deliveries: DispatchQueue<T>,
    activity: Mutex<Option<ActivityFn>>,
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub fn new() -> Self {
        Observable {
            state: Mutex::new(ObservableState {
                value: None,
                observers: Vec::new(),
                next_id: 1,
            }),
            deliveries: DispatchQueue::new(),
            activity: Mutex::new(None),
        }
    }

    pub fn with_value(value: T) -> Self {
        let observable = Self::new();
        observable.state.lock().value = Some(value);
        observable
    }

    /// Latest posted value, `None` until the first post
    pub fn value(&self) -> Option<T> {
        self.state.lock().value.clone()
    }

    /// Register an observer
    pub fn observe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> ObserverId {
        let (id, first) = {
            let mut state = self.state.lock();
            let id = ObserverId(state.next_id);
            state.next_id += 1;
            state.observers.push((id, Arc::new(observer)));
            (id, state.observers.len() == 1)
        };
        if first {
            self.notify_activity(true);
        }
        id
    }

    /// Remove an observer; returns false if it was not registered
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let (removed, last) = {
            let mut state = self.state.lock();
            let before = state.observers.len();
            state.observers.retain(|(oid, _)| *oid != id);
            let removed = state.observers.len() != before;
            (removed, removed && state.observers.is_empty())
        };
        if last {
            self.notify_activity(false);
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn has_observers(&self) -> bool {
        self.observer_count() > 0
    }

    /// Install the activity listener (replaces any previous one)
    pub fn on_activity(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        *self.activity.lock() = Some(Arc::new(listener));
    }

    /// Store `value` and queue it for delivery without running observers
    pub fn enqueue(&self, value: T) {
        self.state.lock().value = Some(value.clone());
        self.deliveries.push(value);
    }

    /// Deliver queued values unless another thread is already delivering
    pub fn flush(&self) {
        self.deliveries.drain(|value| {
            let observers: Vec<ObserverFn<T>> = self
                .state
                .lock()
                .observers
                .iter()
                .map(|(_, o)| o.clone())
                .collect();
            for observer in &observers {
                observer(&value);
            }
        });
    }

    /// Store and deliver
    pub fn post(&self, value: T) {
        self.enqueue(value);
        self.flush();
    }

    fn notify_activity(&self, active: bool) {
        let listener = self.activity.lock().clone();
        if let Some(listener) = listener {
            listener(active);
        }
    }
}

impl<T: Clone + Send + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Observable")
            .field("value", &state.value)
            .field("observers", &state.observers.len())
            .finish()
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CancellationState {
    cancelled: bool,
    callbacks: Vec<(CallbackId, CancelFn)>,
    next_id: u64,
}

/// One-shot cancellation signal with cleanup callbacks
#[derive(Default)]
pub struct Cancellation {
    state: Mutex<CancellationState>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Register cleanup to run on cancel. Runs right away (and returns
    /// `None`) if already cancelled.
    pub fn on_cancelled(&self, callback: impl FnOnce() + Send + 'static) -> Option<CallbackId> {
        let mut state = self.state.lock();
        if state.cancelled {
            drop(state);
            callback();
            return None;
        }
        state.next_id += 1;
        let id = CallbackId(state.next_id);
        state.callbacks.push((id, Box::new(callback)));
        Some(id)
    }

    pub fn remove_callback(&self, id: CallbackId) {
        self.state.lock().callbacks.retain(|(cid, _)| *cid != id);
    }

    /// Cancel and run all registered callbacks in registration order
    pub fn cancel(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };
        for (_, callback) in callbacks {
            callback();
        }
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Cancellation")
            .field("cancelled", &state.cancelled)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_post_reaches_observers_in_order() {
        let observable = Observable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        observable.observe(move |v: &u32| s.lock().push(*v));
        observable.post(1);
        observable.post(2);

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(observable.value(), Some(2));
    }

    #[test]
    fn test_no_replay_on_subscribe() {
        let observable = Observable::with_value(7u32);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        observable.observe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(observable.value(), Some(7));
    }

    #[test]
    fn test_activity_transitions() {
        let observable: Observable<u32> = Observable::new();
        let transitions = Arc::new(Mutex::new(Vec::new()));

        let t = transitions.clone();
        observable.on_activity(move |active| t.lock().push(active));

        let a = observable.observe(|_| {});
        let b = observable.observe(|_| {});
        assert!(observable.remove_observer(a));
        assert!(!observable.remove_observer(a));
        assert!(observable.remove_observer(b));

        assert_eq!(*transitions.lock(), vec![true, false]);
        assert!(!observable.has_observers());
    }

    #[test]
    fn test_enqueue_defers_delivery() {
        let observable = Observable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        observable.observe(move |v: &&str| s.lock().push(*v));
        observable.enqueue("a");
        assert!(seen.lock().is_empty());
        assert_eq!(observable.value(), Some("a"));

        observable.flush();
        assert_eq!(*seen.lock(), vec!["a"]);
    }

    #[test]
    fn test_observer_posting_is_delivered_after_current_value() {
        let observable = Arc::new(Observable::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let o = observable.clone();
        let s = seen.clone();
        observable.observe(move |v: &u32| {
            s.lock().push(*v);
            if *v == 1 {
                o.post(2);
                s.lock().push(100);
            }
        });
        observable.post(1);

        assert_eq!(*seen.lock(), vec![1, 100, 2]);
    }

    #[test]
    fn test_cancellation_runs_callbacks_once() {
        let cancellation = Cancellation::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = runs.clone();
        cancellation.on_cancelled(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let r = runs.clone();
        let removed = cancellation
            .on_cancelled(move || {
                r.fetch_add(10, Ordering::SeqCst);
            })
            .unwrap();
        cancellation.remove_callback(removed);

        cancellation.cancel();
        cancellation.cancel();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(cancellation.is_cancelled());

        // Late registration runs immediately
        let r = runs.clone();
        assert!(cancellation
            .on_cancelled(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .is_none());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
