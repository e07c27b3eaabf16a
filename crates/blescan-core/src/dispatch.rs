//! Serial dispatch queue
//!
//! Items submitted from any thread are handled one at a time, in submission
//! order, by whichever thread finds the queue idle. A handler that submits
//! more work (directly or through callbacks) only enqueues it; the draining
//! thread picks it up after the current item. No thread ever blocks waiting
//! for another thread's handler.
//!
//! A deferred item runs under the draining thread's handler, so every
//! submitter of one queue must pass an equivalent handler.

use std::collections::VecDeque;

use parking_lot::Mutex;

struct DispatchState<T> {
    items: VecDeque<T>,
    draining: bool,
}

/// FIFO queue drained by at most one thread at a time
pub struct DispatchQueue<T> {
    state: Mutex<DispatchState<T>>,
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        DispatchQueue {
            state: Mutex::new(DispatchState {
                items: VecDeque::new(),
                draining: false,
            }),
        }
    }

    /// Enqueue without draining
    pub fn push(&self, item: T) {
        self.state.lock().items.push_back(item);
    }

    /// Drain pending items unless another thread is already draining.
    /// Returns the number of items this call handled.
    pub fn drain(&self, mut handle: impl FnMut(T)) -> usize {
        let mut handled = 0;
        loop {
            let item = {
                let mut state = self.state.lock();
                if state.draining {
                    return handled;
                }
                match state.items.pop_front() {
                    Some(item) => {
                        state.draining = true;
                        item
                    }
                    None => return handled,
                }
            };

            let guard = DrainGuard { queue: self };
            handle(item);
            drop(guard);
            handled += 1;
        }
    }

    /// Enqueue then drain
    pub fn submit(&self, item: T, handle: impl FnMut(T)) -> usize {
        self.push(item);
        self.drain(handle)
    }

    pub fn pending(&self) -> usize {
        self.state.lock().items.len()
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the draining flag even if the handler panics
struct DrainGuard<'a, T> {
    queue: &'a DispatchQueue<T>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.state.lock().draining = false;
    }
}
