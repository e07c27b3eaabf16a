//! One-shot device search
//!
//! Look through an initial list of sightings first; failing that, listen to
//! the scan source until the first match. The source callback is removed as
//! soon as a match is found or the search is cancelled.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use blescan_core::{CallbackId, Cancellation, ScanEvent};
use blescan_scanner::{ScanResultCallback, ScanSource};

/// How a search ended up after it was set up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindOutcome {
    /// Matched in the initial list; the source was never touched
    FoundInitially,
    /// Listening to the source
    Listening,
    /// The cancellation had already fired
    Cancelled,
}

type FoundFn<T> = Box<dyn FnOnce(T) + Send>;

struct Search<T> {
    source: Arc<dyn ScanSource>,
    cancellation: Arc<Cancellation>,
    mapper: Box<dyn Fn(&ScanEvent) -> Option<T> + Send + Sync>,
    on_found: Mutex<Option<FoundFn<T>>>,
    registration: Mutex<Option<(Arc<dyn ScanResultCallback>, Option<CallbackId>)>>,
}

impl<T: Send + 'static> Search<T> {
    fn detach(&self) {
        let registration = self.registration.lock().take();
        if let Some((callback, cancel_id)) = registration {
            self.source.remove_callback(&callback);
            if let Some(id) = cancel_id {
                self.cancellation.remove_callback(id);
            }
        }
    }
}

struct SearchCallback<T> {
    search: Weak<Search<T>>,
}

impl<T: Send + 'static> ScanResultCallback for SearchCallback<T> {
    fn on_scan_result(&self, event: &ScanEvent) {
        let Some(search) = self.search.upgrade() else {
            return;
        };
        let Some(found) = (search.mapper)(event) else {
            return;
        };
        let Some(on_found) = search.on_found.lock().take() else {
            return;
        };
        search.detach();
        debug!(address = ?event.address, "search matched");
        on_found(found);
    }
}

/// Finds the first sighting accepted by a predicate or mapper
pub struct ScanResultFinder;

impl ScanResultFinder {
    /// Report the first event matching `predicate`
    pub fn find(
        source: Arc<dyn ScanSource>,
        cancellation: Arc<Cancellation>,
        initial: &[ScanEvent],
        predicate: impl Fn(&ScanEvent) -> bool + Send + Sync + 'static,
        on_found: impl FnOnce(ScanEvent) + Send + 'static,
    ) -> FindOutcome {
        Self::find_map(
            source,
            cancellation,
            initial,
            move |event| predicate(event).then(|| event.clone()),
            on_found,
        )
    }

    /// Report the first non-`None` result of `mapper`
    pub fn find_map<T: Send + 'static>(
        source: Arc<dyn ScanSource>,
        cancellation: Arc<Cancellation>,
        initial: &[ScanEvent],
        mapper: impl Fn(&ScanEvent) -> Option<T> + Send + Sync + 'static,
        on_found: impl FnOnce(T) + Send + 'static,
    ) -> FindOutcome {
        if cancellation.is_cancelled() {
            return FindOutcome::Cancelled;
        }
        if let Some(found) = initial.iter().find_map(&mapper) {
            on_found(found);
            return FindOutcome::FoundInitially;
        }

        let search = Arc::new(Search {
            source: source.clone(),
            cancellation: cancellation.clone(),
            mapper: Box::new(mapper),
            on_found: Mutex::new(Some(Box::new(on_found) as FoundFn<T>)),
            registration: Mutex::new(None),
        });
        let callback: Arc<dyn ScanResultCallback> = Arc::new(SearchCallback {
            search: Arc::downgrade(&search),
        });

        // The source keeps the search alive through this closure until detach
        let keep = search.clone();
        let cancel_id = cancellation.on_cancelled(move || keep.detach());
        *search.registration.lock() = Some((callback.clone(), cancel_id));
        if cancel_id.is_none() {
            // cancelled while setting up
            search.detach();
            return FindOutcome::Cancelled;
        }
        source.add_callback(callback.clone());
        if cancellation.is_cancelled() {
            // cancel ran before the callback was in place
            source.remove_callback(&callback);
            search.detach();
            return FindOutcome::Cancelled;
        }
        FindOutcome::Listening
    }
}
