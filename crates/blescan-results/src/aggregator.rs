//! Streaming result aggregation
//!
//! [`ResultAggregator`] listens to a [`ScanSource`] and keeps the latest
//! sighting of every device with a smoothed RSSI. Observers get a snapshot
//! sorted strongest first, at most once per debounce interval. Devices not
//! seen for `timeout` are evicted; a disqualifying scanner status clears
//! everything at once.
//!
//! While nobody observes, sightings still update the registry but nothing
//! is published and no eviction timer runs. The first observer triggers an
//! eviction pass with the longer `on_active_timeout` and an immediate
//! publish, empty if nothing is held.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use blescan_core::{
    Cancellation, DeviceAddress, Observable, ObserverId, ScanEvent, ScanFilter, ScanStatus,
    ScanTime, ScannerError, ScannerResult,
};
use blescan_scanner::{ScanResultCallback, ScanSource};
use blescan_time::{schedule_fn, TaskHandle, Timeline};

use crate::{Smoother, SmootherFactory};

/// Aggregator configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Devices not seen for this long are dropped
    pub timeout: Duration,
    /// Eviction threshold applied when the first observer arrives
    pub on_active_timeout: Duration,
    /// Minimum spacing between publishes while observed
    pub debounce: Duration,
    /// Added to `timeout` when scheduling the eviction timer
    pub eviction_margin: Duration,
    /// Publish on every sighting even without observers
    pub publish_when_unobserved: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            timeout: Duration::from_millis(7_000),
            on_active_timeout: Duration::from_millis(14_000),
            debounce: Duration::from_millis(1_173),
            eviction_margin: Duration::from_millis(10),
            publish_when_unobserved: false,
        }
    }
}

impl AggregatorConfig {
    /// Faster turnover for short lived, interactive screens
    pub fn responsive() -> Self {
        AggregatorConfig {
            timeout: Duration::from_millis(3_000),
            on_active_timeout: Duration::from_millis(6_000),
            debounce: Duration::from_millis(250),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ScannerResult<()> {
        if self.timeout.is_zero() {
            return Err(ScannerError::InvalidConfig("timeout must be non-zero".into()));
        }
        if self.on_active_timeout < self.timeout {
            return Err(ScannerError::InvalidConfig(
                "on_active_timeout shorter than timeout".into(),
            ));
        }
        Ok(())
    }
}

/// One entry of a published snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct SeenDevice {
    /// Latest sighting
    pub event: ScanEvent,
    /// RSSI after smoothing (raw RSSI without a smoother)
    pub smoothed_rssi: f32,
}

impl SeenDevice {
    pub fn address(&self) -> Option<&DeviceAddress> {
        self.event.address.as_ref()
    }
}

struct DeviceRecord {
    latest: SeenDevice,
    /// Arrival time on the aggregator's timeline
    seen_at: ScanTime,
    smoother: Option<Box<dyn Smoother>>,
}

#[derive(Default)]
struct AggregatorState {
    devices: HashMap<DeviceAddress, DeviceRecord>,
    last_publish: Option<ScanTime>,
    eviction: Option<TaskHandle>,
    callback: Option<Arc<dyn ScanResultCallback>>,
    status_observer: Option<ObserverId>,
    closed: bool,
}

/// Deduplicating, smoothing, evicting view over a scan source
pub struct ResultAggregator {
    config: AggregatorConfig,
    filters: Vec<ScanFilter>,
    smoother_factory: Option<SmootherFactory>,
    timeline: Arc<dyn Timeline>,
    source: Arc<dyn ScanSource>,
    status: Arc<Observable<ScanStatus>>,
    state: Mutex<AggregatorState>,
    output: Observable<Vec<SeenDevice>>,
    this: Weak<ResultAggregator>,
}

impl ResultAggregator {
    pub fn builder(source: Arc<dyn ScanSource>) -> AggregatorBuilder {
        AggregatorBuilder::new(source)
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Subscribe to snapshots
    pub fn observe(&self, observer: impl Fn(&Vec<SeenDevice>) + Send + Sync + 'static) -> ObserverId {
        self.output.observe(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.output.remove_observer(id)
    }

    pub fn has_observers(&self) -> bool {
        self.output.has_observers()
    }

    /// Last published snapshot
    pub fn value(&self) -> Option<Vec<SeenDevice>> {
        self.output.value()
    }

    /// Devices currently held, published or not
    pub fn len(&self) -> usize {
        self.state.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Detach from the source and stop the eviction timer
    pub fn close(&self) {
        let (callback, status_observer) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            if let Some(task) = state.eviction.take() {
                self.timeline.cancel(task);
            }
            (state.callback.take(), state.status_observer.take())
        };

        if let Some(callback) = callback {
            self.source.remove_callback(&callback);
        }
        if let Some(id) = status_observer {
            self.status.remove_observer(id);
        }
        debug!("aggregator closed");
    }

    fn on_event(&self, event: &ScanEvent) {
        if !event.is_plausible() {
            return;
        }
        if !self.filters.is_empty() && !self.filters.iter().any(|f| f.matches(event)) {
            return;
        }
        let Some(address) = event.address.clone() else {
            return;
        };

        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            self.cancel_eviction(&mut state);

            let now = self.timeline.now();
            let raw = event.rssi as f32;
            let mut smoother = state
                .devices
                .remove(&address)
                .and_then(|record| record.smoother)
                .or_else(|| self.smoother_factory.as_ref().map(|factory| factory()));
            let smoothed_rssi = smoother.as_mut().map_or(raw, |s| s.smooth(raw));

            state.devices.insert(
                address,
                DeviceRecord {
                    latest: SeenDevice {
                        event: event.clone(),
                        smoothed_rssi,
                    },
                    seen_at: now,
                    smoother,
                },
            );

            self.evict(&mut state, now, self.config.timeout);
            self.publish(&mut state, now);
            self.schedule_eviction(&mut state);
        }
        self.output.flush();
    }

    fn on_status(&self, status: ScanStatus) {
        if !status.is_disqualifying() {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            debug!(%status, devices = state.devices.len(), "clearing all devices");
            state.devices.clear();
            self.cancel_eviction(&mut state);
            let now = self.timeline.now();
            self.publish_now(&mut state, now);
        }
        self.output.flush();
    }

    fn on_activity(&self, active: bool) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            if active {
                let now = self.timeline.now();
                self.evict(&mut state, now, self.config.on_active_timeout);
                self.publish_now(&mut state, now);
                if state.devices.is_empty() {
                    // Nothing to hold back: the first sighting goes out at once
                    state.last_publish = None;
                }
                self.schedule_eviction(&mut state);
            } else {
                self.cancel_eviction(&mut state);
                state.last_publish = None;
            }
        }
        self.output.flush();
    }

    fn on_eviction_timer(&self) {
        {
            let mut state = self.state.lock();
            state.eviction = None;
            if state.closed {
                return;
            }
            let now = self.timeline.now();
            if self.evict(&mut state, now, self.config.timeout) > 0 {
                if self.output.has_observers() {
                    self.publish(&mut state, now);
                } else {
                    self.publish_now(&mut state, now);
                }
            }
            self.schedule_eviction(&mut state);
        }
        self.output.flush();
    }

    /// Drop devices not seen within `timeout`; returns how many were dropped
    fn evict(&self, state: &mut AggregatorState, now: ScanTime, timeout: Duration) -> usize {
        let before = state.devices.len();
        state
            .devices
            .retain(|_, record| now - record.seen_at <= timeout);
        before - state.devices.len()
    }

    /// Publish unless debounced (or unobserved)
    fn publish(&self, state: &mut AggregatorState, now: ScanTime) {
        if !self.output.has_observers() {
            if self.config.publish_when_unobserved {
                self.publish_now(state, now);
            }
            return;
        }
        if let Some(last) = state.last_publish {
            if now - last < self.config.debounce {
                return;
            }
        }
        self.publish_now(state, now);
    }

    fn publish_now(&self, state: &mut AggregatorState, now: ScanTime) {
        state.last_publish = Some(now);

        let mut snapshot: Vec<SeenDevice> = state
            .devices
            .values()
            .map(|record| record.latest.clone())
            .collect();
        snapshot.sort_by(|a, b| {
            b.smoothed_rssi
                .total_cmp(&a.smoothed_rssi)
                .then_with(|| a.event.address.cmp(&b.event.address))
        });

        debug!(devices = snapshot.len(), "posting scan results");
        self.output.enqueue(snapshot);
    }

    fn cancel_eviction(&self, state: &mut AggregatorState) {
        if let Some(task) = state.eviction.take() {
            self.timeline.cancel(task);
        }
    }

    fn schedule_eviction(&self, state: &mut AggregatorState) {
        self.cancel_eviction(state);
        if !self.output.has_observers() || state.devices.is_empty() {
            return;
        }
        let this = self.this.clone();
        let delay = self.config.timeout + self.config.eviction_margin;
        let task = schedule_fn(self.timeline.as_ref(), delay, move || {
            if let Some(aggregator) = this.upgrade() {
                aggregator.on_eviction_timer();
            }
        });
        state.eviction = Some(task);
    }
}

impl Drop for ResultAggregator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResultAggregator")
            .field("devices", &state.devices.len())
            .field("last_publish", &state.last_publish)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Registered with the source; holds the aggregator weakly
struct SourceCallback {
    aggregator: Weak<ResultAggregator>,
}

impl ScanResultCallback for SourceCallback {
    fn on_scan_result(&self, event: &ScanEvent) {
        if let Some(aggregator) = self.aggregator.upgrade() {
            aggregator.on_event(event);
        }
    }
}

/// Builder for [`ResultAggregator`]
pub struct AggregatorBuilder {
    source: Arc<dyn ScanSource>,
    config: AggregatorConfig,
    filters: Vec<ScanFilter>,
    smoother_factory: Option<SmootherFactory>,
    timeline: Option<Arc<dyn Timeline>>,
    cancellation: Option<Arc<Cancellation>>,
}

impl AggregatorBuilder {
    pub fn new(source: Arc<dyn ScanSource>) -> Self {
        AggregatorBuilder {
            source,
            config: AggregatorConfig::default(),
            filters: Vec::new(),
            smoother_factory: None,
            timeline: None,
            cancellation: None,
        }
    }

    pub fn config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn on_active_timeout(mut self, timeout: Duration) -> Self {
        self.config.on_active_timeout = timeout;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    /// Only keep devices matching at least one filter
    pub fn filters(mut self, filters: Vec<ScanFilter>) -> Self {
        self.filters = filters;
        self
    }

    /// Per-device RSSI smoothing; without it the raw RSSI is reported
    pub fn smoother(mut self, factory: SmootherFactory) -> Self {
        self.smoother_factory = Some(factory);
        self
    }

    /// Timeline for eviction timers (ideally the scanner's)
    pub fn timeline(mut self, timeline: Arc<dyn Timeline>) -> Self {
        self.timeline = Some(timeline);
        self
    }

    /// Closes the aggregator when cancelled
    pub fn cancellation(mut self, cancellation: Arc<Cancellation>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn build(self) -> ScannerResult<Arc<ResultAggregator>> {
        self.config.validate()?;
        let timeline = self
            .timeline
            .ok_or(ScannerError::MissingComponent("timeline"))?;
        let status = self.source.status();

        let aggregator = Arc::new_cyclic(|this| ResultAggregator {
            config: self.config,
            filters: self.filters,
            smoother_factory: self.smoother_factory,
            timeline,
            source: self.source,
            status: status.clone(),
            state: Mutex::new(AggregatorState::default()),
            output: Observable::new(),
            this: this.clone(),
        });

        let weak = Arc::downgrade(&aggregator);
        aggregator.output.on_activity(move |active| {
            if let Some(aggregator) = weak.upgrade() {
                aggregator.on_activity(active);
            }
        });

        let callback: Arc<dyn ScanResultCallback> = Arc::new(SourceCallback {
            aggregator: Arc::downgrade(&aggregator),
        });
        aggregator.source.add_callback(callback.clone());

        let weak = Arc::downgrade(&aggregator);
        let status_observer = status.observe(move |status| {
            if let Some(aggregator) = weak.upgrade() {
                aggregator.on_status(*status);
            }
        });

        {
            let mut state = aggregator.state.lock();
            state.callback = Some(callback);
            state.status_observer = Some(status_observer);
        }

        if let Some(cancellation) = self.cancellation {
            let weak = Arc::downgrade(&aggregator);
            cancellation.on_cancelled(move || {
                if let Some(aggregator) = weak.upgrade() {
                    aggregator.close();
                }
            });
        }

        Ok(aggregator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use blescan_core::IdleReason;
    use blescan_time::ManualTimeline;

    use crate::ConstantFilter;

    const DEBOUNCE: u64 = 1_000;
    const TIMEOUT: u64 = 7_000;
    const ON_ACTIVE_TIMEOUT: u64 = 14_000;

    /// Scan source a test can push events and statuses into
    struct FakeSource {
        callbacks: Mutex<Vec<Arc<dyn ScanResultCallback>>>,
        status: Arc<Observable<ScanStatus>>,
    }

    impl FakeSource {
        fn new() -> Arc<Self> {
            Arc::new(FakeSource {
                callbacks: Mutex::new(Vec::new()),
                status: Arc::new(Observable::new()),
            })
        }

        fn send(&self, event: ScanEvent) {
            let callbacks = self.callbacks.lock().clone();
            for callback in callbacks {
                callback.on_scan_result(&event);
            }
        }
    }

    impl ScanSource for FakeSource {
        fn add_callback(&self, callback: Arc<dyn ScanResultCallback>) {
            self.callbacks.lock().push(callback);
        }

        fn remove_callback(&self, callback: &Arc<dyn ScanResultCallback>) {
            self.callbacks.lock().retain(|c| !Arc::ptr_eq(c, callback));
        }

        fn status(&self) -> Arc<Observable<ScanStatus>> {
            self.status.clone()
        }
    }

    struct Fixture {
        source: Arc<FakeSource>,
        timeline: Arc<ManualTimeline>,
        cancellation: Arc<Cancellation>,
        tested: Arc<ResultAggregator>,
        posts: Arc<Mutex<Vec<Vec<SeenDevice>>>>,
    }

    impl Fixture {
        fn send(&self, address: &str, rssi: i32) {
            self.source
                .send(ScanEvent::new(address, rssi, self.timeline.now()));
        }

        fn set_time(&self, ms: u64) {
            self.timeline.advance_to(ScanTime::from_millis(ms as i64));
        }

        /// Observe the aggregator, returning the observer id
        fn set_active(&self) -> ObserverId {
            let posts = self.posts.clone();
            self.tested.observe(move |v| posts.lock().push(v.clone()))
        }

        fn last(&self) -> Vec<SeenDevice> {
            self.tested.value().unwrap_or_default()
        }

        fn addresses(&self) -> Vec<String> {
            self.last()
                .iter()
                .filter_map(|d| d.address().map(|a| a.to_string()))
                .collect()
        }
    }

    fn fixture() -> Fixture {
        let source = FakeSource::new();
        let timeline = Arc::new(ManualTimeline::starting_at(ScanTime::from_millis(1_000)));
        let cancellation = Arc::new(Cancellation::new());
        let tested = ResultAggregator::builder(source.clone())
            .debounce(Duration::from_millis(DEBOUNCE))
            .on_active_timeout(Duration::from_millis(ON_ACTIVE_TIMEOUT))
            .timeout(Duration::from_millis(TIMEOUT))
            .cancellation(cancellation.clone())
            .timeline(timeline.clone())
            .smoother(ConstantFilter::factory(2.0))
            .build()
            .unwrap();

        Fixture {
            source,
            timeline,
            cancellation,
            tested,
            posts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[test]
    fn test_build_registers_callback_and_status_observer() {
        let f = fixture();
        assert_eq!(f.source.callbacks.lock().len(), 1);
        assert!(f.source.status.has_observers());
    }

    #[test]
    fn test_build_requires_timeline() {
        let result = ResultAggregator::builder(FakeSource::new()).build();
        assert!(matches!(
            result,
            Err(ScannerError::MissingComponent("timeline"))
        ));
    }

    #[test]
    fn test_cancel_removes_callback_and_status_observer() {
        let f = fixture();
        f.set_active();
        f.send("device-1", -50);
        assert_eq!(f.timeline.pending(), 1);

        f.cancellation.cancel();
        assert!(f.source.callbacks.lock().is_empty());
        assert!(!f.source.status.has_observers());
        assert_eq!(f.timeline.pending(), 0);
        assert!(f.tested.is_closed());

        f.send("device-2", -50);
        assert_eq!(f.tested.len(), 1);
    }

    #[test]
    fn test_several_scans_are_debounced() {
        let f = fixture();
        f.set_active();
        f.send("device-1", -51);
        assert_eq!(f.addresses(), vec!["device-1"]);

        f.set_time(1_000 + DEBOUNCE / 2);
        f.send("device-2", -52);
        f.send("device-3", -53);
        f.send("device-4", -54);
        f.send("device-1", -61);
        assert_eq!(f.addresses(), vec!["device-1"]);

        f.set_time(1_000 + DEBOUNCE + 1);
        f.send("device-1", -62);
        let last = f.last();
        assert_eq!(last.len(), 4);
        assert_eq!(last[3].address().unwrap().as_str(), "device-1");
        assert_eq!(last[3].event.rssi, -62);
    }

    #[test]
    fn test_single_sighting_is_evicted_after_timeout() {
        let f = fixture();
        f.set_active();
        f.send("device-1", -50);
        assert_eq!(f.timeline.next_deadline(), Some(ScanTime::from_millis((1_000 + TIMEOUT + 10) as i64)));

        // timer fires: device is too old, empty snapshot, nothing rescheduled
        f.set_time(1_000 + TIMEOUT + 10);
        assert!(f.last().is_empty());
        assert_eq!(f.timeline.pending(), 0);
    }

    #[test]
    fn test_each_sighting_pushes_the_timer_back() {
        let f = fixture();
        f.set_active();
        f.send("device-1", -50);
        f.set_time(1_000 + 5_000);
        f.send("device-2", -60);
        assert_eq!(f.timeline.pending(), 1);

        // the first timer was replaced
        f.set_time(1_000 + TIMEOUT + 10);
        assert_eq!(f.tested.len(), 2);

        f.set_time(1_000 + 5_000 + TIMEOUT + 10);
        assert!(f.tested.is_empty());
        assert!(f.last().is_empty());
        assert_eq!(f.timeline.pending(), 0);
    }

    #[test]
    fn test_rssi_values_are_averaged() {
        let f = fixture();
        f.set_active();
        f.send("device-1", -50);
        f.send("device-2", -150);
        assert_eq!(f.last()[0].smoothed_rssi, -50.0);

        f.send("device-1", -40);
        f.send("device-2", -140);
        f.send("device-1", -35);
        f.send("device-2", -135);
        f.send("device-1", -38);
        f.send("device-2", -138);
        f.send("device-1", -36);
        f.set_time(1_000 + DEBOUNCE + 1);
        f.send("device-2", -136);

        let last = f.last();
        assert_eq!(last[0].smoothed_rssi, -37.5);
        assert_eq!(last[1].smoothed_rssi, -137.5);
    }

    #[test]
    fn test_values_are_ordered_by_rssi() {
        let f = fixture();
        f.set_active();
        f.send("device-3", -37);
        f.send("device-2", -35);
        f.send("device-6", -87);
        f.send("device-4", -42);
        f.send("device-1", -23);
        f.set_time(1_000 + DEBOUNCE + 1);
        f.send("device-5", -55);

        assert_eq!(
            f.addresses(),
            vec!["device-1", "device-2", "device-3", "device-4", "device-5", "device-6"]
        );
    }

    #[test]
    fn test_equal_rssi_is_ordered_by_address() {
        let f = fixture();
        f.send("device-b", -40);
        f.send("device-a", -40);
        f.set_active();
        assert_eq!(f.addresses(), vec!["device-a", "device-b"]);
    }

    #[test]
    fn test_scans_while_unobserved_show_up_on_activation() {
        let f = fixture();
        f.send("device-1", -42);
        f.send("device-2", -52);
        assert!(f.tested.value().is_none());
        assert_eq!(f.timeline.pending(), 0);

        f.set_active();
        assert_eq!(f.last().len(), 2);
        assert_eq!(f.posts.lock().len(), 1);
    }

    #[test]
    fn test_scans_while_unobserved_part_two() {
        let f = fixture();
        let id = f.set_active();
        f.send("device-1", -42);
        assert!(f.tested.remove_observer(id));
        assert_eq!(f.timeline.pending(), 0);

        f.send("device-2", -52);
        f.send("device-1", -32);
        f.set_active();
        assert_eq!(f.last().len(), 2);
    }

    #[test]
    fn test_first_observer_gets_empty_snapshot() {
        let f = fixture();
        f.set_active();
        assert_eq!(*f.posts.lock(), vec![Vec::<SeenDevice>::new()]);
        assert_eq!(f.timeline.pending(), 0);

        // the empty snapshot does not debounce the first sighting
        f.set_time(1_100);
        f.send("device-1", -50);
        assert_eq!(f.addresses(), vec!["device-1"]);
        assert_eq!(f.posts.lock().len(), 2);
    }

    #[test]
    fn test_very_old_devices_are_removed_on_activation() {
        let f = fixture();
        let id = f.set_active();
        f.send("device-1", -50);
        f.tested.remove_observer(id);

        f.set_time(1_000 + ON_ACTIVE_TIMEOUT + 1);
        assert_eq!(f.last().len(), 1);
        f.set_active();
        assert!(f.last().is_empty());
    }

    #[test]
    fn test_reactivation_is_not_debounced() {
        let f = fixture();
        let id = f.set_active();
        f.send("device-1", -50);
        f.tested.remove_observer(id);

        f.set_time(1_100);
        f.set_active();
        f.set_time(1_200);
        f.send("device-2", -50);
        // activation published at 1_100, so 1_200 is debounced
        assert_eq!(f.last().len(), 1);
        assert_eq!(f.posts.lock().len(), 3);
    }

    fn assert_cleared_by(status: ScanStatus) {
        let f = fixture();
        f.set_active();
        f.send("device-1", -50);
        f.source.status.post(status);
        assert!(f.last().is_empty(), "{status} should clear");
        assert!(f.tested.is_empty());
    }

    #[test]
    fn test_disqualifying_statuses_clear_devices() {
        assert_cleared_by(ScanStatus::Idle(IdleReason::HardwareDisabled));
        assert_cleared_by(ScanStatus::Idle(IdleReason::EnvironmentDisabled));
        assert_cleared_by(ScanStatus::Idle(IdleReason::PermissionDenied));
        assert_cleared_by(ScanStatus::Error(42));
    }

    #[test]
    fn test_benign_statuses_keep_devices() {
        let f = fixture();
        f.set_active();
        f.send("device-1", -50);
        f.source.status.post(ScanStatus::Idle(IdleReason::NoIntent));
        f.source.status.post(ScanStatus::Scanning);
        assert_eq!(f.tested.len(), 1);
        // empty snapshot on activation, then the sighting
        assert_eq!(f.posts.lock().len(), 2);
    }

    #[test]
    fn test_filters_drop_unmatched_devices() {
        let source = FakeSource::new();
        let timeline = Arc::new(ManualTimeline::new());
        let tested = ResultAggregator::builder(source.clone())
            .timeline(timeline.clone())
            .filters(vec![ScanFilter::new().with_address("AA:BB:CC:DD:EE:FF")])
            .build()
            .unwrap();
        tested.observe(|_| {});

        source.send(ScanEvent::new("11:22:33:44:55:66", -40, ScanTime::ZERO));
        source.send(ScanEvent::new("AA:BB:CC:DD:EE:FF", -70, ScanTime::ZERO));

        let value = tested.value().unwrap();
        assert_eq!(value.len(), 1);
        // no smoother: raw rssi
        assert_eq!(value[0].smoothed_rssi, -70.0);
    }

    #[test]
    fn test_publish_when_unobserved() {
        let source = FakeSource::new();
        let tested = ResultAggregator::builder(source.clone())
            .config(AggregatorConfig {
                publish_when_unobserved: true,
                ..AggregatorConfig::default()
            })
            .timeline(Arc::new(ManualTimeline::new()))
            .build()
            .unwrap();

        source.send(ScanEvent::new("device-1", -40, ScanTime::ZERO));
        assert_eq!(tested.value().map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_dropping_aggregator_detaches_from_source() {
        let source = FakeSource::new();
        let tested = ResultAggregator::builder(source.clone())
            .timeline(Arc::new(ManualTimeline::new()))
            .build()
            .unwrap();
        drop(tested);

        assert!(source.callbacks.lock().is_empty());
        assert!(!source.status.has_observers());
    }
}
