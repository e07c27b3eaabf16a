//! Scanner facade
//!
//! [`Scanner`] is what applications hold. It owns the signals, feeds them
//! and the caller's intent into the [`Controller`], and fans plausible
//! sightings out to registered callbacks while the status is `Scanning`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use blescan_core::{
    Observable, ObserverId, ScanEvent, ScanFilter, ScanIntent, ScanSettings, ScanStatus,
    ScannerError, ScannerResult, NO_ERROR,
};
use blescan_time::Timeline;

use crate::{
    AcquireParams, Controller, DelayedScanner, HardwareCheck, RateLimitConfig, RateLimiter,
    ScanDriver, ScanSequencer, ScanSink, Signal, DEFAULT_STOP_DELAY,
};

/// Consumer of plausible sightings
pub trait ScanResultCallback: Send + Sync {
    fn on_scan_result(&self, event: &ScanEvent);
}

impl<F> ScanResultCallback for F
where
    F: Fn(&ScanEvent) + Send + Sync,
{
    fn on_scan_result(&self, event: &ScanEvent) {
        self(event)
    }
}

/// Anything that produces sightings and a status stream
pub trait ScanSource: Send + Sync {
    /// Register a callback; registering the same one twice has no effect
    fn add_callback(&self, callback: Arc<dyn ScanResultCallback>);

    fn remove_callback(&self, callback: &Arc<dyn ScanResultCallback>);

    fn status(&self) -> Arc<Observable<ScanStatus>>;
}

/// Scanner configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannerConfig {
    pub settings: ScanSettings,
    /// Driver side filters, empty for all devices
    pub filters: Vec<ScanFilter>,
    /// `None` disables throttling
    pub rate_limit: Option<RateLimitConfig>,
    /// Baseline delay before a graceful release
    pub stop_delay: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            settings: ScanSettings::default(),
            filters: Vec::new(),
            rate_limit: Some(RateLimitConfig::default()),
            stop_delay: DEFAULT_STOP_DELAY,
        }
    }
}

impl ScannerConfig {
    /// For stacks that do not throttle scan starts
    pub fn unthrottled() -> Self {
        ScannerConfig {
            rate_limit: None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ScannerResult<()> {
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if self.stop_delay > Duration::from_secs(3_600) {
            return Err(ScannerError::InvalidConfig(
                "stop_delay above one hour".into(),
            ));
        }
        Ok(())
    }
}

type Callbacks = Arc<Mutex<Vec<Arc<dyn ScanResultCallback>>>>;

/// Driver output handler
struct EventSink {
    controller: Arc<Controller>,
    callbacks: Callbacks,
}

impl ScanSink for EventSink {
    fn on_scan_result(&self, event: ScanEvent) {
        if !event.is_plausible() {
            return;
        }

        // Sightings prove the radio works
        self.controller.report_error(NO_ERROR);

        if !self.controller.current_status().is_scanning() {
            return;
        }
        let callbacks = self.callbacks.lock().clone();
        for callback in &callbacks {
            callback.on_scan_result(&event);
        }
    }

    fn on_scan_failed(&self, error_code: i32) {
        debug!(error_code, "scan failed");
        self.controller.report_error(error_code);
    }
}

struct ScannerInner {
    controller: Arc<Controller>,
    sequencer: Arc<DelayedScanner>,
    hardware: Arc<Signal>,
    environment: Arc<Signal>,
    permission: Arc<Signal>,
    intent: Mutex<Option<ScanIntent>>,
    callbacks: Callbacks,
    signal_observers: Mutex<Vec<(Arc<Signal>, ObserverId)>>,
}

impl ScannerInner {
    fn reconcile(&self) {
        let intent = *self.intent.lock();
        self.controller.update(
            self.hardware.value(),
            self.environment.value(),
            self.permission.value(),
            intent,
        );
    }

    fn request(&self, intent: ScanIntent) {
        *self.intent.lock() = Some(intent);
        self.reconcile();
    }
}

/// Rate limited, state reconciled scanner
#[derive(Clone)]
pub struct Scanner {
    inner: Arc<ScannerInner>,
}

impl Scanner {
    pub fn builder(driver: Arc<dyn ScanDriver>, timeline: Arc<dyn Timeline>) -> ScannerBuilder {
        ScannerBuilder::new(driver, timeline)
    }

    /// Ask for scanning
    pub fn start(&self) {
        debug!("requesting to start scanner");
        self.inner.request(ScanIntent::Scan);
    }

    /// Ask to stop after the release delay
    pub fn stop_delayed(&self) {
        debug!("requesting to stop scanner delayed");
        self.inner.request(ScanIntent::StopDelayed);
    }

    /// Ask to stop right away
    pub fn stop_now(&self) {
        debug!("requesting to stop scanner now");
        self.inner.request(ScanIntent::StopNow);
    }

    /// Current status
    pub fn current_status(&self) -> ScanStatus {
        self.inner.controller.current_status()
    }

    /// Whether the driver is currently acquired
    pub fn is_acquired(&self) -> bool {
        self.inner.sequencer.is_started()
    }

    pub fn hardware(&self) -> &Arc<Signal> {
        &self.inner.hardware
    }

    pub fn environment(&self) -> &Arc<Signal> {
        &self.inner.environment
    }

    pub fn permission(&self) -> &Arc<Signal> {
        &self.inner.permission
    }

    /// Stop the signal lifecycles and release the driver now
    pub fn shutdown(&self) {
        info!("scanner shutting down");
        let observers = std::mem::take(&mut *self.inner.signal_observers.lock());
        for (signal, id) in observers {
            signal.remove_observer(id);
            signal.stop();
        }
        self.inner.request(ScanIntent::StopNow);
        self.inner.sequencer.stop(Duration::ZERO);
    }
}

impl ScanSource for Scanner {
    fn add_callback(&self, callback: Arc<dyn ScanResultCallback>) {
        let mut callbacks = self.inner.callbacks.lock();
        if callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            return;
        }
        callbacks.push(callback);
    }

    fn remove_callback(&self, callback: &Arc<dyn ScanResultCallback>) {
        self.inner
            .callbacks
            .lock()
            .retain(|c| !Arc::ptr_eq(c, callback));
    }

    fn status(&self) -> Arc<Observable<ScanStatus>> {
        self.inner.controller.status()
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("status", &self.current_status())
            .field("acquired", &self.is_acquired())
            .field("callbacks", &self.inner.callbacks.lock().len())
            .finish()
    }
}

/// Builder for [`Scanner`]
pub struct ScannerBuilder {
    driver: Arc<dyn ScanDriver>,
    timeline: Arc<dyn Timeline>,
    config: ScannerConfig,
    hardware: Option<Arc<Signal>>,
    environment: Option<Arc<Signal>>,
    permission: Option<Arc<Signal>>,
    hardware_check: Option<HardwareCheck>,
}

impl ScannerBuilder {
    pub fn new(driver: Arc<dyn ScanDriver>, timeline: Arc<dyn Timeline>) -> Self {
        ScannerBuilder {
            driver,
            timeline,
            config: ScannerConfig::default(),
            hardware: None,
            environment: None,
            permission: None,
            hardware_check: None,
        }
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(mut self, settings: ScanSettings) -> Self {
        self.config.settings = settings;
        self
    }

    pub fn filters(mut self, filters: Vec<ScanFilter>) -> Self {
        self.config.filters = filters;
        self
    }

    /// Hardware enabled signal (default: manual, on)
    pub fn hardware(mut self, signal: Arc<Signal>) -> Self {
        self.hardware = Some(signal);
        self
    }

    /// Environment enabled signal (default: manual, on)
    pub fn environment(mut self, signal: Arc<Signal>) -> Self {
        self.environment = Some(signal);
        self
    }

    /// Permission granted signal (default: manual, granted)
    pub fn permission(mut self, signal: Arc<Signal>) -> Self {
        self.permission = Some(signal);
        self
    }

    /// Checked right before every real acquisition.
    /// Defaults to the hardware signal reading `true`.
    pub fn hardware_check(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.hardware_check = Some(Arc::new(check));
        self
    }

    pub fn build(self) -> ScannerResult<Scanner> {
        self.config.validate()?;

        let limiter = self
            .config
            .rate_limit
            .clone()
            .map(RateLimiter::new)
            .transpose()?
            .map(Arc::new);

        let hardware = self
            .hardware
            .unwrap_or_else(|| Signal::manual_with("hardware", true));
        let environment = self
            .environment
            .unwrap_or_else(|| Signal::manual_with("environment", true));
        let permission = self
            .permission
            .unwrap_or_else(|| Signal::manual_with("permission", true));

        let hardware_check = self.hardware_check.unwrap_or_else(|| {
            let hardware = hardware.clone();
            Arc::new(move || hardware.value() == Some(true))
        });

        let sequencer = Arc::new(DelayedScanner::new(
            self.driver,
            self.timeline.clone(),
            hardware_check,
            AcquireParams {
                filters: self.config.filters,
                settings: self.config.settings,
                limiter: limiter.clone(),
            },
        ));
        let controller = Arc::new(
            Controller::new(sequencer.clone(), limiter, self.timeline)
                .with_stop_delay(self.config.stop_delay),
        );

        let callbacks: Callbacks = Arc::new(Mutex::new(Vec::new()));
        sequencer.set_sink(Arc::new(EventSink {
            controller: controller.clone(),
            callbacks: callbacks.clone(),
        }));

        let inner = Arc::new(ScannerInner {
            controller,
            sequencer,
            hardware,
            environment,
            permission,
            intent: Mutex::new(None),
            callbacks,
            signal_observers: Mutex::new(Vec::new()),
        });

        for signal in [&inner.hardware, &inner.environment, &inner.permission] {
            let weak = Arc::downgrade(&inner);
            let id = signal.observe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.reconcile();
                }
            });
            inner.signal_observers.lock().push((signal.clone(), id));
            signal.start();
        }

        Ok(Scanner { inner })
    }
}
