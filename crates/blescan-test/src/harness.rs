//! Scenario harness
//!
//! A full scanner stack on a manual timeline: simulated driver, manual
//! hardware/environment/permission signals and, on demand, a result
//! aggregator wired to the same timeline. Tests drive it step by step and
//! inspect what the driver saw.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use blescan_core::{ScanEvent, ScanStatus, ScanTime, ScannerResult};
use blescan_results::{AggregatorConfig, ResultAggregator};
use blescan_scanner::{ScanSource, Scanner, ScannerConfig, Signal};
use blescan_time::{ManualTimeline, Timeline};

use crate::SimulatedDriver;

/// Scanner, driver and signals sharing one manual timeline
pub struct ScannerHarness {
    pub timeline: Arc<ManualTimeline>,
    pub driver: Arc<SimulatedDriver>,
    pub scanner: Scanner,
    pub hardware: Arc<Signal>,
    pub environment: Arc<Signal>,
    pub permission: Arc<Signal>,
}

impl ScannerHarness {
    /// Default configuration, everything enabled, nothing requested
    pub fn new() -> ScannerResult<Self> {
        Self::with_config(ScannerConfig::default())
    }

    pub fn with_config(config: ScannerConfig) -> ScannerResult<Self> {
        let timeline = Arc::new(ManualTimeline::new());
        let driver = Arc::new(SimulatedDriver::new(timeline.clone()));
        let hardware = Signal::manual_with("hardware", true);
        let environment = Signal::manual_with("environment", true);
        let permission = Signal::manual_with("permission", true);

        let scanner = Scanner::builder(driver.clone(), timeline.clone())
            .config(config)
            .hardware(hardware.clone())
            .environment(environment.clone())
            .permission(permission.clone())
            .build()?;

        Ok(ScannerHarness {
            timeline,
            driver,
            scanner,
            hardware,
            environment,
            permission,
        })
    }

    /// Aggregator over this scanner on the shared timeline
    pub fn aggregator(&self, config: AggregatorConfig) -> ScannerResult<Arc<ResultAggregator>> {
        ResultAggregator::builder(Arc::new(self.scanner.clone()))
            .config(config)
            .timeline(self.timeline.clone())
            .build()
    }

    pub fn now(&self) -> ScanTime {
        self.timeline.now()
    }

    /// Move time forward, running due timers; returns how many ran
    pub fn advance(&self, millis: u64) -> usize {
        self.timeline.advance(Duration::from_millis(millis))
    }

    pub fn status(&self) -> ScanStatus {
        self.scanner.current_status()
    }

    /// Sighting from the driver at the current time
    pub fn sighting(&self, address: &str, rssi: i32) -> bool {
        self.driver.sighting(address, rssi)
    }

    /// Every status published from now on
    pub fn record_statuses(&self) -> Arc<Mutex<Vec<ScanStatus>>> {
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let s = statuses.clone();
        self.scanner.status().observe(move |status| s.lock().push(*status));
        statuses
    }

    /// Every event delivered to scanner callbacks from now on
    pub fn record_events(&self) -> Arc<Mutex<Vec<ScanEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        self.scanner
            .add_callback(Arc::new(move |event: &ScanEvent| e.lock().push(event.clone())));
        events
    }
}

impl std::fmt::Debug for ScannerHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerHarness")
            .field("now", &self.timeline.now())
            .field("status", &self.scanner.current_status())
            .field("driver", &self.driver)
            .finish()
    }
}
