//! Simulated scan driver
//!
//! Stands in for the platform radio:
//! - Records every acquire and release with its timeline position
//! - Delivers sightings and failures to whichever sink holds the resource
//! - Applies the acquisition filters the way a driver would
//! - Generates noisy advertisements from a field of beacons

use std::sync::Arc;

use parking_lot::Mutex;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use blescan_core::{DeviceAddress, ScanEvent, ScanFilter, ScanSettings, ScanTime};
use blescan_scanner::{ScanDriver, ScanSink};
use blescan_time::Timeline;

#[derive(Default)]
struct DriverState {
    sink: Option<Arc<dyn ScanSink>>,
    filters: Vec<ScanFilter>,
    settings: Option<ScanSettings>,
    acquisitions: Vec<ScanTime>,
    releases: Vec<ScanTime>,
}

/// In-memory radio
pub struct SimulatedDriver {
    timeline: Arc<dyn Timeline>,
    state: Mutex<DriverState>,
}

impl SimulatedDriver {
    pub fn new(timeline: Arc<dyn Timeline>) -> Self {
        SimulatedDriver {
            timeline,
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Whether a sink currently holds the resource
    pub fn is_active(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    pub fn acquisitions(&self) -> usize {
        self.state.lock().acquisitions.len()
    }

    pub fn releases(&self) -> usize {
        self.state.lock().releases.len()
    }

    /// Timeline positions of every acquisition, oldest first
    pub fn acquisition_times(&self) -> Vec<ScanTime> {
        self.state.lock().acquisitions.clone()
    }

    pub fn release_times(&self) -> Vec<ScanTime> {
        self.state.lock().releases.clone()
    }

    /// Settings passed with the most recent acquisition
    pub fn settings(&self) -> Option<ScanSettings> {
        self.state.lock().settings.clone()
    }

    /// Deliver a sighting. Returns false if nobody is scanning or the
    /// acquisition filters reject it.
    pub fn emit(&self, event: ScanEvent) -> bool {
        let sink = {
            let state = self.state.lock();
            let Some(sink) = state.sink.clone() else {
                return false;
            };
            if !state.filters.is_empty() && !state.filters.iter().any(|f| f.matches(&event)) {
                return false;
            }
            sink
        };
        sink.on_scan_result(event);
        true
    }

    /// Sighting stamped with the current timeline position
    pub fn sighting(&self, address: &str, rssi: i32) -> bool {
        self.emit(ScanEvent::new(address, rssi, self.timeline.now()))
    }

    /// Report a driver failure. Returns false if nobody is scanning.
    pub fn fail(&self, error_code: i32) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => {
                sink.on_scan_failed(error_code);
                true
            }
            None => false,
        }
    }
}

impl ScanDriver for SimulatedDriver {
    fn acquire(&self, filters: &[ScanFilter], settings: &ScanSettings, sink: Arc<dyn ScanSink>) {
        let now = self.timeline.now();
        let mut state = self.state.lock();
        trace!(at = now.0, count = state.acquisitions.len() + 1, "acquire");
        state.sink = Some(sink);
        state.filters = filters.to_vec();
        state.settings = Some(settings.clone());
        state.acquisitions.push(now);
    }

    fn release(&self, sink: &Arc<dyn ScanSink>) {
        let now = self.timeline.now();
        let mut state = self.state.lock();
        if state.sink.as_ref().is_some_and(|s| Arc::ptr_eq(s, sink)) {
            state.sink = None;
        }
        trace!(at = now.0, "release");
        state.releases.push(now);
    }
}

impl std::fmt::Debug for SimulatedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedDriver")
            .field("active", &state.sink.is_some())
            .field("acquisitions", &state.acquisitions.len())
            .field("releases", &state.releases.len())
            .finish()
    }
}

/// A device advertising around a fixed signal strength
#[derive(Clone, Debug)]
pub struct SimulatedBeacon {
    pub address: DeviceAddress,
    /// Mean RSSI in dBm
    pub rssi: i32,
    /// Maximum deviation from the mean, in dB
    pub jitter: i32,
}

impl SimulatedBeacon {
    pub fn new(address: impl Into<DeviceAddress>, rssi: i32, jitter: i32) -> Self {
        SimulatedBeacon {
            address: address.into(),
            rssi,
            jitter: jitter.abs(),
        }
    }
}

/// A set of beacons with lossy, noisy advertising
pub struct BeaconField {
    beacons: Vec<SimulatedBeacon>,
    /// Chance (0.0 - 1.0) that an advertisement is missed
    pub loss_rate: f64,
    rng: StdRng,
}

impl BeaconField {
    pub fn new(seed: u64) -> Self {
        BeaconField {
            beacons: Vec::new(),
            loss_rate: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `count` beacons with random mean RSSI between -95 and -40 dBm
    pub fn random(seed: u64, count: usize) -> Self {
        let mut field = BeaconField::new(seed);
        let mean = Uniform::new_inclusive(-95, -40);
        for i in 0..count {
            let rssi = mean.sample(&mut field.rng);
            field.beacons.push(SimulatedBeacon::new(
                DeviceAddress::from_bytes([0xC0, 0xFF, 0xEE, 0x00, (i >> 8) as u8, i as u8]),
                rssi,
                6,
            ));
        }
        field
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn add(&mut self, beacon: SimulatedBeacon) {
        self.beacons.push(beacon);
    }

    pub fn beacons(&self) -> &[SimulatedBeacon] {
        &self.beacons
    }

    /// One sighting per beacon that is not lost
    pub fn sweep(&mut self, now: ScanTime) -> Vec<ScanEvent> {
        let mut events = Vec::with_capacity(self.beacons.len());
        for beacon in &self.beacons {
            if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
                continue;
            }
            let noise = if beacon.jitter == 0 {
                0
            } else {
                self.rng.gen_range(-beacon.jitter..=beacon.jitter)
            };
            // Clamp so noise never produces an implausible reading
            let rssi = (beacon.rssi + noise).min(-1);
            events.push(ScanEvent::new(beacon.address.clone(), rssi, now));
        }
        events
    }

    /// Sweep straight into a driver; returns how many sightings it took
    pub fn sweep_into(&mut self, driver: &SimulatedDriver, now: ScanTime) -> usize {
        self.sweep(now)
            .into_iter()
            .filter(|event| driver.emit(event.clone()))
            .count()
    }
}

impl std::fmt::Debug for BeaconField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconField")
            .field("beacons", &self.beacons.len())
            .field("loss_rate", &self.loss_rate)
            .finish()
    }
}
