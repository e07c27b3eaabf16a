//! Randomized stress testing
//!
//! Hammers a [`ScannerHarness`] with a seeded random mix of intent changes,
//! signal flips, driver failures and beacon sweeps, then checks the
//! invariants that must hold no matter the order:
//! - No more acquisitions inside one rate limit window than allowed
//! - The driver is never held while the hardware is off
//! - Callbacks only see events while the status reads scanning
//! - Aggregator snapshots stay sorted and never hold stale devices

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use blescan_core::{ScanEvent, ScanTime, ScannerResult};
use blescan_results::AggregatorConfig;
use blescan_scanner::{RateLimitConfig, ScanSource, ScannerConfig};
use blescan_time::Timeline;

use crate::{BeaconField, ScannerHarness};

/// Stress run configuration
#[derive(Clone, Debug)]
pub struct StressConfig {
    pub seed: u64,
    /// Random actions to apply
    pub steps: usize,
    /// Time advanced after every action
    pub step: Duration,
    /// Beacons in the field
    pub beacons: usize,
    /// Chance a beacon advertisement is missed
    pub loss_rate: f64,
    /// Chance (per step) of flipping one of the three signals
    pub signal_flip_prob: f64,
    /// Chance (per step) of a driver failure
    pub failure_prob: f64,
    /// Chance (per step) of a new scan intent
    pub intent_prob: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            seed: 0x5CA9,
            steps: 2_000,
            step: Duration::from_millis(250),
            beacons: 8,
            loss_rate: 0.2,
            signal_flip_prob: 0.02,
            failure_prob: 0.02,
            intent_prob: 0.05,
        }
    }
}

impl StressConfig {
    /// Short run for unit tests
    pub fn minimal() -> Self {
        StressConfig {
            steps: 200,
            beacons: 3,
            ..Default::default()
        }
    }

    /// Frequent failures and flips
    pub fn stress() -> Self {
        StressConfig {
            steps: 5_000,
            step: Duration::from_millis(100),
            beacons: 20,
            loss_rate: 0.5,
            signal_flip_prob: 0.1,
            failure_prob: 0.1,
            intent_prob: 0.2,
            ..Default::default()
        }
    }
}

/// Outcome of a stress run
#[derive(Clone, Debug, Default)]
pub struct StressResult {
    pub steps: usize,
    pub acquisitions: usize,
    pub releases: usize,
    /// Most acquisitions seen inside one rate limit window
    pub max_in_window: usize,
    pub events_delivered: usize,
    pub violations: Vec<String>,
}

impl StressResult {
    pub fn invariants_maintained(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Runs one seeded stress scenario
pub struct StressHarness {
    config: StressConfig,
    rate_limit: RateLimitConfig,
    harness: ScannerHarness,
    field: BeaconField,
    rng: StdRng,
}

impl StressHarness {
    pub fn new(config: StressConfig) -> ScannerResult<Self> {
        let rate_limit = RateLimitConfig::default();
        let harness = ScannerHarness::with_config(ScannerConfig {
            rate_limit: Some(rate_limit.clone()),
            ..ScannerConfig::default()
        })?;
        let field = BeaconField::random(config.seed, config.beacons).with_loss_rate(config.loss_rate);
        Ok(StressHarness {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            rate_limit,
            harness,
            field,
        })
    }

    pub fn harness(&self) -> &ScannerHarness {
        &self.harness
    }

    pub fn run(&mut self) -> ScannerResult<StressResult> {
        let mut result = StressResult::default();
        let aggregator_config = AggregatorConfig::default();
        let aggregator = self.harness.aggregator(aggregator_config.clone())?;

        let stale = Arc::new(AtomicUsize::new(0));
        let unsorted = Arc::new(AtomicUsize::new(0));
        {
            let timeline = self.harness.timeline.clone();
            let timeout = aggregator_config.timeout;
            let stale = stale.clone();
            let unsorted = unsorted.clone();
            aggregator.observe(move |snapshot| {
                let now = timeline.now();
                if snapshot.iter().any(|d| now - d.event.timestamp > timeout) {
                    stale.fetch_add(1, Ordering::SeqCst);
                }
                if snapshot
                    .windows(2)
                    .any(|w| w[0].smoothed_rssi < w[1].smoothed_rssi)
                {
                    unsorted.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let delivered = Arc::new(AtomicUsize::new(0));
        let hidden = Arc::new(AtomicUsize::new(0));
        {
            let status = self.harness.scanner.status();
            let delivered = delivered.clone();
            let hidden = hidden.clone();
            self.harness
                .scanner
                .add_callback(Arc::new(move |_: &ScanEvent| {
                    delivered.fetch_add(1, Ordering::SeqCst);
                    if !status.value().is_some_and(|s| s.is_scanning()) {
                        hidden.fetch_add(1, Ordering::SeqCst);
                    }
                }));
        }

        for step in 0..self.config.steps {
            self.act();
            self.harness.timeline.advance(self.config.step);

            if self.harness.hardware.value() == Some(false) && self.harness.driver.is_active() {
                result
                    .violations
                    .push(format!("step {}: driver held with hardware off", step));
            }
            result.steps += 1;
        }

        let times = self.harness.driver.acquisition_times();
        result.acquisitions = times.len();
        result.releases = self.harness.driver.releases();
        result.max_in_window = max_in_window(&times, self.rate_limit.effective_window());
        result.events_delivered = delivered.load(Ordering::SeqCst);

        if result.max_in_window > self.rate_limit.max_acquisitions {
            result.violations.push(format!(
                "{} acquisitions inside one window, limit {}",
                result.max_in_window, self.rate_limit.max_acquisitions
            ));
        }
        let hidden = hidden.load(Ordering::SeqCst);
        if hidden > 0 {
            result
                .violations
                .push(format!("{} events delivered while not scanning", hidden));
        }
        let stale = stale.load(Ordering::SeqCst);
        if stale > 0 {
            result
                .violations
                .push(format!("{} snapshots held stale devices", stale));
        }
        let unsorted = unsorted.load(Ordering::SeqCst);
        if unsorted > 0 {
            result
                .violations
                .push(format!("{} snapshots out of order", unsorted));
        }

        debug!(
            steps = result.steps,
            acquisitions = result.acquisitions,
            max_in_window = result.max_in_window,
            violations = result.violations.len(),
            "stress run finished"
        );
        Ok(result)
    }

    fn act(&mut self) {
        let h = &self.harness;

        if self.rng.gen_bool(self.config.intent_prob) {
            match self.rng.gen_range(0..3) {
                0 => h.scanner.start(),
                1 => h.scanner.stop_delayed(),
                _ => h.scanner.stop_now(),
            }
        }

        if self.rng.gen_bool(self.config.signal_flip_prob) {
            let signal = match self.rng.gen_range(0..3) {
                0 => &h.hardware,
                1 => &h.environment,
                _ => &h.permission,
            };
            signal.set(signal.value() != Some(true));
        }

        if self.rng.gen_bool(self.config.failure_prob) {
            h.driver.fail(self.rng.gen_range(1..=4));
        }

        self.field.sweep_into(&h.driver, h.timeline.now());
    }
}

/// Largest number of acquisitions that a limiter with this window would
/// see as live at once
pub fn max_in_window(times: &[ScanTime], window: Duration) -> usize {
    let mut max = 0;
    let mut first = 0;
    for (i, t) in times.iter().enumerate() {
        while *t - times[first] > window {
            first += 1;
        }
        max = max.max(i - first + 1);
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_max_in_window() {
        let t = |ms: i64| ScanTime::from_millis(ms);
        let window = Duration::from_millis(100);

        assert_eq!(max_in_window(&[], window), 0);
        assert_eq!(max_in_window(&[t(0), t(100), t(200)], window), 2);
        assert_eq!(max_in_window(&[t(0), t(101), t(202)], window), 1);
        assert_eq!(max_in_window(&[t(0), t(10), t(20), t(500)], window), 3);
    }

    #[test]
    fn test_minimal_run_keeps_invariants() {
        let mut stress = StressHarness::new(StressConfig::minimal()).unwrap();
        let result = stress.run().unwrap();

        assert_eq!(result.steps, 200);
        assert!(result.invariants_maintained(), "{:?}", result.violations);
    }

    #[test]
    fn test_stress_run_keeps_invariants() {
        let mut stress = StressHarness::new(StressConfig::stress()).unwrap();
        let result = stress.run().unwrap();

        assert!(result.invariants_maintained(), "{:?}", result.violations);
        assert!(result.max_in_window <= 5);
    }

    #[test]
    fn test_run_is_deterministic() {
        let config = StressConfig {
            steps: 500,
            ..StressConfig::stress()
        };
        let a = StressHarness::new(config.clone()).unwrap().run().unwrap();
        let b = StressHarness::new(config).unwrap().run().unwrap();

        assert_eq!(a.acquisitions, b.acquisitions);
        assert_eq!(a.releases, b.releases);
        assert_eq!(a.events_delivered, b.events_delivered);
    }

    proptest! {
        #[test]
        fn max_in_window_matches_every_anchor(
            gaps in proptest::collection::vec(0i64..400, 0..30),
            window in 0u64..1_000,
        ) {
            let mut t = 0;
            let times: Vec<ScanTime> = gaps
                .iter()
                .map(|gap| {
                    t += gap;
                    ScanTime::from_millis(t)
                })
                .collect();
            let window = Duration::from_millis(window);

            // widest run of times that fits inside one window
            let expected = (0..times.len())
                .map(|i| times[i..].iter().take_while(|t| **t - times[i] <= window).count())
                .max()
                .unwrap_or(0);
            prop_assert_eq!(max_in_window(&times, window), expected);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn any_seed_keeps_invariants(seed in any::<u64>()) {
            let config = StressConfig {
                seed,
                steps: 300,
                ..StressConfig::stress()
            };
            let result = StressHarness::new(config).unwrap().run().unwrap();
            prop_assert!(result.invariants_maintained(), "{:?}", result.violations);
        }
    }
}
