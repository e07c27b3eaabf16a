//! blescan Simulator
//!
//! Runs the full scanner stack on the tokio runtime against a simulated
//! radio:
//! - A noisy, lossy beacon field swept every 200 ms
//! - Lifecycle driven start and delayed stop
//! - A hardware power cycle halfway through
//! - Debounced device snapshots and a one-shot search for one beacon
//!
//! Usage: `blescan-sim [seconds] [seed]`. Log verbosity follows `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use blescan_core::Cancellation;
use blescan_results::{AggregatorConfig, ConstantFilter, ResultAggregator, ScanResultFinder};
use blescan_scanner::{
    LifecycleBinding, LifecycleEvent, ScanSource, Scanner, Signal, DEFAULT_STOP_DELAY,
};
use blescan_test::{BeaconField, SimulatedBeacon, SimulatedDriver};
use blescan_time::{Timeline, TokioTimeline};

const SWEEP_INTERVAL: Duration = Duration::from_millis(200);
const BEACONS: usize = 12;
const TARGET: &str = "C0:FF:EE:00:BE:EF";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,blescan=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let run_for = args
        .next()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(20));
    let seed: u64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(rand::random);

    info!(seed, seconds = run_for.as_secs(), "starting simulation");

    let timeline = Arc::new(TokioTimeline::current()?);
    let driver = Arc::new(SimulatedDriver::new(timeline.clone()));
    let hardware = Signal::manual_with("hardware", true);
    let scanner = Scanner::builder(driver.clone(), timeline.clone())
        .hardware(hardware.clone())
        .build()?;

    scanner.status().observe(|status| info!(%status, "scanner status"));

    let aggregator = ResultAggregator::builder(Arc::new(scanner.clone()))
        .config(AggregatorConfig::responsive())
        .smoother(ConstantFilter::factory(4.0))
        .timeline(timeline.clone())
        .build()?;
    aggregator.observe(|devices| {
        let nearest: Vec<String> = devices
            .iter()
            .take(3)
            .map(|d| {
                let address = d.address().map(|a| a.to_string()).unwrap_or_default();
                format!("{} ({:.1} dBm)", address, d.smoothed_rssi)
            })
            .collect();
        info!(devices = devices.len(), nearest = ?nearest, "nearby devices");
    });

    let search = Arc::new(Cancellation::new());
    ScanResultFinder::find(
        Arc::new(scanner.clone()),
        search.clone(),
        &[],
        |event| event.address.as_ref().is_some_and(|a| a.as_str() == TARGET),
        |event| info!(rssi = event.rssi, "target beacon found"),
    );

    let (lifecycle, events) = mpsc::channel(8);
    let binding = tokio::spawn(LifecycleBinding::new(scanner.clone()).run(events));
    lifecycle.send(LifecycleEvent::Started).await?;

    let mut field = BeaconField::random(seed, BEACONS).with_loss_rate(0.25);
    field.add(SimulatedBeacon::new(TARGET, -55, 8));

    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    let mut power_cycled = false;
    while started.elapsed() < run_for {
        ticker.tick().await;
        if !power_cycled && started.elapsed() >= run_for / 2 {
            warn!("simulating hardware power cycle");
            hardware.set(false);
            hardware.set(true);
            power_cycled = true;
        }
        field.sweep_into(&driver, timeline.now());
    }

    lifecycle.send(LifecycleEvent::Stopped).await?;
    drop(lifecycle);
    binding.await?;

    // Let the graceful release happen
    tokio::time::sleep(DEFAULT_STOP_DELAY + SWEEP_INTERVAL).await;
    if driver.is_active() {
        warn!("driver still held after the release delay");
    }

    search.cancel();
    aggregator.close();
    scanner.shutdown();
    info!(
        acquisitions = driver.acquisitions(),
        releases = driver.releases(),
        "simulation finished"
    );
    Ok(())
}
