//! Benchmarks for the blescan scan result pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use blescan_results::AggregatorConfig;
use blescan_test::{BeaconField, ScannerHarness};

fn bench_sighting_unobserved(c: &mut Criterion) {
    let harness = ScannerHarness::new().unwrap();
    let aggregator = harness.aggregator(AggregatorConfig::default()).unwrap();
    harness.scanner.start();

    c.bench_function("pipeline_sighting_unobserved", |b| {
        b.iter(|| black_box(harness.sighting(black_box("C0:FF:EE:00:00:01"), -60)))
    });
    black_box(aggregator.len());
}

fn bench_sweep_observed(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_sweep_observed");
    for beacons in [1usize, 10, 50] {
        let harness = ScannerHarness::new().unwrap();
        let aggregator = harness.aggregator(AggregatorConfig::responsive()).unwrap();
        aggregator.observe(|snapshot| {
            black_box(snapshot.len());
        });
        harness.scanner.start();
        let mut field = BeaconField::random(1, beacons);

        group.bench_with_input(BenchmarkId::from_parameter(beacons), &beacons, |b, _| {
            b.iter(|| {
                harness.advance(100);
                black_box(field.sweep_into(&harness.driver, harness.now()))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sighting_unobserved, bench_sweep_observed);
criterion_main!(benches);
