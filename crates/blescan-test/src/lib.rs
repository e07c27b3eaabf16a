//! blescan Test Harness - Simulation and validation
//!
//! This crate provides:
//! - A simulated scan driver and a noisy beacon field
//! - A scenario harness on a manual timeline
//! - Seeded stress runs with invariant checks
//! - Benchmarks (see `benches/`)

pub mod driver;
pub mod harness;
pub mod stress;

pub use driver::*;
pub use harness::*;
pub use stress::*;
