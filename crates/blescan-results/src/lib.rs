//! blescan Results - Consuming scan results
//!
//! This crate turns the raw discovery stream into something an app can use:
//! - RSSI smoothing filters
//! - A debounced, self-clearing registry of nearby devices
//! - One-shot search for a specific device

pub mod smoothing;
pub mod aggregator;
pub mod finder;

pub use smoothing::*;
pub use aggregator::*;
pub use finder::*;
