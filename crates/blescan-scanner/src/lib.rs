//! blescan Scanner - Scan coordination
//!
//! This crate implements the scanning state machine:
//! - Acquisition rate limiting (sliding window)
//! - Start/stop gating of non-idempotent driver calls
//! - Delayed start/stop sequencing on an injected timeline
//! - State reconciliation of hardware, environment, permission and intent
//! - Environment signals with their own lifecycle
//! - The `Scanner` facade and its host lifecycle binding

pub mod limit;
pub mod gate;
pub mod driver;
pub mod sequencer;
pub mod controller;
pub mod signal;
pub mod scanner;
pub mod lifecycle;

pub use limit::*;
pub use gate::*;
pub use driver::*;
pub use sequencer::*;
pub use controller::*;
pub use signal::*;
pub use scanner::*;
pub use lifecycle::*;
