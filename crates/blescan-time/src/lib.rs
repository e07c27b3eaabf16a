//! blescan Time - the logical timeline every component runs on
//!
//! This crate implements:
//! - The `Timeline` abstraction: current time plus cancel-and-reschedule
//!   delayed tasks
//! - `TokioTimeline`: tasks as timers on a caller supplied tokio runtime
//! - `ManualTimeline`: a virtual clock advanced explicitly, for tests and
//!   deterministic simulation
//!
//! Nothing here starts threads on its own; the runtime is always injected.

pub mod timeline;
pub mod runtime;
pub mod manual;

pub use timeline::*;
pub use runtime::*;
pub use manual::*;
