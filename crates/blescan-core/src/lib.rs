//! blescan Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every blescan component:
//! - Identifiers (DeviceAddress, ObserverId, CallbackId)
//! - Time primitives (ScanTime)
//! - Discovery events, advertisement records, filters and settings
//! - Scanner status and scan intent
//! - Serial dispatch, observables and cancellation

pub mod id;
pub mod time;
pub mod event;
pub mod status;
pub mod dispatch;
pub mod observable;
pub mod error;

pub use id::*;
pub use time::*;
pub use event::*;
pub use status::*;
pub use dispatch::*;
pub use observable::*;
pub use error::*;
