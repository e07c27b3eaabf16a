//! Scan driver seam
//!
//! The driver is the platform radio scanner. It is told to acquire and
//! release, and reports sightings and failures through a [`ScanSink`] from
//! whatever thread it likes.

use std::sync::Arc;

use blescan_core::{ScanEvent, ScanFilter, ScanSettings};

/// Receiver of driver output
pub trait ScanSink: Send + Sync {
    fn on_scan_result(&self, event: ScanEvent);

    fn on_scan_failed(&self, error_code: i32);
}

/// Platform scanner
pub trait ScanDriver: Send + Sync {
    /// Start delivering sightings matching `filters` to `sink`
    fn acquire(&self, filters: &[ScanFilter], settings: &ScanSettings, sink: Arc<dyn ScanSink>);

    /// Stop delivering to `sink`
    fn release(&self, sink: &Arc<dyn ScanSink>);
}

impl<D: ScanDriver + ?Sized> ScanDriver for Arc<D> {
    fn acquire(&self, filters: &[ScanFilter], settings: &ScanSettings, sink: Arc<dyn ScanSink>) {
        (**self).acquire(filters, settings, sink)
    }

    fn release(&self, sink: &Arc<dyn ScanSink>) {
        (**self).release(sink)
    }
}
