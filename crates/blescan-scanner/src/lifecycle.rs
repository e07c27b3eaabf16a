//! Host lifecycle binding
//!
//! Scan while the host is in the foreground: `Started` asks for scanning,
//! `Stopped` asks for a delayed stop so a quick background/foreground flip
//! does not cost an acquisition.

use tokio::sync::mpsc;
use tracing::debug;

use crate::Scanner;

/// Host lifecycle transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

/// Drives a [`Scanner`] from lifecycle events
#[derive(Clone, Debug)]
pub struct LifecycleBinding {
    scanner: Scanner,
}

impl LifecycleBinding {
    pub fn new(scanner: Scanner) -> Self {
        LifecycleBinding { scanner }
    }

    pub fn on_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Started => self.scanner.start(),
            LifecycleEvent::Stopped => self.scanner.stop_delayed(),
            _ => {}
        }
    }

    /// Apply events until the channel closes
    pub async fn run(self, mut events: mpsc::Receiver<LifecycleEvent>) {
        while let Some(event) = events.recv().await {
            debug!(?event, "lifecycle");
            self.on_event(event);
        }
    }
}
