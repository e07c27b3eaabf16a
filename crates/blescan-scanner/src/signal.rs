//! Environment signals
//!
//! Hardware enabled, environment enabled and permission granted are each a
//! [`Signal`]: an observable tri-state flag (unknown until first read) with
//! its own start/stop lifecycle for the platform notification channel.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use blescan_core::{Observable, ObserverId};

use crate::StartStop;

/// Change notification handed to a probe
pub type ChangeFn = Arc<dyn Fn() + Send + Sync>;

/// Platform source backing a signal
pub trait SignalProbe: Send + Sync {
    /// Current platform value
    fn read(&self) -> bool;

    /// Start calling `on_change` whenever the value may have changed
    fn register(&self, on_change: ChangeFn);

    /// Stop notifications
    fn unregister(&self);
}

/// Observable platform flag
pub struct Signal {
    name: &'static str,
    value: Observable<bool>,
    probe: Option<Arc<dyn SignalProbe>>,
    gate: StartStop,
    write: Mutex<()>,
    this: Weak<Signal>,
}

impl Signal {
    /// Signal driven by [`Signal::set`], unknown until the first set
    pub fn manual(name: &'static str) -> Arc<Self> {
        Self::build(name, None)
    }

    /// Manually driven signal with a known initial value
    pub fn manual_with(name: &'static str, initial: bool) -> Arc<Self> {
        let signal = Self::build(name, None);
        signal.set(initial);
        signal
    }

    /// Signal backed by a platform probe; reads it once right away
    pub fn probed(name: &'static str, probe: Arc<dyn SignalProbe>) -> Arc<Self> {
        let signal = Self::build(name, Some(probe));
        signal.refresh();
        signal
    }

    fn build(name: &'static str, probe: Option<Arc<dyn SignalProbe>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Signal {
            name,
            value: Observable::new(),
            probe,
            gate: StartStop::new(),
            write: Mutex::new(()),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `None` while unknown
    pub fn value(&self) -> Option<bool> {
        self.value.value()
    }

    /// Post a new value; an unchanged value is not re-posted
    pub fn set(&self, enabled: bool) {
        {
            let _write = self.write.lock();
            if self.value.value() == Some(enabled) {
                return;
            }
            debug!(signal = self.name, enabled, "signal changed");
            self.value.enqueue(enabled);
        }
        self.value.flush();
    }

    /// Re-read the probe
    pub fn refresh(&self) {
        if let Some(probe) = &self.probe {
            self.set(probe.read());
        }
    }

    /// Start listening to the platform
    pub fn start(&self) {
        self.gate.start(|| {
            self.refresh();
            if let Some(probe) = &self.probe {
                let this = self.this.clone();
                probe.register(Arc::new(move || {
                    if let Some(signal) = this.upgrade() {
                        signal.refresh();
                    }
                }));
            }
        });
    }

    /// Stop listening to the platform
    pub fn stop(&self) {
        self.gate.stop(|| {
            if let Some(probe) = &self.probe {
                probe.unregister();
            }
        });
    }

    pub fn is_started(&self) -> bool {
        self.gate.is_started()
    }

    pub fn observe(&self, observer: impl Fn(&bool) + Send + Sync + 'static) -> ObserverId {
        self.value.observe(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.value.remove_observer(id)
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("value", &self.value())
            .field("started", &self.is_started())
            .finish()
    }
}
