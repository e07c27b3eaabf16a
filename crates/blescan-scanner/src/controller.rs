//! State reconciliation controller
//!
//! Turns the four inputs (hardware, environment, permission, intent) plus
//! the last driver error into one start/stop decision and one published
//! [`ScanStatus`].
//!
//! Decision, with hardware on:
//! - `StopNow` stops at once
//! - `Scan` with permission starts (restarting first after a hardware
//!   cycle or a driver error), honoring the rate limit
//! - anything else stops after the release delay
//!
//! With hardware off or unknown the resource is stopped at once. The
//! environment flag only affects the reported status.
//!
//! All inputs go through one dispatch queue, so decisions are made one at a
//! time in arrival order no matter which thread delivers them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use blescan_core::{
    DispatchQueue, IdleReason, Observable, ScanIntent, ScanStatus, NO_ERROR,
};
use blescan_time::Timeline;

use crate::{RateLimiter, ScanSequencer};

/// Default delay before a graceful release
pub const DEFAULT_STOP_DELAY: Duration = Duration::from_millis(7_669);

/// Last processed input tuple
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationInputs {
    pub hardware_enabled: Option<bool>,
    pub environment_enabled: Option<bool>,
    pub permission_granted: Option<bool>,
    pub intent: Option<ScanIntent>,
    pub error_code: i32,
}

impl ReconciliationInputs {
    /// Status these inputs report; first match wins
    pub fn status(&self) -> ScanStatus {
        if self.error_code != NO_ERROR {
            ScanStatus::Error(self.error_code)
        } else if self.permission_granted != Some(true) {
            ScanStatus::Idle(IdleReason::PermissionDenied)
        } else if self.hardware_enabled != Some(true) {
            ScanStatus::Idle(IdleReason::HardwareDisabled)
        } else if self.environment_enabled != Some(true) {
            ScanStatus::Idle(IdleReason::EnvironmentDisabled)
        } else if self.intent != Some(ScanIntent::Scan) {
            ScanStatus::Idle(IdleReason::NoIntent)
        } else {
            ScanStatus::Scanning
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Input {
    Update {
        hardware_enabled: Option<bool>,
        environment_enabled: Option<bool>,
        permission_granted: Option<bool>,
        intent: Option<ScanIntent>,
    },
    Error(i32),
}

/// What the sequencer is told after a decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Start,
    Restart,
    StopGracefully,
    StopNow,
}

struct ControllerState {
    inputs: ReconciliationInputs,
    status: ScanStatus,
    needs_restart: bool,
}

/// The scanning state machine
pub struct Controller {
    sequencer: Arc<dyn ScanSequencer>,
    limiter: Option<Arc<RateLimiter>>,
    timeline: Arc<dyn Timeline>,
    stop_delay: Duration,
    state: Mutex<ControllerState>,
    queue: DispatchQueue<Input>,
    status: Arc<Observable<ScanStatus>>,
}

impl Controller {
    pub fn new(
        sequencer: Arc<dyn ScanSequencer>,
        limiter: Option<Arc<RateLimiter>>,
        timeline: Arc<dyn Timeline>,
    ) -> Self {
        Controller {
            sequencer,
            limiter,
            timeline,
            stop_delay: DEFAULT_STOP_DELAY,
            state: Mutex::new(ControllerState {
                inputs: ReconciliationInputs::default(),
                status: ScanStatus::INITIAL,
                needs_restart: false,
            }),
            queue: DispatchQueue::new(),
            status: Arc::new(Observable::with_value(ScanStatus::INITIAL)),
        }
    }

    pub fn with_stop_delay(mut self, stop_delay: Duration) -> Self {
        self.stop_delay = stop_delay;
        self
    }

    /// New values for the four inputs; the error code is kept
    pub fn update(
        &self,
        hardware_enabled: Option<bool>,
        environment_enabled: Option<bool>,
        permission_granted: Option<bool>,
        intent: Option<ScanIntent>,
    ) {
        self.submit(Input::Update {
            hardware_enabled,
            environment_enabled,
            permission_granted,
            intent,
        });
    }

    /// Driver error code, `NO_ERROR` once the driver is healthy again
    pub fn report_error(&self, error_code: i32) {
        self.submit(Input::Error(error_code));
    }

    /// Published status stream
    pub fn status(&self) -> Arc<Observable<ScanStatus>> {
        self.status.clone()
    }

    /// Last derived status
    pub fn current_status(&self) -> ScanStatus {
        self.state.lock().status
    }

    /// Last processed inputs
    pub fn inputs(&self) -> ReconciliationInputs {
        self.state.lock().inputs
    }

    fn submit(&self, input: Input) {
        self.queue.submit(input, |input| self.process(input));
        self.status.flush();
    }

    fn process(&self, input: Input) {
        let action = {
            let mut state = self.state.lock();

            let next = match input {
                Input::Update {
                    hardware_enabled,
                    environment_enabled,
                    permission_granted,
                    intent,
                } => ReconciliationInputs {
                    hardware_enabled,
                    environment_enabled,
                    permission_granted,
                    intent,
                    error_code: state.inputs.error_code,
                },
                Input::Error(error_code) => ReconciliationInputs {
                    error_code,
                    ..state.inputs
                },
            };

            if next == state.inputs {
                return;
            }
            state.inputs = next;

            debug!(
                hardware = ?next.hardware_enabled,
                environment = ?next.environment_enabled,
                permission = ?next.permission_granted,
                intent = ?next.intent,
                error = next.error_code,
                "update"
            );

            if self.sequencer.is_started() && next.hardware_enabled == Some(false) {
                debug!("hardware turned off while scanning, restart on next enable");
                state.needs_restart = true;
            }

            let action = if next.hardware_enabled == Some(true) {
                match next.intent {
                    Some(ScanIntent::StopNow) => Action::StopNow,
                    Some(ScanIntent::Scan) if next.permission_granted == Some(true) => {
                        if state.needs_restart || next.error_code != NO_ERROR {
                            state.needs_restart = false;
                            Action::Restart
                        } else {
                            Action::Start
                        }
                    }
                    _ => Action::StopGracefully,
                }
            } else {
                Action::StopNow
            };

            let status = next.status();
            if status != state.status {
                debug!(%status, "new status");
                state.status = status;
                self.status.enqueue(status);
            }
            action
        };

        // The driver may call back into the controller from inside acquire
        match action {
            Action::Start => self.start(),
            Action::Restart => self.restart(),
            Action::StopGracefully => self.stop_gracefully(),
            Action::StopNow => self.sequencer.stop(Duration::ZERO),
        }
    }

    fn start(&self) {
        let delay = match &self.limiter {
            Some(limiter) => {
                let quota = limiter.quota(self.timeline.now());
                if quota.is_exhausted() {
                    debug!(starts_left = quota.starts_left, wait_ms = quota.wait.as_millis() as u64, "rate limited");
                    quota.wait
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        };
        self.sequencer.start(delay);
    }

    fn stop_gracefully(&self) {
        let delay = match &self.limiter {
            Some(limiter) => {
                let quota = limiter.quota(self.timeline.now());
                if quota.starts_left == 0 {
                    quota.wait.max(self.stop_delay)
                } else {
                    self.stop_delay
                }
            }
            None => self.stop_delay,
        };
        self.sequencer.stop(delay);
    }

    fn restart(&self) {
        self.sequencer.stop(Duration::ZERO);
        self.start();
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Controller")
            .field("inputs", &state.inputs)
            .field("status", &state.status)
            .field("needs_restart", &state.needs_restart)
            .finish()
    }
}
