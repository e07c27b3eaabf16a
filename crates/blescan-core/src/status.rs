//! Scanner status model
//!
//! The status is what consumers are told, not necessarily what the radio is
//! doing: with the environment gate closed the radio keeps scanning while
//! the status reads `Idle(EnvironmentDisabled)`.

use std::fmt;

/// Driver error code meaning "no error"
pub const NO_ERROR: i32 = 0;

/// Why the scanner is idle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleReason {
    /// Nobody asked for a scan
    NoIntent,
    /// Radio hardware is off or unavailable
    HardwareDisabled,
    /// Environment service (e.g. location) is off
    EnvironmentDisabled,
    /// Scanning permission not granted
    PermissionDenied,
}

/// Published scanner status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    Idle(IdleReason),
    Scanning,
    /// Driver reported a failure; recovery is already under way
    Error(i32),
}

impl ScanStatus {
    /// Status before any input has been processed
    pub const INITIAL: ScanStatus = ScanStatus::Idle(IdleReason::NoIntent);

    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanStatus::Scanning)
    }

    /// Statuses under which previously discovered devices are no longer valid
    pub fn is_disqualifying(&self) -> bool {
        match self {
            ScanStatus::Idle(IdleReason::NoIntent) | ScanStatus::Scanning => false,
            ScanStatus::Idle(_) | ScanStatus::Error(_) => true,
        }
    }
}

impl Default for ScanStatus {
    fn default() -> Self {
        ScanStatus::INITIAL
    }
}

impl fmt::Display for IdleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IdleReason::NoIntent => "no scan requested",
            IdleReason::HardwareDisabled => "hardware disabled",
            IdleReason::EnvironmentDisabled => "environment disabled",
            IdleReason::PermissionDenied => "permission denied",
        };
        f.write_str(text)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Idle(reason) => write!(f, "IDLE - {}", reason),
            ScanStatus::Scanning => f.write_str("SCANNING"),
            ScanStatus::Error(code) => write!(f, "ERROR - {}", code),
        }
    }
}

/// What the caller wants the scanner to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanIntent {
    Scan,
    /// Stop, allowing the release delay to absorb a quick restart
    StopDelayed,
    /// Stop immediately
    StopNow,
}
