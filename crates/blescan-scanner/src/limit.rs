//! Acquisition rate limiting
//!
//! Radio stacks punish apps that start scanning too often: more than
//! `max_acquisitions` starts inside the window and the scan is silently
//! downgraded. The limiter keeps a sliding window of acquisition times and
//! tells the controller how long to hold back a start (or a release).

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use blescan_core::{ScanTime, ScannerError, ScannerResult};

/// Rate limit configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Acquisitions allowed per window
    pub max_acquisitions: usize,
    /// Window enforced by the radio stack
    pub window: Duration,
    /// Added to `window` to absorb clock skew against the stack
    pub safety_margin: Duration,
    /// Minimum spacing between bookkeeping passes
    pub eviction_debounce: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_acquisitions: 5,
            window: Duration::from_millis(30_000),
            safety_margin: Duration::from_millis(500),
            eviction_debounce: Duration::from_millis(100),
        }
    }
}

impl RateLimitConfig {
    /// Wider margin for stacks with coarse or drifting clocks
    pub fn strict() -> Self {
        RateLimitConfig {
            safety_margin: Duration::from_millis(2_000),
            ..Self::default()
        }
    }

    /// The window as enforced here: `window + safety_margin`
    pub fn effective_window(&self) -> Duration {
        self.window + self.safety_margin
    }

    pub fn validate(&self) -> ScannerResult<()> {
        if self.max_acquisitions == 0 {
            return Err(ScannerError::InvalidConfig(
                "max_acquisitions must be at least 1".into(),
            ));
        }
        if self.max_acquisitions > i32::MAX as usize {
            return Err(ScannerError::InvalidConfig(
                "max_acquisitions out of range".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(ScannerError::InvalidConfig("window must be non-zero".into()));
        }
        Ok(())
    }
}

/// Remaining quota at a point in time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    /// Starts left before the limit; negative when already over it
    pub starts_left: i32,
    /// Time until `starts_left` increases (zero with an empty window)
    pub wait: Duration,
}

impl Quota {
    pub fn is_exhausted(&self) -> bool {
        self.starts_left <= 0
    }
}

struct LimiterState {
    /// Acquisition times, oldest first
    acquisitions: VecDeque<ScanTime>,
    last_eviction: Option<ScanTime>,
}

/// Sliding window acquisition limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> ScannerResult<Self> {
        config.validate()?;
        Ok(RateLimiter {
            window: config.effective_window(),
            config,
            state: Mutex::new(LimiterState {
                acquisitions: VecDeque::new(),
                last_eviction: None,
            }),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Quota as of `now`.
    ///
    /// Only entries still inside the window count, whether or not the
    /// debounced bookkeeping pass has dropped the expired ones yet.
    pub fn quota(&self, now: ScanTime) -> Quota {
        let mut state = self.state.lock();
        self.evict(&mut state, now);

        let first_live = state
            .acquisitions
            .partition_point(|t| self.is_expired(*t, now));
        let live = state.acquisitions.len() - first_live;

        let wait = match state.acquisitions.get(first_live) {
            Some(oldest) => self
                .window
                .saturating_sub(now - *oldest)
                .saturating_add(Duration::from_millis(1)),
            None => Duration::ZERO,
        };

        Quota {
            starts_left: self.config.max_acquisitions as i32 - live as i32,
            wait,
        }
    }

    /// Record one real acquisition of the resource
    pub fn record_acquisition(&self, now: ScanTime) {
        let mut state = self.state.lock();
        self.evict(&mut state, now);
        let at = state.acquisitions.partition_point(|t| *t <= now);
        state.acquisitions.insert(at, now);
        trace!(entries = state.acquisitions.len(), "acquisition recorded");
    }

    /// Entries currently held, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.state.lock().acquisitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, at: ScanTime, now: ScanTime) -> bool {
        now - at > self.window
    }

    fn evict(&self, state: &mut LimiterState, now: ScanTime) {
        if let Some(last) = state.last_eviction {
            if now - last <= self.config.eviction_debounce {
                return;
            }
        }
        state.last_eviction = Some(now);
        while let Some(oldest) = state.acquisitions.front() {
            if self.is_expired(*oldest, now) {
                state.acquisitions.pop_front();
            } else {
                break;
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("entries", &self.len())
            .finish()
    }
}
