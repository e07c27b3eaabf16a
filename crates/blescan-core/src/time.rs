//! Time primitives for blescan
//!
//! All components run on one logical timeline. A [`ScanTime`] is a point on
//! that timeline in milliseconds since the timeline's epoch; it only moves
//! forward and is never compared with wall-clock time.

use std::ops::{Add, Sub};
use std::time::Duration;

/// Point on the scan timeline, milliseconds since the timeline epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScanTime(pub i64);

impl ScanTime {
    pub const ZERO: ScanTime = ScanTime(0);
    pub const MAX: ScanTime = ScanTime(i64::MAX);

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        ScanTime(millis)
    }

    #[inline]
    pub fn from_duration(since_epoch: Duration) -> Self {
        ScanTime(since_epoch.as_millis().min(i64::MAX as u128) as i64)
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        ScanTime(self.0.saturating_add(duration_millis(duration)))
    }

    #[inline]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        ScanTime(self.0.saturating_sub(duration_millis(duration)))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn since(self, earlier: ScanTime) -> Duration {
        self - earlier
    }
}

#[inline]
fn duration_millis(duration: Duration) -> i64 {
    duration.as_millis().min(i64::MAX as u128) as i64
}

impl Add<Duration> for ScanTime {
    type Output = ScanTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<Duration> for ScanTime {
    type Output = ScanTime;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Sub<ScanTime> for ScanTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: ScanTime) -> Self::Output {
        let diff = self.0.saturating_sub(rhs.0);
        if diff >= 0 {
            Duration::from_millis(diff as u64)
        } else {
            Duration::ZERO
        }
    }
}

impl std::fmt::Debug for ScanTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({}ms)", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_time_arithmetic() {
        let t1 = ScanTime::from_millis(1000);
        let t2 = t1 + Duration::from_millis(250);

        assert!(t2 > t1);
        assert_eq!(t2 - t1, Duration::from_millis(250));
        assert_eq!(t2 - Duration::from_millis(250), t1);
    }

    #[test]
    fn test_scan_time_difference_never_negative() {
        let early = ScanTime::from_millis(10);
        let late = ScanTime::from_millis(20);

        assert_eq!(early - late, Duration::ZERO);
        assert_eq!(late.since(early), Duration::from_millis(10));
    }

    #[test]
    fn test_scan_time_saturates() {
        let t = ScanTime::MAX + Duration::from_secs(1);
        assert_eq!(t, ScanTime::MAX);
    }
}
