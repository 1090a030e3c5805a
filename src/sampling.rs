//! Supported sampling periods.
//!
//! The registry is ordered from the finest to the coarsest resolution. The
//! position in [`SamplingPeriod::ALL`] defines the "coarser than" relation.

use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::storage::HistoryBucketRange;

/// Nominal spacing between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SamplingPeriod {
    /// 1 ms
    EveryMillisecond,
    /// 10 ms
    EveryTenMillis,
    /// 100 ms
    EveryHundredMillis,
    /// 1 s
    EverySecond,
    /// 10 s
    EveryTenSeconds,
    /// 1 min
    EveryMinute,
    /// 10 min
    EveryTenMinutes,
    /// 1 h
    EveryHour,
    /// 6 h
    Every6Hours,
    /// 24 h
    Every24Hours,
    /// 5 days
    Every5Days,
    /// 30 days
    Every30Days,
    /// 90 days
    Every90Days,
    /// 360 days
    Every360Days,
}

impl SamplingPeriod {
    /// All periods, finest first
    pub const ALL: [SamplingPeriod; 14] = [
        Self::EveryMillisecond,
        Self::EveryTenMillis,
        Self::EveryHundredMillis,
        Self::EverySecond,
        Self::EveryTenSeconds,
        Self::EveryMinute,
        Self::EveryTenMinutes,
        Self::EveryHour,
        Self::Every6Hours,
        Self::Every24Hours,
        Self::Every5Days,
        Self::Every30Days,
        Self::Every90Days,
        Self::Every360Days,
    ];

    /// Distance between two samples in milliseconds
    pub const fn distance(self) -> f64 {
        match self {
            Self::EveryMillisecond => 1.0,
            Self::EveryTenMillis => 10.0,
            Self::EveryHundredMillis => 100.0,
            Self::EverySecond => 1_000.0,
            Self::EveryTenSeconds => 10_000.0,
            Self::EveryMinute => 60_000.0,
            Self::EveryTenMinutes => 600_000.0,
            Self::EveryHour => 3_600_000.0,
            Self::Every6Hours => 21_600_000.0,
            Self::Every24Hours => 86_400_000.0,
            Self::Every5Days => 432_000_000.0,
            Self::Every30Days => 2_592_000_000.0,
            Self::Every90Days => 7_776_000_000.0,
            Self::Every360Days => 31_104_000_000.0,
        }
    }

    /// Get a short label for display
    pub const fn label(self) -> &'static str {
        match self {
            Self::EveryMillisecond => "1ms",
            Self::EveryTenMillis => "10ms",
            Self::EveryHundredMillis => "100ms",
            Self::EverySecond => "1s",
            Self::EveryTenSeconds => "10s",
            Self::EveryMinute => "1m",
            Self::EveryTenMinutes => "10m",
            Self::EveryHour => "1h",
            Self::Every6Hours => "6h",
            Self::Every24Hours => "24h",
            Self::Every5Days => "5d",
            Self::Every30Days => "30d",
            Self::Every90Days => "90d",
            Self::Every360Days => "360d",
        }
    }

    pub const fn finest() -> Self {
        Self::EveryMillisecond
    }

    pub const fn coarsest() -> Self {
        Self::Every360Days
    }

    /// Returns the period with the largest distance that does not exceed `bound`.
    ///
    /// Falls back to the finest period if `bound` is smaller than every distance,
    /// so this never fails.
    pub fn with_max_distance(bound: f64) -> Self {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|period| period.distance() <= bound)
            .unwrap_or(Self::finest())
    }

    /// Position in the registry (0 is the finest period)
    pub const fn position(self) -> usize {
        self as usize
    }

    /// The next coarser period, if any
    pub fn coarser(self) -> Option<Self> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// The next finer period, if any
    pub fn finer(self) -> Option<Self> {
        self.position()
            .checked_sub(1)
            .and_then(|position| Self::ALL.get(position).copied())
    }

    pub fn is_coarser_than(self, other: Self) -> bool {
        self > other
    }

    pub fn is_finer_than(self, other: Self) -> bool {
        self < other
    }

    /// The bucket range that stores samples recorded at this period
    pub const fn bucket_range(self) -> HistoryBucketRange {
        HistoryBucketRange::for_sampling_period(self)
    }
}

impl Display for SamplingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_ordered_by_distance() {
        for pair in SamplingPeriod::ALL.windows(2) {
            assert!(pair[0].distance() < pair[1].distance());
            assert!(pair[1].is_coarser_than(pair[0]));
            assert!(pair[0].is_finer_than(pair[1]));
        }
    }

    #[test]
    fn test_position_matches_registry() {
        for (position, period) in SamplingPeriod::ALL.iter().enumerate() {
            assert_eq!(period.position(), position);
        }
    }

    #[test]
    fn test_with_max_distance() {
        assert_eq!(
            SamplingPeriod::with_max_distance(40.0),
            SamplingPeriod::EveryTenMillis
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(10.0),
            SamplingPeriod::EveryTenMillis
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(9.99),
            SamplingPeriod::EveryMillisecond
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(4.0),
            SamplingPeriod::EveryMillisecond
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(4_000.0),
            SamplingPeriod::EverySecond
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(f64::MAX),
            SamplingPeriod::Every360Days
        );
    }

    #[test]
    fn test_with_max_distance_too_small_returns_finest() {
        assert_eq!(
            SamplingPeriod::with_max_distance(0.5),
            SamplingPeriod::EveryMillisecond
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(-10.0),
            SamplingPeriod::EveryMillisecond
        );
    }

    #[test]
    fn test_navigation() {
        assert_eq!(SamplingPeriod::EveryMillisecond.finer(), None);
        assert_eq!(
            SamplingPeriod::EveryMillisecond.coarser(),
            Some(SamplingPeriod::EveryTenMillis)
        );
        assert_eq!(
            SamplingPeriod::EveryHour.finer(),
            Some(SamplingPeriod::EveryTenMinutes)
        );
        assert_eq!(SamplingPeriod::Every360Days.coarser(), None);
    }
}
