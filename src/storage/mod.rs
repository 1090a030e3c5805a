pub mod appender;
pub mod bucket;
pub mod chunk;
pub mod codec;
pub mod configuration;
pub mod enum_set;
pub mod reference;
pub mod search;

pub mod accumulator;
pub mod manager;

pub use appender::*;
pub use bucket::*;
pub use chunk::*;
pub use configuration::*;
pub use enum_set::*;
pub use reference::*;
pub use search::*;

use serde::{Deserialize, Serialize};

use crate::sampling::SamplingPeriod;

/// Time window covered by one bucket
///
/// Every sampling period owns exactly one bucket range. Coarser periods map to
/// longer ranges, so low resolutions need fewer and larger buckets. Each
/// duration is an integer multiple of the next finer duration, which keeps
/// buckets of neighbouring ranges nested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HistoryBucketRange {
    /// 100 samples at 1 ms
    HundredMillis,
    /// 500 samples at 10 ms
    FiveSeconds,
    /// 600 samples at 100 ms
    OneMinute,
    /// 600 samples at 1 s
    TenMinutes,
    /// 360 samples at 10 s
    OneHour,
    /// 360 samples at 1 min
    SixHours,
    /// 144 samples at 10 min
    OneDay,
    /// 720 samples at 1 h
    ThirtyDays,
    /// 360 samples at 6 h
    OneQuarter,
    /// 360 samples at 24 h
    OneYear,
    /// 360 samples at 5 days
    FiveYears,
    /// 360 samples at 30 days
    ThirtyYears,
    /// 360 samples at 90 days
    NinetyYears,
    /// 720 samples at 360 days
    SevenHundredTwentyYears,
}

impl HistoryBucketRange {
    /// Determine which bucket range stores samples of the given period
    pub const fn for_sampling_period(sampling_period: SamplingPeriod) -> Self {
        match sampling_period {
            SamplingPeriod::EveryMillisecond => Self::HundredMillis,
            SamplingPeriod::EveryTenMillis => Self::FiveSeconds,
            SamplingPeriod::EveryHundredMillis => Self::OneMinute,
            SamplingPeriod::EverySecond => Self::TenMinutes,
            SamplingPeriod::EveryTenSeconds => Self::OneHour,
            SamplingPeriod::EveryMinute => Self::SixHours,
            SamplingPeriod::EveryTenMinutes => Self::OneDay,
            SamplingPeriod::EveryHour => Self::ThirtyDays,
            SamplingPeriod::Every6Hours => Self::OneQuarter,
            SamplingPeriod::Every24Hours => Self::OneYear,
            SamplingPeriod::Every5Days => Self::FiveYears,
            SamplingPeriod::Every30Days => Self::ThirtyYears,
            SamplingPeriod::Every90Days => Self::NinetyYears,
            SamplingPeriod::Every360Days => Self::SevenHundredTwentyYears,
        }
    }

    pub const fn sampling_period(self) -> SamplingPeriod {
        match self {
            Self::HundredMillis => SamplingPeriod::EveryMillisecond,
            Self::FiveSeconds => SamplingPeriod::EveryTenMillis,
            Self::OneMinute => SamplingPeriod::EveryHundredMillis,
            Self::TenMinutes => SamplingPeriod::EverySecond,
            Self::OneHour => SamplingPeriod::EveryTenSeconds,
            Self::SixHours => SamplingPeriod::EveryMinute,
            Self::OneDay => SamplingPeriod::EveryTenMinutes,
            Self::ThirtyDays => SamplingPeriod::EveryHour,
            Self::OneQuarter => SamplingPeriod::Every6Hours,
            Self::OneYear => SamplingPeriod::Every24Hours,
            Self::FiveYears => SamplingPeriod::Every5Days,
            Self::ThirtyYears => SamplingPeriod::Every30Days,
            Self::NinetyYears => SamplingPeriod::Every90Days,
            Self::SevenHundredTwentyYears => SamplingPeriod::Every360Days,
        }
    }

    /// Number of samples a full bucket of this range holds
    pub const fn entries_count(self) -> usize {
        match self {
            Self::HundredMillis => 100,
            Self::FiveSeconds => 500,
            Self::OneMinute | Self::TenMinutes => 600,
            Self::OneDay => 144,
            Self::ThirtyDays | Self::SevenHundredTwentyYears => 720,
            Self::OneHour
            | Self::SixHours
            | Self::OneQuarter
            | Self::OneYear
            | Self::FiveYears
            | Self::ThirtyYears
            | Self::NinetyYears => 360,
        }
    }

    /// Duration of one bucket in milliseconds
    pub const fn duration(self) -> f64 {
        self.sampling_period().distance() * self.entries_count() as f64
    }

    /// Index of the bucket containing `timestamp`
    pub fn calculate_index(self, timestamp: f64) -> i64 {
        (timestamp / self.duration()).floor() as i64
    }

    /// Start of the bucket containing `timestamp`
    pub fn calculate_start(self, timestamp: f64) -> f64 {
        self.calculate_index(timestamp) as f64 * self.duration()
    }

    /// The next coarser range, if any
    pub fn coarser(self) -> Option<Self> {
        self.sampling_period().coarser().map(Self::for_sampling_period)
    }

    /// The next finer range, if any
    pub fn finer(self) -> Option<Self> {
        self.sampling_period().finer().map(Self::for_sampling_period)
    }

    /// How many buckets of the next finer range fit into one bucket of this range
    pub fn children_count(self) -> Option<usize> {
        self.finer()
            .map(|finer| (self.duration() / finer.duration()).round() as usize)
    }
}
