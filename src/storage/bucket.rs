//! Aligned time windows and the buckets that fill them.

use core::fmt::Display;

use serde::{Deserialize, Serialize};

use super::HistoryBucketRange;
use super::chunk::HistoryChunk;
use super::search::{SearchHit, SearchMode, search};
use crate::error::{HistoryError, Result};
use crate::sampling::SamplingPeriod;

/// Maximum number of descriptors [`HistoryBucketDescriptor::for_time_range`] returns
pub const MAX_DESCRIPTORS_PER_QUERY: usize = 100;

/// Identifies the window `[index * duration, (index + 1) * duration)` of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryBucketDescriptor {
    range: HistoryBucketRange,
    index: i64,
}

impl HistoryBucketDescriptor {
    pub const fn new(range: HistoryBucketRange, index: i64) -> Self {
        Self { range, index }
    }

    /// Descriptor of the bucket containing `timestamp` at `sampling_period`
    pub fn for_timestamp(timestamp: f64, sampling_period: SamplingPeriod) -> Self {
        Self::for_range_and_timestamp(sampling_period.bucket_range(), timestamp)
    }

    pub fn for_range_and_timestamp(range: HistoryBucketRange, timestamp: f64) -> Self {
        Self::new(range, range.calculate_index(timestamp))
    }

    /// Descriptor starting exactly at `start`
    pub fn for_start(range: HistoryBucketRange, start: f64) -> Result<Self> {
        let descriptor = Self::for_range_and_timestamp(range, start);
        if descriptor.start() != start {
            return Err(HistoryError::UnalignedBucketStart { start, range });
        }
        Ok(descriptor)
    }

    /// Descriptor of the bucket that contains the first timestamp of `chunk`
    pub fn for_chunk(chunk: &HistoryChunk, sampling_period: SamplingPeriod) -> Result<Self> {
        let first = chunk.first_timestamp().ok_or(HistoryError::EmptyChunk)?;
        Ok(Self::for_timestamp(first, sampling_period))
    }

    /// All descriptors overlapping `[start, end)`, oldest first
    pub fn for_time_range(start: f64, end: f64, sampling_period: SamplingPeriod) -> Result<Vec<Self>> {
        if end <= start {
            return Ok(Vec::new());
        }

        let first = Self::for_timestamp(start, sampling_period);
        let last = Self::for_timestamp(end, sampling_period);
        // `end` is exclusive
        let last_index = if last.start() == end {
            last.index.saturating_sub(1)
        } else {
            last.index
        };

        let count = usize::try_from(last_index.saturating_sub(first.index).saturating_add(1)).unwrap_or(0);
        if count > MAX_DESCRIPTORS_PER_QUERY {
            return Err(HistoryError::TooManyBuckets {
                count,
                max: MAX_DESCRIPTORS_PER_QUERY,
            });
        }

        Ok((first.index..=last_index)
            .map(|index| Self::new(first.range, index))
            .collect())
    }

    pub const fn range(&self) -> HistoryBucketRange {
        self.range
    }

    pub const fn index(&self) -> i64 {
        self.index
    }

    pub const fn sampling_period(&self) -> SamplingPeriod {
        self.range.sampling_period()
    }

    /// Inclusive start in ms
    pub fn start(&self) -> f64 {
        self.index as f64 * self.range.duration()
    }

    /// Exclusive end in ms
    pub fn end(&self) -> f64 {
        self.index.saturating_add(1) as f64 * self.range.duration()
    }

    pub fn center(&self) -> f64 {
        self.start() + self.range.duration() / 2.0
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start() <= timestamp && timestamp < self.end()
    }

    pub fn next(&self) -> Self {
        Self::new(self.range, self.index.saturating_add(1))
    }

    pub fn previous(&self) -> Self {
        Self::new(self.range, self.index.saturating_sub(1))
    }

    /// Number of buckets between `self` and `other` (positive if `other` is later)
    pub fn distance_to(&self, other: &Self) -> Option<i64> {
        if self.range == other.range {
            other.index.checked_sub(self.index)
        } else {
            None
        }
    }

    /// Descriptors of the next finer range covering the same window
    pub fn children(&self) -> Vec<Self> {
        let Some(finer) = self.range.finer() else {
            return Vec::new();
        };
        let Some(count) = self.range.children_count() else {
            return Vec::new();
        };

        let first = finer.calculate_index(self.start());
        (first..first.saturating_add(count as i64))
            .map(|index| Self::new(finer, index))
            .collect()
    }

    /// Descriptor of the next coarser range containing this window
    pub fn parent(&self) -> Option<Self> {
        self.range
            .coarser()
            .map(|coarser| Self::for_range_and_timestamp(coarser, self.start()))
    }
}

impl Display for HistoryBucketDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?}#{} [{}, {})",
            self.range,
            self.index,
            self.start(),
            self.end()
        )
    }
}

/// A chunk covering exactly one descriptor window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryBucket {
    descriptor: HistoryBucketDescriptor,
    chunk: HistoryChunk,
}

impl HistoryBucket {
    /// Wraps `chunk`, rejecting timestamps outside of the descriptor window
    pub fn new(descriptor: HistoryBucketDescriptor, chunk: HistoryChunk) -> Result<Self> {
        let outside = chunk
            .first_timestamp()
            .filter(|first| !descriptor.contains(*first))
            .or_else(|| chunk.last_timestamp().filter(|last| !descriptor.contains(*last)));

        if let Some(timestamp) = outside {
            return Err(HistoryError::TimestampOutsideBucket {
                timestamp,
                start: descriptor.start(),
                end: descriptor.end(),
            });
        }

        Ok(Self { descriptor, chunk })
    }

    /// Wraps a chunk into the bucket of its first timestamp
    pub fn for_chunk(chunk: HistoryChunk, sampling_period: SamplingPeriod) -> Result<Self> {
        let descriptor = HistoryBucketDescriptor::for_chunk(&chunk, sampling_period)?;
        Self::new(descriptor, chunk)
    }

    pub fn descriptor(&self) -> &HistoryBucketDescriptor {
        &self.descriptor
    }

    pub fn chunk(&self) -> &HistoryChunk {
        &self.chunk
    }

    pub fn into_chunk(self) -> HistoryChunk {
        self.chunk
    }

    pub fn sampling_period(&self) -> SamplingPeriod {
        self.descriptor.sampling_period()
    }

    pub fn start(&self) -> f64 {
        self.descriptor.start()
    }

    pub fn end(&self) -> f64 {
        self.descriptor.end()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.descriptor.contains(timestamp)
    }

    /// True if the bucket window intersects `[start, end)`
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start() < end && start < self.end()
    }

    /// Searches this bucket only
    pub fn search(&self, timestamp: f64, mode: SearchMode) -> Option<SearchHit<'_>> {
        search(core::slice::from_ref(self), timestamp, mode)
    }
}

impl AsRef<HistoryBucket> for HistoryBucket {
    fn as_ref(&self) -> &HistoryBucket {
        self
    }
}
