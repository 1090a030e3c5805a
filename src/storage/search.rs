//! Exact and nearest-before lookup over time ordered buckets.
//!
//! Misses are `None`. A sample whose row is `Pending` is never returned, a
//! `NoValue` sample is (an explicit gap is still the nearest known state).

use super::bucket::HistoryBucket;
use super::chunk::HistoryChunk;
use super::configuration::TimestampIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Only a sample at exactly the requested timestamp
    Exact,
    /// The latest sample at or before the timestamp, at most `max_distance` ms earlier.
    ///
    /// A NaN bound matches nothing, `f64::INFINITY` matches any distance.
    NearestBefore { max_distance: f64 },
}

/// Location of a sample found by [`search`]
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    /// Position of the bucket in the searched list
    pub bucket_index: usize,
    pub bucket: &'a HistoryBucket,
    pub timestamp_index: TimestampIndex,
}

impl<'a> SearchHit<'a> {
    pub fn chunk(&self) -> &'a HistoryChunk {
        self.bucket.chunk()
    }

    pub fn timestamp(&self) -> f64 {
        self.chunk().timestamp_at(self.timestamp_index)
    }
}

/// Searches `buckets`, which must be ordered by time (oldest first)
pub fn search<B: AsRef<HistoryBucket>>(
    buckets: &[B],
    timestamp: f64,
    mode: SearchMode,
) -> Option<SearchHit<'_>> {
    match mode {
        SearchMode::Exact => search_exact(buckets, timestamp),
        SearchMode::NearestBefore { max_distance } => {
            search_nearest_before(buckets, timestamp, max_distance)
        }
    }
}

fn search_exact<B: AsRef<HistoryBucket>>(buckets: &[B], timestamp: f64) -> Option<SearchHit<'_>> {
    // First bucket whose samples reach up to the timestamp
    let bucket_index = buckets.partition_point(|bucket| {
        let bucket = bucket.as_ref();
        bucket.chunk().last_timestamp().unwrap_or(bucket.start()) < timestamp
    });

    let bucket = buckets.get(bucket_index)?.as_ref();
    let timestamp_index = bucket.chunk().index_of_exact(timestamp)?;
    if bucket.chunk().is_pending(timestamp_index) {
        return None;
    }

    Some(SearchHit {
        bucket_index,
        bucket,
        timestamp_index,
    })
}

fn search_nearest_before<B: AsRef<HistoryBucket>>(
    buckets: &[B],
    timestamp: f64,
    max_distance: f64,
) -> Option<SearchHit<'_>> {
    // Buckets starting after the timestamp cannot contribute
    let candidates = buckets.partition_point(|bucket| {
        let bucket = bucket.as_ref();
        bucket.chunk().first_timestamp().unwrap_or(bucket.start()) <= timestamp
    });

    for bucket_index in (0..candidates).rev() {
        let bucket = buckets[bucket_index].as_ref();
        let chunk = bucket.chunk();

        for row in (0..chunk.count_up_to(timestamp)).rev() {
            let timestamp_index = TimestampIndex(row);
            // The bound is always measured from the requested timestamp
            let distance = timestamp - chunk.timestamp_at(timestamp_index);
            if distance.is_nan() || max_distance.is_nan() || distance > max_distance {
                return None;
            }
            if chunk.is_pending(timestamp_index) {
                continue;
            }
            return Some(SearchHit {
                bucket_index,
                bucket,
                timestamp_index,
            });
        }
    }
    None
}
