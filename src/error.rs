//! Error taxonomy for the history engine.
//!
//! Structural violations (schema mismatch, ordering, invalid ordinals) abort the
//! operation that hit them. Search misses and empty resampler input are not errors,
//! they are reported through `Option`.

use thiserror::Error;

use crate::storage::HistoryBucketRange;
use crate::storage::configuration::{DataSeriesId, SeriesKind};

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("{kind} row has {actual} values but the configuration defines {expected} series")]
    SeriesCountMismatch {
        kind: SeriesKind,
        expected: usize,
        actual: usize,
    },
    #[error("timestamp {timestamp} is not greater than the previous timestamp {previous}")]
    NonMonotonicTimestamp { previous: f64, timestamp: f64 },
    #[error("timestamp {0} is not a finite value")]
    NonFiniteTimestamp(f64),
    #[error("enum ordinal {ordinal} is out of range (max {max})")]
    InvalidOrdinal { ordinal: u16, max: u16 },
    #[error("timestamp {timestamp} lies outside of bucket [{start}, {end})")]
    TimestampOutsideBucket { timestamp: f64, start: f64, end: f64 },
    #[error("{start} is not a bucket start for range {range:?}")]
    UnalignedBucketStart {
        start: f64,
        range: HistoryBucketRange,
    },
    #[error("{count} buckets requested, at most {max} are supported")]
    TooManyBuckets { count: usize, max: usize },
    #[error("data series id {0} is used more than once")]
    DuplicateSeriesId(DataSeriesId),
    #[error("chunk does not contain any timestamps")]
    EmptyChunk,
    #[error("invalid interval [{start}, {end})")]
    InvalidInterval { start: f64, end: f64 },
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),
    #[error("Codec error: {0}")]
    Codec(#[from] postcard::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, HistoryError>;
