//! Time-bucketed history storage for chart time series.
//!
//! Samples of decimal, enum and reference entry series are collected into
//! immutable columnar [`storage::HistoryChunk`]s. Chunks live in aligned
//! [`storage::HistoryBucket`]s, one bucket range per [`sampling::SamplingPeriod`],
//! and coarser buckets are calculated from finer ones by down-sampling.
//!
//! - [`storage`]: chunks, buckets, search, down-sampling, the in-memory store and the codec
//! - [`discrete`]: resampling of labeled intervals into reference entry rows
//! - [`sampling`]: the sampling period registry
//! - [`config`]: storage tuning

pub mod config;
pub mod discrete;
pub mod error;
pub mod sampling;
pub mod storage;

pub use config::StorageConfig;
pub use error::{HistoryError, Result};
pub use sampling::SamplingPeriod;
