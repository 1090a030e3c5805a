use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tuning knobs of the bucket store and the resampler
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StorageConfig {
    /// Buckets kept per range before the oldest ones are evicted
    pub max_buckets_per_range: usize,
    /// Number of coarser ranges refreshed after storing a bucket
    pub down_sampling_levels: usize,
    /// Entry duration in ms assumed by the resampler when none is given
    pub default_entry_duration_ms: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_buckets_per_range: 1000,
            down_sampling_levels: 3,
            default_entry_duration_ms: 1000.0,
        }
    }
}

impl StorageConfig {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}
