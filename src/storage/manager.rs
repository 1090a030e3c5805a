use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info};

use super::HistoryBucketRange;
use super::accumulator::calculate_down_sampled;
use super::bucket::{HistoryBucket, HistoryBucketDescriptor};
use super::chunk::HistoryChunk;
use crate::config::StorageConfig;
use crate::error::Result;
use crate::sampling::SamplingPeriod;

type BucketMap = BTreeMap<HistoryBucketRange, BTreeMap<i64, Arc<HistoryBucket>>>;
type Observer = Box<dyn Fn(&HistoryUpdateInfo) + Send + Sync>;

/// Time span that changed at one sampling period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryUpdateInfo {
    pub sampling_period: SamplingPeriod,
    pub start: f64,
    pub end: f64,
}

/// Buckets removed by [`InMemoryHistoryStorage::delete_and_before`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionReport {
    /// Removed descriptors, finest range first, oldest first within a range
    pub deleted: Vec<HistoryBucketDescriptor>,
}

impl DeletionReport {
    pub fn count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }
}

/// Bucket store keeping every range in RAM
///
/// Buckets are shared as `Arc<HistoryBucket>`, so readers keep a consistent
/// snapshot while a writer replaces the bucket. Each range holds at most
/// [`StorageConfig::max_buckets_per_range`] buckets; storing more drops the
/// oldest ones.
///
/// ## Usage
///
/// ```rust,ignore
/// let storage = InMemoryHistoryStorage::new(StorageConfig::default());
/// storage.observe(|update| println!("{:?}", update));
/// storage.store_and_down_sample(bucket)?;
/// let buckets = storage.query(start, end, SamplingPeriod::EverySecond)?;
/// ```
pub struct InMemoryHistoryStorage {
    config: StorageConfig,
    buckets: RwLock<BucketMap>,
    observers: Mutex<Vec<Observer>>,
    /// Held while parent buckets are recalculated, so a stale parent never replaces a newer one
    down_sampling: Mutex<()>,
}

impl Default for InMemoryHistoryStorage {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

impl InMemoryHistoryStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(BTreeMap::new()),
            observers: Mutex::new(Vec::new()),
            down_sampling: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Registers a callback invoked after every change.
    ///
    /// Callbacks must not call back into the storage's write operations.
    pub fn observe(&self, observer: impl Fn(&HistoryUpdateInfo) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    /// Inserts `bucket`, replacing a stored bucket with the same descriptor.
    ///
    /// A bucket older than every bucket of a full range is evicted right away.
    /// Observers are not notified in that case and [`Self::get`] will not find it.
    pub fn store(&self, bucket: HistoryBucket) -> Arc<HistoryBucket> {
        self.insert(bucket).0
    }

    /// Stores `bucket`; the flag is false if it was evicted immediately
    fn insert(&self, bucket: HistoryBucket) -> (Arc<HistoryBucket>, bool) {
        let descriptor = *bucket.descriptor();
        let bucket = Arc::new(bucket);

        let retained = {
            let mut buckets = self.write();
            let range = buckets.entry(descriptor.range()).or_default();
            if range.insert(descriptor.index(), bucket.clone()).is_some() {
                debug!("Replaced bucket {}", descriptor);
            } else {
                debug!("Stored bucket {}", descriptor);
            }

            while range.len() > self.config.max_buckets_per_range {
                if let Some((_, evicted)) = range.pop_first() {
                    info!("Evicted bucket {}", evicted.descriptor());
                }
            }
            range.contains_key(&descriptor.index())
        };

        if retained {
            self.notify(&HistoryUpdateInfo {
                sampling_period: descriptor.sampling_period(),
                start: descriptor.start(),
                end: descriptor.end(),
            });
        }
        (bucket, retained)
    }

    /// Stores a chunk whose samples all fall into one bucket at `sampling_period`
    pub fn store_chunk(
        &self,
        chunk: HistoryChunk,
        sampling_period: SamplingPeriod,
    ) -> Result<Arc<HistoryBucket>> {
        let bucket = HistoryBucket::for_chunk(chunk, sampling_period)?;
        Ok(self.store(bucket))
    }

    /// Stores `bucket` and recalculates the coarser buckets covering it.
    ///
    /// Returns the descriptors of the refreshed parent buckets, finest first.
    /// Nothing is refreshed if the bucket was evicted right away.
    pub fn store_and_down_sample(&self, bucket: HistoryBucket) -> Result<Vec<HistoryBucketDescriptor>> {
        let (stored, retained) = self.insert(bucket);
        let mut descriptor = *stored.descriptor();
        let mut refreshed = Vec::new();
        if !retained {
            return Ok(refreshed);
        }

        // Children are read after the lock is taken, so the last writer sees every stored child
        let _guard = self.down_sampling.lock().unwrap_or_else(PoisonError::into_inner);

        for _ in 0..self.config.down_sampling_levels {
            let Some(parent) = descriptor.parent() else {
                break;
            };

            let children = self.buckets_within(descriptor.range(), parent.start(), parent.end());
            match calculate_down_sampled(parent, &children)? {
                Some(calculated) => {
                    self.store(calculated);
                    refreshed.push(parent);
                }
                None => break,
            }
            descriptor = parent;
        }

        if !refreshed.is_empty() {
            debug!("Refreshed {} parent buckets", refreshed.len());
        }
        Ok(refreshed)
    }

    pub fn get(&self, descriptor: &HistoryBucketDescriptor) -> Option<Arc<HistoryBucket>> {
        self.read()
            .get(&descriptor.range())
            .and_then(|range| range.get(&descriptor.index()))
            .cloned()
    }

    /// Stored buckets overlapping `[start, end)` at `sampling_period`, oldest first
    pub fn query(
        &self,
        start: f64,
        end: f64,
        sampling_period: SamplingPeriod,
    ) -> Result<Vec<Arc<HistoryBucket>>> {
        let descriptors = HistoryBucketDescriptor::for_time_range(start, end, sampling_period)?;
        let (Some(first), Some(last)) = (descriptors.first(), descriptors.last()) else {
            return Ok(Vec::new());
        };

        Ok(self
            .read()
            .get(&first.range())
            .map(|range| {
                range
                    .range(first.index()..=last.index())
                    .map(|(_, bucket)| bucket.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Earliest start and latest end of the stored buckets of `range`
    pub fn bounds(&self, range: HistoryBucketRange) -> Option<(f64, f64)> {
        let buckets = self.read();
        let range = buckets.get(&range)?;
        let (_, first) = range.first_key_value()?;
        let (_, last) = range.last_key_value()?;
        Some((first.start(), last.end()))
    }

    pub fn delete(&self, descriptor: &HistoryBucketDescriptor) -> Option<Arc<HistoryBucket>> {
        let deleted = self
            .write()
            .get_mut(&descriptor.range())
            .and_then(|range| range.remove(&descriptor.index()));

        if deleted.is_some() {
            debug!("Deleted bucket {}", descriptor);
            self.notify(&HistoryUpdateInfo {
                sampling_period: descriptor.sampling_period(),
                start: descriptor.start(),
                end: descriptor.end(),
            });
        }
        deleted
    }

    /// Deletes every bucket of any range that ends at or before `descriptor.end()`.
    ///
    /// Coarser buckets reaching past that point are kept.
    pub fn delete_and_before(&self, descriptor: &HistoryBucketDescriptor) -> DeletionReport {
        let limit = descriptor.end();
        let mut report = DeletionReport::default();
        let mut updates = Vec::new();

        {
            let mut buckets = self.write();
            for (range, stored) in buckets.iter_mut() {
                let expired: Vec<i64> = stored
                    .iter()
                    .take_while(|(_, bucket)| bucket.end() <= limit)
                    .map(|(index, _)| *index)
                    .collect();
                let (Some(first), Some(last)) = (expired.first(), expired.last()) else {
                    continue;
                };

                updates.push(HistoryUpdateInfo {
                    sampling_period: range.sampling_period(),
                    start: HistoryBucketDescriptor::new(*range, *first).start(),
                    end: HistoryBucketDescriptor::new(*range, *last).end(),
                });
                for index in &expired {
                    if let Some(bucket) = stored.remove(index) {
                        report.deleted.push(*bucket.descriptor());
                    }
                }
            }
        }

        if !report.is_empty() {
            info!("Deleted {} buckets ending at or before {}", report.count(), limit);
        }
        for update in &updates {
            self.notify(update);
        }
        report
    }

    pub fn clear(&self) {
        let cleared: Vec<HistoryUpdateInfo> = {
            let mut buckets = self.write();
            let updates = buckets
                .iter()
                .filter_map(|(range, stored)| {
                    let (_, first) = stored.first_key_value()?;
                    let (_, last) = stored.last_key_value()?;
                    Some(HistoryUpdateInfo {
                        sampling_period: range.sampling_period(),
                        start: first.start(),
                        end: last.end(),
                    })
                })
                .collect();
            buckets.clear();
            updates
        };

        info!("Cleared history storage");
        for update in &cleared {
            self.notify(update);
        }
    }

    /// Number of stored buckets over all ranges
    pub fn bucket_count(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    /// Buckets of `range` inside `[start, end)`, oldest first
    fn buckets_within(&self, range: HistoryBucketRange, start: f64, end: f64) -> Vec<Arc<HistoryBucket>> {
        let first = range.calculate_index(start);
        let last = range.calculate_index(end);
        self.read()
            .get(&range)
            .map(|stored| {
                stored
                    .range(first..last)
                    .map(|(_, bucket)| bucket.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&self, update: &HistoryUpdateInfo) {
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(update);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BucketMap> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BucketMap> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }
}
