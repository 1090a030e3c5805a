use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use super::appender::HistoryChunkAppender;
use super::bucket::{HistoryBucket, HistoryBucketDescriptor};
use super::chunk::{DecimalSentinel, HistoryChunk, NO_VALUE, PENDING, max_history_aware, min_history_aware};
use super::configuration::{
    DecimalSeriesIndex, EnumSeriesIndex, HistoryConfiguration, ReferenceEntrySeriesIndex,
    TimestampIndex,
};
use super::enum_set::{HistoryEnumOrdinal, HistoryEnumSet};
use super::reference::{ReferenceEntryData, ReferenceEntryId};
use crate::error::Result;

/// One merged sample, ready for [`HistoryChunkAppender::append_calculated`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownSampledRow {
    pub averages: Vec<f64>,
    pub minimums: Vec<f64>,
    pub maximums: Vec<f64>,
    pub enum_unions: Vec<HistoryEnumSet>,
    pub enum_most_time: Vec<HistoryEnumOrdinal>,
    pub reference_entry_ids: Vec<ReferenceEntryId>,
    pub reference_entry_id_counts: Vec<u32>,
    pub reference_entry_statuses: Vec<HistoryEnumSet>,
}

/// Counts how often each enum ordinal was active
#[derive(Debug, Clone)]
struct OrdinalCounter {
    counts: [u32; HistoryEnumSet::MAX_ORDINALS],
}

impl OrdinalCounter {
    fn new() -> Self {
        Self {
            counts: [0; HistoryEnumSet::MAX_ORDINALS],
        }
    }

    fn add(&mut self, ordinal: HistoryEnumOrdinal) {
        if let Some(count) = self.counts.get_mut(ordinal.0 as usize) {
            *count += 1;
        }
    }

    fn add_all(&mut self, set: HistoryEnumSet) {
        for ordinal in set.ordinals() {
            self.add(ordinal);
        }
    }

    /// Most counted ordinal, ties resolved to the lowest ordinal
    fn winner(&self) -> Option<HistoryEnumOrdinal> {
        let mut winner = None;
        let mut best = 0;
        for (ordinal, count) in self.counts.iter().enumerate() {
            if *count > best {
                best = *count;
                winner = Some(HistoryEnumOrdinal(ordinal as u16));
            }
        }
        winner
    }
}

/// Counts how often each reference entry id was active
#[derive(Debug, Clone, Default)]
struct ReferenceEntryCounter {
    counts: BTreeMap<ReferenceEntryId, u32>,
    no_value: bool,
}

impl ReferenceEntryCounter {
    fn add(&mut self, id: ReferenceEntryId) {
        if id.is_no_value() {
            self.no_value = true;
        } else if !id.is_pending() {
            *self.counts.entry(id).or_default() += 1;
        }
    }

    /// Most counted id, ties resolved to the lowest id
    fn winner(&self) -> ReferenceEntryId {
        let mut winner = None;
        let mut best = 0;
        for (id, count) in &self.counts {
            if *count > best {
                best = *count;
                winner = Some(*id);
            }
        }
        match winner {
            Some(id) => id,
            None if self.no_value => ReferenceEntryId::NO_VALUE,
            None => ReferenceEntryId::PENDING,
        }
    }

    fn distinct(&self) -> u32 {
        self.counts.len() as u32
    }
}

#[derive(Debug, Clone)]
struct DecimalState {
    average: f64,
    min: f64,
    max: f64,
    count: usize,
    no_value: bool,
}

impl DecimalState {
    fn new() -> Self {
        Self {
            average: PENDING,
            min: PENDING,
            max: PENDING,
            count: 0,
            no_value: false,
        }
    }

    fn add(&mut self, value: f64, min: f64, max: f64) {
        if value.is_no_value() {
            self.no_value = true;
            return;
        }
        if value.is_pending() {
            return;
        }

        self.count += 1;
        self.average = if self.count == 1 {
            value
        } else {
            self.average + (value - self.average) / self.count as f64
        };
        self.min = min_history_aware(self.min, min);
        self.max = max_history_aware(self.max, max);
    }

    fn resolve(&self, value: f64) -> f64 {
        match (self.count, self.no_value) {
            (0, true) => NO_VALUE,
            (0, false) => PENDING,
            _ => value,
        }
    }
}

#[derive(Debug, Clone)]
struct EnumState {
    union: Option<HistoryEnumSet>,
    most_time: OrdinalCounter,
    no_value: bool,
}

impl EnumState {
    fn new() -> Self {
        Self {
            union: None,
            most_time: OrdinalCounter::new(),
            no_value: false,
        }
    }

    fn add(&mut self, set: HistoryEnumSet, most_time: Option<HistoryEnumOrdinal>) {
        if set.is_no_value() {
            self.no_value = true;
            return;
        }
        if set.is_pending() {
            return;
        }

        self.union = Some(match self.union {
            Some(union) => union.union(set),
            None => set,
        });
        match most_time {
            Some(ordinal) => self.most_time.add(ordinal),
            None => self.most_time.add_all(set),
        }
    }

    fn union(&self) -> HistoryEnumSet {
        match self.union {
            Some(union) => union,
            None if self.no_value => HistoryEnumSet::NO_VALUE,
            None => HistoryEnumSet::PENDING,
        }
    }

    fn most_time(&self) -> HistoryEnumOrdinal {
        match self.most_time.winner() {
            Some(ordinal) => ordinal,
            None => self.union().first_set_ordinal(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ReferenceEntryState {
    counter: ReferenceEntryCounter,
    statuses: Option<HistoryEnumSet>,
}

impl ReferenceEntryState {
    fn add(&mut self, id: ReferenceEntryId, status: HistoryEnumSet) {
        self.counter.add(id);
        if !status.is_sentinel() {
            self.statuses = Some(match self.statuses {
                Some(union) => union.union(status),
                None => status,
            });
        }
    }

    fn status(&self) -> HistoryEnumSet {
        match self.statuses {
            Some(union) => union,
            None if self.counter.no_value => HistoryEnumSet::NO_VALUE,
            None => HistoryEnumSet::PENDING,
        }
    }
}

/// Merges several samples into one coarser sample
///
/// Pending samples are skipped so that finished samples in the same window still
/// count. A window without any finished sample resolves to `NoValue` if a gap was
/// seen and to `Pending` otherwise.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut accumulator = DownSamplingAccumulator::new(&configuration);
/// accumulator.add_sample(&chunk, TimestampIndex(0));
/// accumulator.add_sample(&chunk, TimestampIndex(1));
/// let row = accumulator.finish_row();
/// ```
#[derive(Debug, Clone)]
pub struct DownSamplingAccumulator {
    decimals: Vec<DecimalState>,
    enums: Vec<EnumState>,
    reference_entries: Vec<ReferenceEntryState>,
    samples: usize,
}

impl DownSamplingAccumulator {
    pub fn new(configuration: &HistoryConfiguration) -> Self {
        Self {
            decimals: vec![DecimalState::new(); configuration.decimal_series_count()],
            enums: vec![EnumState::new(); configuration.enum_series_count()],
            reference_entries: vec![ReferenceEntryState::default(); configuration.reference_entry_series_count()],
            samples: 0,
        }
    }

    /// Number of samples added since the last reset
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Adds the row at `index` of `chunk`.
    ///
    /// `chunk` must be built with the same configuration as the accumulator.
    pub fn add_sample(&mut self, chunk: &HistoryChunk, index: TimestampIndex) {
        self.samples += 1;

        for (series, state) in self.decimals.iter_mut().enumerate() {
            let series = DecimalSeriesIndex(series);
            state.add(
                chunk.decimal_value_at(series, index),
                chunk.decimal_min_at(series, index),
                chunk.decimal_max_at(series, index),
            );
        }

        let calculated = chunk.calculated.is_some();
        for (series, state) in self.enums.iter_mut().enumerate() {
            let series = EnumSeriesIndex(series);
            let most_time = calculated.then(|| chunk.enum_ordinal_most_time_at(series, index));
            state.add(chunk.enum_value_at(series, index), most_time.filter(|o| !o.is_sentinel()));
        }

        for (series, state) in self.reference_entries.iter_mut().enumerate() {
            let series = ReferenceEntrySeriesIndex(series);
            state.add(
                chunk.reference_entry_id_at(series, index),
                chunk.reference_entry_status_at(series, index),
            );
        }
    }

    /// Returns the merged row and resets the accumulator
    pub fn finish_row(&mut self) -> DownSampledRow {
        let row = DownSampledRow {
            averages: self.decimals.iter().map(|s| s.resolve(s.average)).collect(),
            minimums: self.decimals.iter().map(|s| s.resolve(s.min)).collect(),
            maximums: self.decimals.iter().map(|s| s.resolve(s.max)).collect(),
            enum_unions: self.enums.iter().map(EnumState::union).collect(),
            enum_most_time: self.enums.iter().map(EnumState::most_time).collect(),
            reference_entry_ids: self.reference_entries.iter().map(|s| s.counter.winner()).collect(),
            reference_entry_id_counts: self.reference_entries.iter().map(|s| s.counter.distinct()).collect(),
            reference_entry_statuses: self.reference_entries.iter().map(ReferenceEntryState::status).collect(),
        };
        self.reset();
        row
    }

    pub fn reset(&mut self) {
        self.decimals.fill(DecimalState::new());
        self.enums.fill(EnumState::new());
        self.reference_entries.fill(ReferenceEntryState::default());
        self.samples = 0;
    }
}

/// Calculates the bucket for `parent` from its (finer) child buckets.
///
/// The parent window is cut into slots of the parent sampling period. Every
/// slot holding at least one child sample becomes one row at the slot center.
/// `children` must be ordered oldest first. Returns `None` if they hold no
/// samples inside the parent window.
pub fn calculate_down_sampled<B: AsRef<HistoryBucket>>(
    parent: HistoryBucketDescriptor,
    children: &[B],
) -> Result<Option<HistoryBucket>> {
    let Some(first) = children
        .iter()
        .map(|child| -> &HistoryBucket { child.as_ref() })
        .find(|child| !child.is_empty())
    else {
        return Ok(None);
    };
    let configuration: Arc<HistoryConfiguration> = first.chunk().configuration().clone();

    let distance = parent.sampling_period().distance();
    let mut accumulator = DownSamplingAccumulator::new(&configuration);
    let mut appender = HistoryChunkAppender::calculated(configuration);
    let mut seen_data: BTreeMap<ReferenceEntryId, ReferenceEntryData> = BTreeMap::new();
    let mut current_slot = None;

    let samples = children
        .iter()
        .flat_map(|child| {
            let child: &HistoryBucket = child.as_ref();
            let chunk = child.chunk();
            (0..chunk.timestamp_count()).map(move |row| (chunk, TimestampIndex(row)))
        })
        .filter(|(chunk, index)| parent.contains(chunk.timestamp_at(*index)));

    for (chunk, index) in samples {
        let slot = ((chunk.timestamp_at(index) - parent.start()) / distance).floor() as i64;

        if let Some(previous) = current_slot.filter(|previous| *previous != slot) {
            flush_slot(&parent, previous, &mut accumulator, &mut appender, &seen_data)?;
        }
        current_slot = Some(slot);

        accumulator.add_sample(chunk, index);
        for series in 0..chunk.configuration().reference_entry_series_count() {
            let id = chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(series), index);
            if let Some(data) = chunk.reference_entry_data(id) {
                seen_data.entry(id).or_insert_with(|| data.clone());
            }
        }
    }

    if let Some(slot) = current_slot {
        flush_slot(&parent, slot, &mut accumulator, &mut appender, &seen_data)?;
    }

    if appender.is_empty() {
        return Ok(None);
    }

    debug!("Down sampled {} rows into {}", appender.len(), parent);
    HistoryBucket::new(parent, appender.finish()).map(Some)
}

fn flush_slot(
    parent: &HistoryBucketDescriptor,
    slot: i64,
    accumulator: &mut DownSamplingAccumulator,
    appender: &mut HistoryChunkAppender,
    seen_data: &BTreeMap<ReferenceEntryId, ReferenceEntryData>,
) -> Result<()> {
    let distance = parent.sampling_period().distance();
    let center = parent.start() + slot as f64 * distance + distance / 2.0;

    let row = accumulator.finish_row();
    for id in &row.reference_entry_ids {
        if let Some(data) = seen_data.get(id) {
            appender.insert_reference_entry_data(data.clone());
        }
    }
    appender.append_calculated(center, &row)
}
