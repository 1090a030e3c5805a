//! Turns labeled intervals into reference entry rows.
//!
//! Every series is a list of non-overlapping `[start, end)` intervals. The
//! resampler lays a shared timestamp grid over all series and emits, per grid
//! timestamp and series, the id of the covering interval (or `NoValue`).
//! Consecutive grid timestamps with unchanged label and status share an id.

use core::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::config::StorageConfig;
use crate::error::{HistoryError, Result};
use crate::sampling::SamplingPeriod;
use crate::storage::appender::{HistoryChunkAppender, ReferenceEntryCell};
use crate::storage::chunk::{HistoryChunk, NO_VALUE};
use crate::storage::configuration::{HistoryConfiguration, SeriesKind};
use crate::storage::enum_set::HistoryEnumSet;
use crate::storage::reference::{ReferenceEntryData, ReferenceEntryId, ReferenceEntryIdAllocator};

/// One labeled interval `[start, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteDataEntry {
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub status: HistoryEnumSet,
}

impl DiscreteDataEntry {
    pub fn new(start: f64, end: f64, label: impl Into<String>, status: HistoryEnumSet) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || end.partial_cmp(&start) != Some(Ordering::Greater) {
            return Err(HistoryError::InvalidInterval { start, end });
        }
        Ok(Self {
            start,
            end,
            label: label.into(),
            status,
        })
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// The intervals of one series, ordered by start
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscreteSeries {
    entries: Vec<DiscreteDataEntry>,
}

impl DiscreteSeries {
    /// Sorts `entries` by start and rejects overlapping intervals
    pub fn new(mut entries: Vec<DiscreteDataEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.start.total_cmp(&b.start));
        if let Some(pair) = entries.windows(2).find(|pair| pair[1].start < pair[0].end) {
            return Err(HistoryError::InvalidInterval {
                start: pair[1].start,
                end: pair[0].end,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DiscreteDataEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn start(&self) -> Option<f64> {
        self.entries.first().map(|entry| entry.start)
    }

    pub fn end(&self) -> Option<f64> {
        self.entries.last().map(|entry| entry.end)
    }

    /// Index of the entry covering `timestamp`
    pub fn find_entry_index(&self, timestamp: f64) -> Option<usize> {
        let after = self.entries.partition_point(|entry| entry.start <= timestamp);
        let index = after.checked_sub(1)?;
        self.entries[index].contains(timestamp).then_some(index)
    }
}

/// Input of one resampling run
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteTimelineData {
    pub series: Vec<DiscreteSeries>,
    /// Expected duration of a typical entry in ms, drives the sampling period
    pub default_entry_duration: f64,
}

impl DiscreteTimelineData {
    /// Uses the default entry duration of [`StorageConfig::default`]
    pub fn new(series: Vec<DiscreteSeries>) -> Self {
        Self::with_config(series, &StorageConfig::default())
    }

    pub fn with_config(series: Vec<DiscreteSeries>, config: &StorageConfig) -> Self {
        Self {
            series,
            default_entry_duration: config.default_entry_duration_ms,
        }
    }

    pub fn with_default_entry_duration(mut self, default_entry_duration: f64) -> Self {
        self.default_entry_duration = default_entry_duration;
        self
    }

    /// Sampling period used for the regular part of the grid
    pub fn sampling_period(&self) -> SamplingPeriod {
        SamplingPeriod::with_max_distance(self.default_entry_duration * 4.0)
    }

    /// Resamples all series into one measured chunk.
    ///
    /// Returns `None` if no series holds an entry. Decimal and enum series of
    /// `configuration` are filled with `NoValue`.
    pub fn to_chunk(
        &self,
        configuration: &Arc<HistoryConfiguration>,
    ) -> Result<Option<(HistoryChunk, SamplingPeriod)>> {
        let expected = configuration.reference_entry_series_count();
        if self.series.len() != expected {
            return Err(HistoryError::SeriesCountMismatch {
                kind: SeriesKind::ReferenceEntry,
                expected,
                actual: self.series.len(),
            });
        }

        let start = self.series.iter().filter_map(DiscreteSeries::start).reduce(f64::min);
        let end = self.series.iter().filter_map(DiscreteSeries::end).reduce(f64::max);
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(None);
        };

        let sampling_period = self.sampling_period();
        let timestamps = all_timestamps_for_chunk(&self.series, start, end, sampling_period);

        let decimals = vec![NO_VALUE; configuration.decimal_series_count()];
        let enums = vec![HistoryEnumSet::NO_VALUE; configuration.enum_series_count()];

        let mut appender = HistoryChunkAppender::new(configuration.clone());
        let mut allocator = ReferenceEntryIdAllocator::new();
        let mut entries: BTreeMap<ReferenceEntryId, ReferenceEntryData> = BTreeMap::new();
        let mut previous = vec![ReferenceEntryCell::NO_VALUE; self.series.len()];

        for timestamp in timestamps {
            let mut row = Vec::with_capacity(self.series.len());

            for (series, last) in self.series.iter().zip(&previous) {
                let Some(entry) = series
                    .find_entry_index(timestamp)
                    .map(|index| &series.entries[index])
                else {
                    row.push(ReferenceEntryCell::NO_VALUE);
                    continue;
                };

                let reused = entries
                    .get_mut(&last.id)
                    .filter(|data| last.status == entry.status && data.label == entry.label);
                let id = match reused {
                    Some(data) => {
                        // The id now spans every interval it was carried through
                        data.end = data.end.max(entry.end);
                        last.id
                    }
                    None => {
                        let id = allocator.next_id();
                        entries.insert(
                            id,
                            ReferenceEntryData::new(id, entry.label.clone(), entry.start, entry.end),
                        );
                        id
                    }
                };
                row.push(ReferenceEntryCell::new(id, entry.status));
            }

            appender.append(timestamp, &decimals, &enums, &row)?;
            previous = row;
        }

        for data in entries.into_values() {
            appender.insert_reference_entry_data(data);
        }

        debug!(
            "Resampled {} series into {} timestamps at {}, {} entries",
            self.series.len(),
            appender.len(),
            sampling_period,
            allocator.allocated()
        );
        Ok(Some((appender.finish(), sampling_period)))
    }
}

/// Regular grid from `start` in steps of the period distance, always ending with `end`
pub fn timestamps_for_sampling_period(start: f64, end: f64, sampling_period: SamplingPeriod) -> Vec<f64> {
    if end < start {
        return Vec::new();
    }

    let distance = sampling_period.distance();
    let mut timestamps: Vec<f64> = (0..)
        .map(|step| start + step as f64 * distance)
        .take_while(|timestamp| *timestamp < end)
        .collect();
    timestamps.push(end);
    timestamps
}

/// Every start and end of every entry, sorted and without duplicates
pub fn timestamps_from_entry_bounds(series: &[DiscreteSeries]) -> Vec<f64> {
    let mut timestamps: Vec<f64> = series
        .iter()
        .flat_map(|series| series.entries.iter())
        .flat_map(|entry| [entry.start, entry.end])
        .collect();
    sort_and_dedup(&mut timestamps);
    timestamps
}

/// The grid a resampling run uses: entry bounds merged with the regular grid
pub fn all_timestamps_for_chunk(
    series: &[DiscreteSeries],
    start: f64,
    end: f64,
    sampling_period: SamplingPeriod,
) -> Vec<f64> {
    let mut timestamps = timestamps_from_entry_bounds(series);
    timestamps.extend(timestamps_for_sampling_period(start, end, sampling_period));
    sort_and_dedup(&mut timestamps);
    timestamps
}

fn sort_and_dedup(timestamps: &mut Vec<f64>) {
    timestamps.sort_by(f64::total_cmp);
    timestamps.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::configuration::{DataSeriesId, HistoryEnum, ReferenceEntrySeriesIndex, TimestampIndex};

    fn entry(start: f64, end: f64, label: &str, bits: u32) -> DiscreteDataEntry {
        DiscreteDataEntry::new(start, end, label, HistoryEnumSet::from_bits(bits).unwrap()).unwrap()
    }

    fn series(entries: &[(f64, f64, &str)]) -> DiscreteSeries {
        DiscreteSeries::new(
            entries
                .iter()
                .map(|(start, end, label)| entry(*start, *end, label, 1))
                .collect(),
        )
        .unwrap()
    }

    fn configuration(series: usize) -> Arc<HistoryConfiguration> {
        let mut builder = HistoryConfiguration::builder();
        for id in 0..series {
            builder = builder.reference_entry_series(
                DataSeriesId(id as u32 + 1),
                "events",
                HistoryEnum::boolean(),
            );
        }
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn test_entry_rejects_empty_interval() {
        let result = DiscreteDataEntry::new(10.0, 10.0, "x", HistoryEnumSet::TRUE);
        assert!(matches!(
            result,
            Err(HistoryError::InvalidInterval { start, end }) if start == 10.0 && end == 10.0
        ));
        assert!(DiscreteDataEntry::new(10.0, 5.0, "x", HistoryEnumSet::TRUE).is_err());
        assert!(DiscreteDataEntry::new(f64::NAN, 5.0, "x", HistoryEnumSet::TRUE).is_err());
        assert!(DiscreteDataEntry::new(0.0, f64::INFINITY, "x", HistoryEnumSet::TRUE).is_err());
    }

    #[test]
    fn test_series_are_sorted_and_checked_for_overlap() {
        let sorted = series(&[(2000.0, 4000.0, "b"), (1000.0, 2000.0, "a")]);
        assert_eq!(sorted.start(), Some(1000.0));
        assert_eq!(sorted.end(), Some(4000.0));

        let overlapping = DiscreteSeries::new(vec![
            entry(1000.0, 2500.0, "a", 1),
            entry(2000.0, 4000.0, "b", 1),
        ]);
        assert!(overlapping.is_err());
    }

    #[test]
    fn test_find_entry_index() {
        let series = series(&[(1000.0, 2000.0, "a"), (2000.0, 4000.0, "b")]);
        assert_eq!(series.find_entry_index(0.0), None);
        assert_eq!(series.find_entry_index(1000.0), Some(0));
        assert_eq!(series.find_entry_index(1001.0), Some(0));
        assert_eq!(series.find_entry_index(1999.0), Some(0));
        assert_eq!(series.find_entry_index(2000.0), Some(1));
        assert_eq!(series.find_entry_index(2001.0), Some(1));
        assert_eq!(series.find_entry_index(3999.0), Some(1));
        assert_eq!(series.find_entry_index(4000.0), None);
    }

    #[test]
    fn test_find_entry_index_in_gap() {
        let series = series(&[(1000.0, 1500.0, "a"), (2000.0, 4000.0, "b")]);
        assert_eq!(series.find_entry_index(1750.0), None);
        assert_eq!(DiscreteSeries::default().find_entry_index(1000.0), None);
    }

    #[test]
    fn test_timestamps_for_sampling_period() {
        let timestamps = timestamps_for_sampling_period(1000.0, 2001.0, SamplingPeriod::EveryHundredMillis);
        assert_eq!(timestamps.len(), 12);
        assert_eq!(timestamps[0], 1000.0);
        assert_eq!(timestamps[10], 2000.0);
        assert_eq!(timestamps[11], 2001.0);

        let aligned = timestamps_for_sampling_period(1000.0, 2000.0, SamplingPeriod::EveryHundredMillis);
        assert_eq!(aligned.len(), 11);
        assert_eq!(aligned.last(), Some(&2000.0));

        assert_eq!(
            timestamps_for_sampling_period(5.0, 5.0, SamplingPeriod::EverySecond),
            vec![5.0]
        );
    }

    #[test]
    fn test_timestamps_from_entry_bounds() {
        let series = [
            series(&[(1000.0, 2000.0, "a"), (2000.0, 4000.0, "b")]),
            series(&[(500.0, 1800.0, "c"), (2200.0, 4500.0, "d")]),
        ];
        assert_eq!(
            timestamps_from_entry_bounds(&series),
            vec![500.0, 1000.0, 1800.0, 2000.0, 2200.0, 4000.0, 4500.0]
        );
    }

    #[test]
    fn test_all_timestamps_for_chunk() {
        let series = [
            series(&[(1000.0, 2000.0, "a"), (2000.0, 4000.0, "b")]),
            series(&[(800.0, 1800.0, "c"), (2200.0, 4500.0, "d")]),
        ];
        let timestamps = all_timestamps_for_chunk(&series, 800.0, 4600.0, SamplingPeriod::EveryHundredMillis);
        let expected: Vec<f64> = (8..=46).map(|step| step as f64 * 100.0).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn test_grid_contains_off_step_bounds() {
        let series = [series(&[(1000.0, 1050.0, "a"), (1077.0, 1234.0, "b")])];
        let timestamps = all_timestamps_for_chunk(&series, 1000.0, 1234.0, SamplingPeriod::EveryHundredMillis);
        assert_eq!(timestamps, vec![1000.0, 1050.0, 1077.0, 1100.0, 1200.0, 1234.0]);
    }

    #[test]
    fn test_simple() {
        let series = DiscreteSeries::new(vec![
            entry(1001.0, 2002.0, "the label", 1),
            entry(2002.0, 4003.0, "the label2", 2),
        ])
        .unwrap();
        let data = DiscreteTimelineData::new(vec![series]).with_default_entry_duration(1.0);

        let (chunk, sampling_period) = data.to_chunk(&configuration(1)).unwrap().unwrap();
        assert_eq!(sampling_period, SamplingPeriod::EveryMillisecond);
        assert_eq!(chunk.timestamp_count(), 3003);
        assert_eq!(chunk.first_timestamp(), Some(1001.0));
        assert_eq!(chunk.last_timestamp(), Some(4003.0));

        let id_at = |row: usize| chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(0), TimestampIndex(row));
        assert_eq!(id_at(0), ReferenceEntryId(1001));
        assert_eq!(id_at(1), ReferenceEntryId(1001));
        assert_eq!(id_at(1000), ReferenceEntryId(1001));
        assert_eq!(id_at(1001), ReferenceEntryId(1002));
        assert_eq!(id_at(1990), ReferenceEntryId(1002));
        assert_eq!(id_at(2000), ReferenceEntryId(1002));
        assert_eq!(id_at(3001), ReferenceEntryId(1002));
        assert_eq!(id_at(3002), ReferenceEntryId::NO_VALUE);
        assert_eq!(
            chunk.reference_entry_status_at(ReferenceEntrySeriesIndex(0), TimestampIndex(3002)),
            HistoryEnumSet::NO_VALUE
        );

        let first = chunk.reference_entry_data(ReferenceEntryId(1001)).unwrap();
        assert_eq!(first.label, "the label");
        assert_eq!((first.start, first.end), (1001.0, 2002.0));
        assert_eq!(chunk.reference_entry_data_count(), 2);
    }

    #[test]
    fn test_fixture() {
        let data = DiscreteTimelineData::new(vec![
            DiscreteSeries::new(vec![
                entry(1680598565461.0, 1680598566461.0, "Stumbled over switch", 2),
                entry(1680598566461.0, 1680598567461.0, "Turned switch off", 2),
            ])
            .unwrap(),
            DiscreteSeries::new(vec![
                entry(1680598565961.0, 1680598566961.0, "Everything is fine", 2),
                entry(1680598566961.0, 1680598567961.0, "Fuel is empty", 2),
            ])
            .unwrap(),
        ])
        .with_default_entry_duration(10.0);

        let (chunk, sampling_period) = data.to_chunk(&configuration(2)).unwrap().unwrap();
        assert_eq!(sampling_period, SamplingPeriod::EveryTenMillis);
        assert_eq!(chunk.first_timestamp(), Some(1680598565461.0));
        assert_eq!(chunk.last_timestamp(), Some(1680598567961.0));
        assert_eq!(chunk.timestamp_count(), 251);
        assert!(
            chunk
                .timestamps()
                .windows(2)
                .all(|pair| pair[1] - pair[0] <= sampling_period.distance())
        );

        // One id per interval
        assert_eq!(chunk.reference_entry_data_count(), 4);
        let last = TimestampIndex(chunk.timestamp_count() - 1);
        assert_eq!(
            chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(0), last),
            ReferenceEntryId::NO_VALUE
        );
        assert_eq!(
            chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(1), last),
            ReferenceEntryId::NO_VALUE
        );
        assert_eq!(
            chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(1), TimestampIndex(0)),
            ReferenceEntryId::NO_VALUE
        );
    }

    #[test]
    fn test_grid_contains_bounds_once() {
        let series = vec![
            series(&[(1000.0, 1333.0, "a")]),
            series(&[(1111.0, 1555.0, "b")]),
        ];
        let bounds = timestamps_from_entry_bounds(&series);
        let data = DiscreteTimelineData::new(series).with_default_entry_duration(100.0);
        let (chunk, _) = data.to_chunk(&configuration(2)).unwrap().unwrap();

        for bound in bounds {
            let count = chunk.timestamps().iter().filter(|t| **t == bound).count();
            assert_eq!(count, 1, "bound {bound}");
        }
    }

    #[test]
    fn test_status_change_allocates_new_id() {
        let series = DiscreteSeries::new(vec![
            entry(0.0, 100.0, "same", 1),
            entry(100.0, 200.0, "same", 1),
            entry(200.0, 300.0, "same", 2),
        ])
        .unwrap();
        let data = DiscreteTimelineData::new(vec![series]).with_default_entry_duration(2.5);
        let (chunk, _) = data.to_chunk(&configuration(1)).unwrap().unwrap();

        let id_at = |timestamp: f64| {
            let index = chunk.index_of_exact(timestamp).unwrap();
            chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(0), index)
        };
        // Label and status unchanged, the id carries over
        assert_eq!(id_at(50.0), id_at(150.0));
        assert_ne!(id_at(150.0), id_at(250.0));
        assert_eq!(chunk.reference_entry_data_count(), 2);
    }

    #[test]
    fn test_carried_id_data_covers_every_row() {
        let series = DiscreteSeries::new(vec![
            entry(0.0, 100.0, "same", 1),
            entry(100.0, 200.0, "same", 1),
            entry(200.0, 300.0, "other", 1),
        ])
        .unwrap();
        let data = DiscreteTimelineData::new(vec![series]).with_default_entry_duration(2.5);
        let (chunk, _) = data.to_chunk(&configuration(1)).unwrap().unwrap();

        for (index, timestamp) in chunk.timestamps().iter().enumerate() {
            let id = chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(0), TimestampIndex(index));
            if id.is_sentinel() {
                continue;
            }
            let data = chunk.reference_entry_data(id).unwrap();
            assert!(
                data.contains(*timestamp),
                "{timestamp} carries {id:?} but its data covers [{}, {})",
                data.start,
                data.end
            );
        }

        let index = chunk.index_of_exact(150.0).unwrap();
        let id = chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(0), index);
        let data = chunk.reference_entry_data(id).unwrap();
        assert_eq!((data.start, data.end), (0.0, 200.0));
    }

    #[test]
    fn test_gap_allocates_new_id() {
        let series = series(&[(0.0, 100.0, "same"), (200.0, 300.0, "same")]);
        let data = DiscreteTimelineData::new(vec![series]).with_default_entry_duration(2.5);
        let (chunk, _) = data.to_chunk(&configuration(1)).unwrap().unwrap();

        let id_at = |timestamp: f64| {
            let index = chunk.index_of_exact(timestamp).unwrap();
            chunk.reference_entry_id_at(ReferenceEntrySeriesIndex(0), index)
        };
        assert_eq!(id_at(150.0), ReferenceEntryId::NO_VALUE);
        assert_ne!(id_at(50.0), id_at(250.0));
    }

    #[test]
    fn test_empty_input() {
        let data = DiscreteTimelineData::new(vec![DiscreteSeries::default(), DiscreteSeries::default()]);
        assert!(data.to_chunk(&configuration(2)).unwrap().is_none());
    }

    #[test]
    fn test_series_count_mismatch() {
        let data = DiscreteTimelineData::new(vec![series(&[(0.0, 10.0, "a")])]);
        let result = data.to_chunk(&configuration(2));
        assert!(matches!(
            result,
            Err(HistoryError::SeriesCountMismatch {
                kind: SeriesKind::ReferenceEntry,
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_other_series_kinds_are_filled_with_no_value() {
        let configuration = Arc::new(
            HistoryConfiguration::builder()
                .decimal_series(DataSeriesId(1), "value", None)
                .reference_entry_series(DataSeriesId(2), "events", HistoryEnum::boolean())
                .build()
                .unwrap(),
        );
        let data = DiscreteTimelineData::new(vec![series(&[(0.0, 1000.0, "a")])]);
        let (chunk, _) = data.to_chunk(&configuration).unwrap().unwrap();
        assert_eq!(chunk.find_min_max(crate::storage::configuration::DecimalSeriesIndex(0)), None);
    }
}
