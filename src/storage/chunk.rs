//! Immutable columnar block of samples.
//!
//! A [`HistoryChunk`] stores ascending, unique timestamps plus one column per
//! series. Chunks are built by a [`super::HistoryChunkAppender`] and never
//! change afterwards.
//!
//! Decimal gaps use reserved floating point values:
//! - `NoValue`: NaN, no data was recorded
//! - `Pending`: `f64::MAX`, recording is still in progress
//!
//! Compare through [`DecimalSentinel`], never by value.

use core::cmp::Ordering;
use core::fmt::{Display, Write};
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::configuration::{
    DecimalSeriesIndex, EnumSeriesIndex, HistoryConfiguration, ReferenceEntrySeriesIndex,
    TimestampIndex,
};
use super::enum_set::{HistoryEnumOrdinal, HistoryEnumSet};
use super::reference::{ReferenceEntryData, ReferenceEntryId};
use crate::error::{HistoryError, Result};

/// Decimal value meaning "no data recorded"
pub const NO_VALUE: f64 = f64::NAN;
/// Decimal value meaning "recording in progress"
pub const PENDING: f64 = f64::MAX;

/// Named predicates for the decimal sentinels
pub trait DecimalSentinel: Copy {
    fn is_no_value(self) -> bool;
    fn is_pending(self) -> bool;

    /// True for real measurements
    fn is_measured(self) -> bool {
        !self.is_no_value() && !self.is_pending()
    }
}

impl DecimalSentinel for f64 {
    fn is_no_value(self) -> bool {
        self.is_nan()
    }

    fn is_pending(self) -> bool {
        self == PENDING
    }
}

/// Minimum of two decimals that treats `Pending` as absent, then `NoValue`
pub fn min_history_aware(a: f64, b: f64) -> f64 {
    merge_history_aware(a, b, f64::min)
}

/// Maximum of two decimals that treats `Pending` as absent, then `NoValue`
pub fn max_history_aware(a: f64, b: f64) -> f64 {
    merge_history_aware(a, b, f64::max)
}

fn merge_history_aware(a: f64, b: f64, merge: fn(f64, f64) -> f64) -> f64 {
    match (a, b) {
        (a, b) if a.is_pending() => b,
        (a, b) if b.is_pending() => a,
        (a, b) if a.is_no_value() => b,
        (a, b) if b.is_no_value() => a,
        (a, b) => merge(a, b),
    }
}

/// How the samples of a chunk came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingType {
    /// Raw samples as delivered by a producer
    Measured,
    /// Samples merged from a finer resolution
    Calculated,
}

/// Extra columns carried by calculated chunks, indexed `[series][timestamp]`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculatedColumns {
    pub decimal_min: Vec<Vec<f64>>,
    pub decimal_max: Vec<Vec<f64>>,
    pub enum_most_time: Vec<Vec<HistoryEnumOrdinal>>,
    pub reference_entry_id_counts: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryChunk {
    pub(crate) configuration: Arc<HistoryConfiguration>,
    pub(crate) recording_type: RecordingType,
    pub(crate) timestamps: Vec<f64>,
    pub(crate) decimal_values: Vec<Vec<f64>>,
    pub(crate) enum_values: Vec<Vec<HistoryEnumSet>>,
    pub(crate) reference_entry_ids: Vec<Vec<ReferenceEntryId>>,
    pub(crate) reference_entry_statuses: Vec<Vec<HistoryEnumSet>>,
    pub(crate) reference_entry_data: BTreeMap<ReferenceEntryId, ReferenceEntryData>,
    pub(crate) calculated: Option<CalculatedColumns>,
}

impl HistoryChunk {
    pub fn configuration(&self) -> &Arc<HistoryConfiguration> {
        &self.configuration
    }

    pub fn recording_type(&self) -> RecordingType {
        self.recording_type
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn timestamp_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamp_at(&self, index: TimestampIndex) -> f64 {
        self.timestamps[index.0]
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Binary search for `timestamp`
    pub fn index_of_exact(&self, timestamp: f64) -> Option<TimestampIndex> {
        self.timestamps
            .binary_search_by(|t| t.total_cmp(&timestamp))
            .ok()
            .map(TimestampIndex)
    }

    /// Number of timestamps `<= timestamp`
    pub(crate) fn count_up_to(&self, timestamp: f64) -> usize {
        self.timestamps.partition_point(|t| *t <= timestamp)
    }

    pub fn decimal_value_at(&self, series: DecimalSeriesIndex, index: TimestampIndex) -> f64 {
        self.decimal_values[series.0][index.0]
    }

    pub fn enum_value_at(&self, series: EnumSeriesIndex, index: TimestampIndex) -> HistoryEnumSet {
        self.enum_values[series.0][index.0]
    }

    pub fn reference_entry_id_at(
        &self,
        series: ReferenceEntrySeriesIndex,
        index: TimestampIndex,
    ) -> ReferenceEntryId {
        self.reference_entry_ids[series.0][index.0]
    }

    pub fn reference_entry_status_at(
        &self,
        series: ReferenceEntrySeriesIndex,
        index: TimestampIndex,
    ) -> HistoryEnumSet {
        self.reference_entry_statuses[series.0][index.0]
    }

    pub fn reference_entry_data(&self, id: ReferenceEntryId) -> Option<&ReferenceEntryData> {
        self.reference_entry_data.get(&id)
    }

    pub fn reference_entry_data_count(&self) -> usize {
        self.reference_entry_data.len()
    }

    /// Minimum at the sample; the value itself for measured chunks
    pub fn decimal_min_at(&self, series: DecimalSeriesIndex, index: TimestampIndex) -> f64 {
        match &self.calculated {
            Some(calculated) => calculated.decimal_min[series.0][index.0],
            None => self.decimal_value_at(series, index),
        }
    }

    /// Maximum at the sample; the value itself for measured chunks
    pub fn decimal_max_at(&self, series: DecimalSeriesIndex, index: TimestampIndex) -> f64 {
        match &self.calculated {
            Some(calculated) => calculated.decimal_max[series.0][index.0],
            None => self.decimal_value_at(series, index),
        }
    }

    /// The ordinal active for most of the sample's time span
    pub fn enum_ordinal_most_time_at(
        &self,
        series: EnumSeriesIndex,
        index: TimestampIndex,
    ) -> HistoryEnumOrdinal {
        match &self.calculated {
            Some(calculated) => calculated.enum_most_time[series.0][index.0],
            None => self.enum_value_at(series, index).first_set_ordinal(),
        }
    }

    /// Number of distinct reference entries merged into the sample
    pub fn reference_entry_id_count_at(
        &self,
        series: ReferenceEntrySeriesIndex,
        index: TimestampIndex,
    ) -> u32 {
        match &self.calculated {
            Some(calculated) => calculated.reference_entry_id_counts[series.0][index.0],
            None => u32::from(!self.reference_entry_id_at(series, index).is_sentinel()),
        }
    }

    /// Whether the row is still being recorded.
    ///
    /// Read from the first decimal series, else the first enum series, else the
    /// first reference entry series.
    pub fn is_pending(&self, index: TimestampIndex) -> bool {
        if let Some(column) = self.decimal_values.first() {
            return column[index.0].is_pending();
        }
        if let Some(column) = self.enum_values.first() {
            return column[index.0].is_pending();
        }
        if let Some(column) = self.reference_entry_ids.first() {
            return column[index.0].is_pending();
        }
        false
    }

    /// Smallest and largest real value of a decimal series, sentinels ignored
    pub fn find_min_max(&self, series: DecimalSeriesIndex) -> Option<(f64, f64)> {
        let (min_column, max_column) = match &self.calculated {
            Some(calculated) => (
                &calculated.decimal_min[series.0],
                &calculated.decimal_max[series.0],
            ),
            None => (&self.decimal_values[series.0], &self.decimal_values[series.0]),
        };

        let min = min_column
            .iter()
            .copied()
            .filter(|value| value.is_measured())
            .reduce(f64::min)?;
        let max = max_column
            .iter()
            .copied()
            .filter(|value| value.is_measured())
            .reduce(f64::max)?;
        Some((min, max))
    }

    /// Checks the structural invariants of a chunk that did not come from an appender
    pub(crate) fn validate(&self) -> Result<()> {
        let count = self.timestamps.len();

        if let Some(timestamp) = self.timestamps.iter().find(|timestamp| !timestamp.is_finite()) {
            return Err(HistoryError::NonFiniteTimestamp(*timestamp));
        }

        if let Some(pair) = self
            .timestamps
            .windows(2)
            .find(|pair| pair[0].partial_cmp(&pair[1]) != Some(Ordering::Less))
        {
            return Err(HistoryError::NonMonotonicTimestamp {
                previous: pair[0],
                timestamp: pair[1],
            });
        }

        let configuration = &self.configuration;
        check_columns("decimal", &self.decimal_values, configuration.decimal_series_count(), count)?;
        check_columns("enum", &self.enum_values, configuration.enum_series_count(), count)?;
        check_columns(
            "reference entry id",
            &self.reference_entry_ids,
            configuration.reference_entry_series_count(),
            count,
        )?;
        check_columns(
            "reference entry status",
            &self.reference_entry_statuses,
            configuration.reference_entry_series_count(),
            count,
        )?;

        match (&self.calculated, self.recording_type) {
            (None, RecordingType::Measured) => Ok(()),
            (Some(calculated), RecordingType::Calculated) => {
                check_columns("minimum", &calculated.decimal_min, configuration.decimal_series_count(), count)?;
                check_columns("maximum", &calculated.decimal_max, configuration.decimal_series_count(), count)?;
                check_columns(
                    "most time ordinal",
                    &calculated.enum_most_time,
                    configuration.enum_series_count(),
                    count,
                )?;
                check_columns(
                    "reference entry count",
                    &calculated.reference_entry_id_counts,
                    configuration.reference_entry_series_count(),
                    count,
                )
            }
            _ => Err(HistoryError::CorruptChunk(
                "recording type does not match the stored columns".to_string(),
            )),
        }
    }

    /// Human readable rendering, one line per timestamp
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

fn check_columns<T>(name: &str, columns: &[Vec<T>], series: usize, timestamps: usize) -> Result<()> {
    if columns.len() != series {
        return Err(HistoryError::CorruptChunk(format!(
            "{} {name} columns stored, {series} expected",
            columns.len()
        )));
    }
    if let Some(column) = columns.iter().find(|column| column.len() != timestamps) {
        return Err(HistoryError::CorruptChunk(format!(
            "{name} column holds {} values for {timestamps} timestamps",
            column.len()
        )));
    }
    Ok(())
}

struct DecimalCell(f64);

impl Display for DecimalCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0.is_no_value() {
            f.pad("-")
        } else if self.0.is_pending() {
            f.pad("?")
        } else {
            f.pad(&self.0.to_string())
        }
    }
}

impl Display for HistoryChunk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let configuration = &self.configuration;

        writeln!(
            f,
            "{:?} chunk, {} timestamps, {} reference entries",
            self.recording_type,
            self.timestamps.len(),
            self.reference_entry_data.len()
        )?;

        f.write_str("IDs:                   ")?;
        for id in configuration.decimal_ids() {
            write!(f, "{:>10} ", id)?;
        }
        f.write_str("| ")?;
        for id in configuration.enum_ids() {
            write!(f, "{:>10} ", id)?;
        }
        f.write_str("| ")?;
        for id in configuration.reference_entry_ids() {
            write!(f, "{:>10} ", id)?;
        }
        f.write_char('\n')?;

        for (row, timestamp) in self.timestamps.iter().enumerate() {
            let index = TimestampIndex(row);
            write!(f, "{row:>5} {timestamp:>16} ")?;

            for series in 0..configuration.decimal_series_count() {
                let value = self.decimal_value_at(DecimalSeriesIndex(series), index);
                write!(f, "{:>10} ", DecimalCell(value))?;
            }
            f.write_str("| ")?;

            for series in 0..configuration.enum_series_count() {
                let series = EnumSeriesIndex(series);
                let value = self.enum_value_at(series, index);
                let winner = self.enum_ordinal_most_time_at(series, index);
                write!(f, "{:>10} ({}) ", value.to_string(), winner)?;
            }
            f.write_str("| ")?;

            for series in 0..configuration.reference_entry_series_count() {
                let series = ReferenceEntrySeriesIndex(series);
                let id = self.reference_entry_id_at(series, index);
                let status = self.reference_entry_status_at(series, index);
                let count = self.reference_entry_id_count_at(series, index);
                write!(f, "{:>10} {:>4} ({}) ", id.to_string(), status.to_string(), count)?;
            }
            f.write_char('\n')?;
        }
        Ok(())
    }
}
