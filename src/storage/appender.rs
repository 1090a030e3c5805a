//! Append-only builder for [`HistoryChunk`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::accumulator::DownSampledRow;
use super::chunk::{CalculatedColumns, HistoryChunk, RecordingType};
use super::configuration::{EnumSeriesIndex, HistoryConfiguration, ReferenceEntrySeriesIndex, SeriesKind};
use super::enum_set::HistoryEnumSet;
use super::reference::{ReferenceEntryData, ReferenceEntryId};
use crate::error::{HistoryError, Result};

/// Reference entry id plus status of one series at one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceEntryCell {
    pub id: ReferenceEntryId,
    pub status: HistoryEnumSet,
}

impl ReferenceEntryCell {
    pub const NO_VALUE: Self = Self {
        id: ReferenceEntryId::NO_VALUE,
        status: HistoryEnumSet::NO_VALUE,
    };

    pub const PENDING: Self = Self {
        id: ReferenceEntryId::PENDING,
        status: HistoryEnumSet::PENDING,
    };

    pub const fn new(id: ReferenceEntryId, status: HistoryEnumSet) -> Self {
        Self { id, status }
    }
}

/// Builds a chunk row by row.
///
/// Every row must carry one value per configured series and a timestamp
/// strictly greater than the previous one. A rejected row leaves the appender
/// unchanged.
#[derive(Debug)]
pub struct HistoryChunkAppender {
    chunk: HistoryChunk,
}

impl HistoryChunkAppender {
    /// Appender for raw (measured) samples
    pub fn new(configuration: Arc<HistoryConfiguration>) -> Self {
        Self::with_recording_type(configuration, RecordingType::Measured)
    }

    /// Appender for down-sampled rows
    pub fn calculated(configuration: Arc<HistoryConfiguration>) -> Self {
        Self::with_recording_type(configuration, RecordingType::Calculated)
    }

    fn with_recording_type(configuration: Arc<HistoryConfiguration>, recording_type: RecordingType) -> Self {
        let decimals = configuration.decimal_series_count();
        let enums = configuration.enum_series_count();
        let references = configuration.reference_entry_series_count();

        let calculated = match recording_type {
            RecordingType::Measured => None,
            RecordingType::Calculated => Some(CalculatedColumns {
                decimal_min: vec![Vec::new(); decimals],
                decimal_max: vec![Vec::new(); decimals],
                enum_most_time: vec![Vec::new(); enums],
                reference_entry_id_counts: vec![Vec::new(); references],
            }),
        };

        Self {
            chunk: HistoryChunk {
                configuration,
                recording_type,
                timestamps: Vec::new(),
                decimal_values: vec![Vec::new(); decimals],
                enum_values: vec![Vec::new(); enums],
                reference_entry_ids: vec![Vec::new(); references],
                reference_entry_statuses: vec![Vec::new(); references],
                reference_entry_data: BTreeMap::new(),
                calculated,
            },
        }
    }

    pub fn configuration(&self) -> &Arc<HistoryConfiguration> {
        &self.chunk.configuration
    }

    pub fn len(&self) -> usize {
        self.chunk.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.timestamps.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.chunk.last_timestamp()
    }

    /// Registers the data for a reference entry id, replacing earlier data for the same id
    pub fn insert_reference_entry_data(&mut self, data: ReferenceEntryData) {
        self.chunk.reference_entry_data.insert(data.id, data);
    }

    /// Appends one measured row
    pub fn append(
        &mut self,
        timestamp: f64,
        decimals: &[f64],
        enums: &[HistoryEnumSet],
        reference_entries: &[ReferenceEntryCell],
    ) -> Result<()> {
        self.check_row(timestamp, decimals.len(), enums, reference_entries.len())?;
        self.check_statuses(reference_entries.iter().map(|cell| cell.status))?;

        self.chunk.timestamps.push(timestamp);
        push_row(&mut self.chunk.decimal_values, decimals.iter().copied());
        push_row(&mut self.chunk.enum_values, enums.iter().copied());
        push_row(
            &mut self.chunk.reference_entry_ids,
            reference_entries.iter().map(|cell| cell.id),
        );
        push_row(
            &mut self.chunk.reference_entry_statuses,
            reference_entries.iter().map(|cell| cell.status),
        );

        if let Some(calculated) = &mut self.chunk.calculated {
            // Measured rows in a calculated chunk describe themselves
            push_row(&mut calculated.decimal_min, decimals.iter().copied());
            push_row(&mut calculated.decimal_max, decimals.iter().copied());
            push_row(
                &mut calculated.enum_most_time,
                enums.iter().map(|set| set.first_set_ordinal()),
            );
            push_row(
                &mut calculated.reference_entry_id_counts,
                reference_entries
                    .iter()
                    .map(|cell| u32::from(!cell.id.is_sentinel())),
            );
        }
        Ok(())
    }

    /// Appends one down-sampled row.
    ///
    /// On a measured appender only the primary values are kept.
    pub fn append_calculated(&mut self, timestamp: f64, row: &DownSampledRow) -> Result<()> {
        self.check_row(
            timestamp,
            row.averages.len(),
            &row.enum_unions,
            row.reference_entry_ids.len(),
        )?;
        check_len(SeriesKind::Decimal, self.configuration().decimal_series_count(), row.minimums.len())?;
        check_len(SeriesKind::Decimal, self.configuration().decimal_series_count(), row.maximums.len())?;
        check_len(SeriesKind::Enum, self.configuration().enum_series_count(), row.enum_most_time.len())?;
        let references = self.configuration().reference_entry_series_count();
        check_len(SeriesKind::ReferenceEntry, references, row.reference_entry_id_counts.len())?;
        check_len(SeriesKind::ReferenceEntry, references, row.reference_entry_statuses.len())?;
        self.check_statuses(row.reference_entry_statuses.iter().copied())?;

        self.chunk.timestamps.push(timestamp);
        push_row(&mut self.chunk.decimal_values, row.averages.iter().copied());
        push_row(&mut self.chunk.enum_values, row.enum_unions.iter().copied());
        push_row(
            &mut self.chunk.reference_entry_ids,
            row.reference_entry_ids.iter().copied(),
        );
        push_row(
            &mut self.chunk.reference_entry_statuses,
            row.reference_entry_statuses.iter().copied(),
        );

        if let Some(calculated) = &mut self.chunk.calculated {
            push_row(&mut calculated.decimal_min, row.minimums.iter().copied());
            push_row(&mut calculated.decimal_max, row.maximums.iter().copied());
            push_row(&mut calculated.enum_most_time, row.enum_most_time.iter().copied());
            push_row(
                &mut calculated.reference_entry_id_counts,
                row.reference_entry_id_counts.iter().copied(),
            );
        }
        Ok(())
    }

    fn check_row(
        &self,
        timestamp: f64,
        decimals: usize,
        enums: &[HistoryEnumSet],
        reference_entries: usize,
    ) -> Result<()> {
        let configuration = self.configuration();
        check_len(SeriesKind::Decimal, configuration.decimal_series_count(), decimals)?;
        check_len(SeriesKind::Enum, configuration.enum_series_count(), enums.len())?;
        check_len(
            SeriesKind::ReferenceEntry,
            configuration.reference_entry_series_count(),
            reference_entries,
        )?;

        if !timestamp.is_finite() {
            return Err(HistoryError::NonFiniteTimestamp(timestamp));
        }
        if let Some(previous) = self.last_timestamp()
            && timestamp <= previous
        {
            return Err(HistoryError::NonMonotonicTimestamp { previous, timestamp });
        }

        for (series, set) in enums.iter().enumerate() {
            if let Some(descriptor) = configuration.enum_series(EnumSeriesIndex(series)) {
                descriptor.vocabulary.validate(*set)?;
            }
        }
        Ok(())
    }

    fn check_statuses(&self, statuses: impl Iterator<Item = HistoryEnumSet>) -> Result<()> {
        let configuration = self.configuration();
        for (series, status) in statuses.enumerate() {
            if let Some(descriptor) = configuration.reference_entry_series(ReferenceEntrySeriesIndex(series)) {
                descriptor.status_vocabulary.validate(status)?;
            }
        }
        Ok(())
    }

    /// Freezes the collected rows
    pub fn finish(self) -> HistoryChunk {
        self.chunk
    }
}

fn check_len(kind: SeriesKind, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(HistoryError::SeriesCountMismatch {
            kind,
            expected,
            actual,
        })
    }
}

fn push_row<T>(columns: &mut [Vec<T>], row: impl Iterator<Item = T>) {
    for (column, value) in columns.iter_mut().zip(row) {
        column.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::chunk::{NO_VALUE, PENDING};
    use crate::storage::configuration::{
        DataSeriesId, DecimalSeriesIndex, HistoryEnum, TimestampIndex,
    };

    fn configuration() -> Arc<HistoryConfiguration> {
        Arc::new(
            HistoryConfiguration::builder()
                .decimal_series(DataSeriesId(1), "a", None)
                .decimal_series(DataSeriesId(2), "b", None)
                .enum_series(DataSeriesId(3), "c", HistoryEnum::boolean())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_append_rows() {
        let mut appender = HistoryChunkAppender::new(configuration());
        appender
            .append(10.0, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[])
            .unwrap();
        appender
            .append(20.0, &[NO_VALUE, PENDING], &[HistoryEnumSet::NO_VALUE], &[])
            .unwrap();
        assert_eq!(appender.len(), 2);

        let chunk = appender.finish();
        assert_eq!(chunk.timestamps(), &[10.0, 20.0]);
        assert_eq!(
            chunk.decimal_value_at(DecimalSeriesIndex(1), TimestampIndex(0)),
            2.0
        );
    }

    #[test]
    fn test_series_count_mismatch() {
        let mut appender = HistoryChunkAppender::new(configuration());
        let result = appender.append(10.0, &[1.0], &[HistoryEnumSet::TRUE], &[]);
        assert!(matches!(
            result,
            Err(HistoryError::SeriesCountMismatch {
                kind: SeriesKind::Decimal,
                expected: 2,
                actual: 1
            })
        ));

        let result = appender.append(10.0, &[1.0, 2.0], &[], &[]);
        assert!(matches!(
            result,
            Err(HistoryError::SeriesCountMismatch {
                kind: SeriesKind::Enum,
                ..
            })
        ));
        assert!(appender.is_empty(), "rejected rows must not be stored");
    }

    #[test]
    fn test_non_monotonic_timestamps() {
        let mut appender = HistoryChunkAppender::new(configuration());
        appender
            .append(10.0, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[])
            .unwrap();

        let duplicate = appender.append(10.0, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[]);
        assert!(matches!(
            duplicate,
            Err(HistoryError::NonMonotonicTimestamp {
                previous,
                timestamp
            }) if previous == 10.0 && timestamp == 10.0
        ));

        let earlier = appender.append(5.0, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[]);
        assert!(earlier.is_err());

        let nan = appender.append(f64::NAN, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[]);
        assert!(nan.is_err());
        assert_eq!(appender.len(), 1);
    }

    #[test]
    fn test_non_finite_timestamps_are_rejected() {
        for timestamp in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let mut appender = HistoryChunkAppender::new(configuration());
            let result = appender.append(timestamp, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[]);
            assert!(
                matches!(result, Err(HistoryError::NonFiniteTimestamp(_))),
                "{timestamp} must be rejected"
            );
            assert!(appender.is_empty());
        }

        let mut appender = HistoryChunkAppender::new(configuration());
        appender
            .append(10.0, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[])
            .unwrap();
        let result = appender.append(f64::INFINITY, &[1.0, 2.0], &[HistoryEnumSet::TRUE], &[]);
        assert!(matches!(result, Err(HistoryError::NonFiniteTimestamp(_))));
        assert_eq!(appender.len(), 1);
    }

    #[test]
    fn test_reference_statuses_are_checked_against_vocabulary() {
        let configuration = Arc::new(
            HistoryConfiguration::builder()
                .reference_entry_series(DataSeriesId(1), "events", HistoryEnum::boolean())
                .build()
                .unwrap(),
        );
        let mut appender = HistoryChunkAppender::new(configuration);
        let id = ReferenceEntryId(1001);

        let status = HistoryEnumSet::from_bits(0b1000).unwrap();
        let result = appender.append(10.0, &[], &[], &[ReferenceEntryCell::new(id, status)]);
        assert!(matches!(
            result,
            Err(HistoryError::InvalidOrdinal { ordinal: 3, max: 1 })
        ));
        assert!(appender.is_empty());

        appender
            .append(10.0, &[], &[], &[ReferenceEntryCell::new(id, HistoryEnumSet::TRUE)])
            .unwrap();
        appender
            .append(11.0, &[], &[], &[ReferenceEntryCell::PENDING])
            .unwrap();
        assert_eq!(appender.len(), 2);
    }

    #[test]
    fn test_enum_values_are_checked_against_vocabulary() {
        let mut appender = HistoryChunkAppender::new(configuration());
        let set = HistoryEnumSet::from_bits(0b100).unwrap();
        let result = appender.append(10.0, &[1.0, 2.0], &[set], &[]);
        assert!(matches!(
            result,
            Err(HistoryError::InvalidOrdinal { ordinal: 2, max: 1 })
        ));
    }

    #[test]
    fn test_timestamps_strictly_ascending() {
        let mut appender = HistoryChunkAppender::new(configuration());
        for timestamp in [1.0, 2.0, 4.0, 8.0, 16.0] {
            appender
                .append(timestamp, &[timestamp, 0.0], &[HistoryEnumSet::FALSE], &[])
                .unwrap();
        }
        let chunk = appender.finish();
        assert!(chunk.timestamps().windows(2).all(|pair| pair[0] < pair[1]));
    }
}
