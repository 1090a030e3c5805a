//! Schema of a history dataset.
//!
//! A [`HistoryConfiguration`] lists the decimal, enum and reference-entry series
//! in a fixed order. Chunks are only valid against the configuration they were
//! built with.

use core::fmt::{Display, Write};
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::enum_set::{HistoryEnumOrdinal, HistoryEnumSet};
use crate::error::{HistoryError, Result};

/// Externally assigned id of a data series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataSeriesId(pub u32);

impl Display for DataSeriesId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The three kinds of series a chunk stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKind {
    Decimal,
    Enum,
    ReferenceEntry,
}

impl Display for SeriesKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Decimal => f.write_str("decimal"),
            Self::Enum => f.write_str("enum"),
            Self::ReferenceEntry => f.write_str("reference entry"),
        }
    }
}

/// Index of a timestamp within a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampIndex(pub usize);

/// Index of a decimal series within a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalSeriesIndex(pub usize);

/// Index of an enum series within a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnumSeriesIndex(pub usize);

/// Index of a reference-entry series within a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceEntrySeriesIndex(pub usize);

/// One option of an enum vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEnumOption {
    pub ordinal: HistoryEnumOrdinal,
    pub label: String,
}

/// Vocabulary of an enum series, ordinals are `0..options.len()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEnum {
    pub name: String,
    options: Vec<HistoryEnumOption>,
}

impl HistoryEnum {
    /// Creates a vocabulary from option labels, assigning ordinals in order
    pub fn new(name: impl Into<String>, labels: &[&str]) -> Result<Self> {
        if labels.len() > HistoryEnumSet::MAX_ORDINALS {
            return Err(HistoryError::InvalidOrdinal {
                ordinal: labels.len() as u16 - 1,
                max: HistoryEnumOrdinal::MAX.0,
            });
        }

        let options = labels
            .iter()
            .enumerate()
            .map(|(ordinal, label)| HistoryEnumOption {
                ordinal: HistoryEnumOrdinal(ordinal as u16),
                label: (*label).to_string(),
            })
            .collect();

        Ok(Self {
            name: name.into(),
            options,
        })
    }

    /// The `false` / `true` vocabulary
    pub fn boolean() -> Self {
        Self {
            name: "Boolean".to_string(),
            options: vec![
                HistoryEnumOption {
                    ordinal: HistoryEnumOrdinal(0),
                    label: "false".to_string(),
                },
                HistoryEnumOption {
                    ordinal: HistoryEnumOrdinal(1),
                    label: "true".to_string(),
                },
            ],
        }
    }

    pub fn options(&self) -> &[HistoryEnumOption] {
        &self.options
    }

    pub fn label(&self, ordinal: HistoryEnumOrdinal) -> Option<&str> {
        self.options
            .get(ordinal.0 as usize)
            .map(|option| option.label.as_str())
    }

    /// Rejects sets containing ordinals this vocabulary does not define
    pub fn validate(&self, set: HistoryEnumSet) -> Result<()> {
        let mut invalid = None;
        set.for_each_set_ordinal(|ordinal| {
            if ordinal.0 as usize >= self.options.len() && invalid.is_none() {
                invalid = Some(ordinal);
            }
        });

        match invalid {
            Some(ordinal) => Err(HistoryError::InvalidOrdinal {
                ordinal: ordinal.0,
                max: self.options.len().saturating_sub(1) as u16,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimalSeriesDescriptor {
    pub id: DataSeriesId,
    pub display_name: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumSeriesDescriptor {
    pub id: DataSeriesId,
    pub display_name: String,
    pub vocabulary: HistoryEnum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntrySeriesDescriptor {
    pub id: DataSeriesId,
    pub display_name: String,
    /// Vocabulary of the per-sample status bitset
    pub status_vocabulary: HistoryEnum,
}

/// Immutable schema of the series stored in a chunk
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryConfiguration {
    decimal_series: Vec<DecimalSeriesDescriptor>,
    enum_series: Vec<EnumSeriesDescriptor>,
    reference_entry_series: Vec<ReferenceEntrySeriesDescriptor>,
}

impl HistoryConfiguration {
    /// A configuration without any series
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> HistoryConfigurationBuilder {
        HistoryConfigurationBuilder::default()
    }

    pub fn decimal_series_count(&self) -> usize {
        self.decimal_series.len()
    }

    pub fn enum_series_count(&self) -> usize {
        self.enum_series.len()
    }

    pub fn reference_entry_series_count(&self) -> usize {
        self.reference_entry_series.len()
    }

    pub fn series_count(&self, kind: SeriesKind) -> usize {
        match kind {
            SeriesKind::Decimal => self.decimal_series_count(),
            SeriesKind::Enum => self.enum_series_count(),
            SeriesKind::ReferenceEntry => self.reference_entry_series_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decimal_series.is_empty()
            && self.enum_series.is_empty()
            && self.reference_entry_series.is_empty()
    }

    pub fn decimal_series(&self, index: DecimalSeriesIndex) -> Option<&DecimalSeriesDescriptor> {
        self.decimal_series.get(index.0)
    }

    pub fn enum_series(&self, index: EnumSeriesIndex) -> Option<&EnumSeriesDescriptor> {
        self.enum_series.get(index.0)
    }

    pub fn reference_entry_series(
        &self,
        index: ReferenceEntrySeriesIndex,
    ) -> Option<&ReferenceEntrySeriesDescriptor> {
        self.reference_entry_series.get(index.0)
    }

    pub fn decimal_series_index(&self, id: DataSeriesId) -> Option<DecimalSeriesIndex> {
        self.decimal_series
            .iter()
            .position(|series| series.id == id)
            .map(DecimalSeriesIndex)
    }

    pub fn enum_series_index(&self, id: DataSeriesId) -> Option<EnumSeriesIndex> {
        self.enum_series
            .iter()
            .position(|series| series.id == id)
            .map(EnumSeriesIndex)
    }

    pub fn reference_entry_series_index(&self, id: DataSeriesId) -> Option<ReferenceEntrySeriesIndex> {
        self.reference_entry_series
            .iter()
            .position(|series| series.id == id)
            .map(ReferenceEntrySeriesIndex)
    }

    pub(crate) fn decimal_ids(&self) -> impl Iterator<Item = DataSeriesId> + '_ {
        self.decimal_series.iter().map(|series| series.id)
    }

    pub(crate) fn enum_ids(&self) -> impl Iterator<Item = DataSeriesId> + '_ {
        self.enum_series.iter().map(|series| series.id)
    }

    pub(crate) fn reference_entry_ids(&self) -> impl Iterator<Item = DataSeriesId> + '_ {
        self.reference_entry_series.iter().map(|series| series.id)
    }

    /// Human readable listing of all series
    pub fn dump(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_dump(&mut out);
        out
    }

    fn write_dump(&self, out: &mut String) -> core::fmt::Result {
        writeln!(out, "Decimal series ({}):", self.decimal_series.len())?;
        for (index, series) in self.decimal_series.iter().enumerate() {
            writeln!(
                out,
                "  {index:>3} id {:>5} {} [{}]",
                series.id,
                series.display_name,
                series.unit.as_deref().unwrap_or("")
            )?;
        }

        writeln!(out, "Enum series ({}):", self.enum_series.len())?;
        for (index, series) in self.enum_series.iter().enumerate() {
            writeln!(
                out,
                "  {index:>3} id {:>5} {} ({})",
                series.id, series.display_name, series.vocabulary.name
            )?;
        }

        writeln!(
            out,
            "Reference entry series ({}):",
            self.reference_entry_series.len()
        )?;
        for (index, series) in self.reference_entry_series.iter().enumerate() {
            writeln!(
                out,
                "  {index:>3} id {:>5} {} ({})",
                series.id, series.display_name, series.status_vocabulary.name
            )?;
        }
        Ok(())
    }
}

/// Collects series descriptors in order
#[derive(Debug, Default)]
pub struct HistoryConfigurationBuilder {
    configuration: HistoryConfiguration,
}

impl HistoryConfigurationBuilder {
    pub fn decimal_series(
        mut self,
        id: DataSeriesId,
        display_name: impl Into<String>,
        unit: Option<&str>,
    ) -> Self {
        self.configuration
            .decimal_series
            .push(DecimalSeriesDescriptor {
                id,
                display_name: display_name.into(),
                unit: unit.map(str::to_string),
            });
        self
    }

    pub fn enum_series(
        mut self,
        id: DataSeriesId,
        display_name: impl Into<String>,
        vocabulary: HistoryEnum,
    ) -> Self {
        self.configuration.enum_series.push(EnumSeriesDescriptor {
            id,
            display_name: display_name.into(),
            vocabulary,
        });
        self
    }

    pub fn reference_entry_series(
        mut self,
        id: DataSeriesId,
        display_name: impl Into<String>,
        status_vocabulary: HistoryEnum,
    ) -> Self {
        self.configuration
            .reference_entry_series
            .push(ReferenceEntrySeriesDescriptor {
                id,
                display_name: display_name.into(),
                status_vocabulary,
            });
        self
    }

    /// Finishes the configuration, rejecting ids used twice within one kind
    pub fn build(self) -> Result<HistoryConfiguration> {
        let configuration = self.configuration;
        check_unique(configuration.decimal_ids())?;
        check_unique(configuration.enum_ids())?;
        check_unique(configuration.reference_entry_ids())?;
        Ok(configuration)
    }
}

fn check_unique(ids: impl Iterator<Item = DataSeriesId>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(HistoryError::DuplicateSeriesId(id));
        }
    }
    Ok(())
}
