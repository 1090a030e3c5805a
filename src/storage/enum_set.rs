//! Bit-packed multi-state enum values.
//!
//! A [`HistoryEnumSet`] is a 32 bit pattern. Bits `0..=29` are data ordinals,
//! bit 30 alone marks a pending sample and bit 31 alone marks a missing sample.
//! Sentinel bits never appear together with data bits.

use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};

/// Ordinal of one enum option
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryEnumOrdinal(pub u16);

impl HistoryEnumOrdinal {
    pub const NO_VALUE: Self = Self(u16::MAX);
    pub const PENDING: Self = Self(u16::MAX - 1);
    /// Highest ordinal that can carry data
    pub const MAX: Self = Self(HistoryEnumSet::MAX_ORDINALS as u16 - 1);

    pub const fn is_no_value(self) -> bool {
        self.0 == Self::NO_VALUE.0
    }

    pub const fn is_pending(self) -> bool {
        self.0 == Self::PENDING.0
    }

    pub const fn is_sentinel(self) -> bool {
        self.is_no_value() || self.is_pending()
    }
}

impl Display for HistoryEnumOrdinal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::NO_VALUE => f.write_str("-"),
            Self::PENDING => f.write_str("?"),
            Self(ordinal) => write!(f, "{ordinal}"),
        }
    }
}

/// Set of enum ordinals active at (or within) one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEnumSet(u32);

/// Ordinals contained in one set
pub type SetOrdinals = heapless::Vec<HistoryEnumOrdinal, { HistoryEnumSet::MAX_ORDINALS }>;

impl HistoryEnumSet {
    /// Number of ordinals that can carry data
    pub const MAX_ORDINALS: usize = 30;

    const PENDING_BIT: u32 = 1 << 30;
    const NO_VALUE_BIT: u32 = 1 << 31;
    const DATA_MASK: u32 = Self::PENDING_BIT - 1;

    pub const NO_VALUE: Self = Self(Self::NO_VALUE_BIT);
    pub const PENDING: Self = Self(Self::PENDING_BIT);
    /// A set without any active ordinal
    pub const EMPTY: Self = Self(0);
    /// All data ordinals set
    pub const ALL: Self = Self(Self::DATA_MASK);

    /// Boolean `false` (ordinal 0)
    pub const FALSE: Self = Self(1);
    /// Boolean `true` (ordinal 1)
    pub const TRUE: Self = Self(1 << 1);

    /// Creates the single-ordinal set for `ordinal`.
    ///
    /// The sentinel ordinals map to the sentinel sets.
    pub fn for_ordinal(ordinal: HistoryEnumOrdinal) -> Result<Self> {
        match ordinal {
            HistoryEnumOrdinal::NO_VALUE => Ok(Self::NO_VALUE),
            HistoryEnumOrdinal::PENDING => Ok(Self::PENDING),
            HistoryEnumOrdinal(value) if (value as usize) < Self::MAX_ORDINALS => Ok(Self(1 << value)),
            HistoryEnumOrdinal(value) => Err(HistoryError::InvalidOrdinal {
                ordinal: value,
                max: HistoryEnumOrdinal::MAX.0,
            }),
        }
    }

    /// Creates a set from several data ordinals
    pub fn for_ordinals(ordinals: &[HistoryEnumOrdinal]) -> Result<Self> {
        ordinals.iter().try_fold(Self::EMPTY, |set, ordinal| {
            let single = Self::for_ordinal(*ordinal)?;
            Ok(set.union(single))
        })
    }

    /// Interprets a raw bit pattern, rejecting sentinel bits mixed with data bits
    pub fn from_bits(bits: u32) -> Result<Self> {
        let set = Self(bits);
        match bits {
            Self::NO_VALUE_BIT | Self::PENDING_BIT => Ok(set),
            _ if bits & !Self::DATA_MASK == 0 => Ok(set),
            _ => Err(HistoryError::InvalidOrdinal {
                ordinal: 31 - bits.leading_zeros() as u16,
                max: HistoryEnumOrdinal::MAX.0,
            }),
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_no_value(self) -> bool {
        self.0 == Self::NO_VALUE_BIT
    }

    pub const fn is_pending(self) -> bool {
        self.0 == Self::PENDING_BIT
    }

    pub const fn is_sentinel(self) -> bool {
        self.is_no_value() || self.is_pending()
    }

    /// True if at least one data ordinal is set
    pub const fn has_data(self) -> bool {
        !self.is_sentinel() && self.0 != 0
    }

    pub fn is_set(self, ordinal: HistoryEnumOrdinal) -> bool {
        !self.is_sentinel()
            && (ordinal.0 as usize) < Self::MAX_ORDINALS
            && self.0 & (1 << ordinal.0) != 0
    }

    /// Merges two sets.
    ///
    /// `Pending` on either side yields `Pending`. Otherwise a data-bearing set
    /// wins over `NoValue`, and two data sets are OR'd.
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a.is_pending() || b.is_pending() => Self::PENDING,
            (a, b) if a.is_no_value() && b.is_no_value() => Self::NO_VALUE,
            (a, b) if a.is_no_value() => b,
            (a, b) if b.is_no_value() => a,
            (a, b) => Self(a.0 | b.0),
        }
    }

    /// Lowest set data ordinal, or the matching sentinel ordinal
    pub fn first_set_ordinal(self) -> HistoryEnumOrdinal {
        if self.is_pending() {
            return HistoryEnumOrdinal::PENDING;
        }
        if self.is_no_value() || self.0 == 0 {
            return HistoryEnumOrdinal::NO_VALUE;
        }
        HistoryEnumOrdinal(self.0.trailing_zeros() as u16)
    }

    /// Calls `f` for every set data ordinal, lowest first.
    ///
    /// Sentinel sets do not call `f` at all.
    pub fn for_each_set_ordinal(self, mut f: impl FnMut(HistoryEnumOrdinal)) {
        if self.is_sentinel() {
            return;
        }
        let mut remaining = self.0 & Self::DATA_MASK;
        while remaining != 0 {
            let ordinal = remaining.trailing_zeros();
            f(HistoryEnumOrdinal(ordinal as u16));
            remaining &= remaining - 1;
        }
    }

    /// Collects the set data ordinals, lowest first
    pub fn ordinals(self) -> SetOrdinals {
        let mut ordinals = SetOrdinals::new();
        self.for_each_set_ordinal(|ordinal| {
            // Capacity equals the number of data bits
            let _ = ordinals.push(ordinal);
        });
        ordinals
    }

    /// Number of set data ordinals
    pub const fn count(self) -> u32 {
        if self.is_sentinel() {
            0
        } else {
            self.0.count_ones()
        }
    }
}

impl Display for HistoryEnumSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_no_value() {
            f.write_str("-")
        } else if self.is_pending() {
            f.write_str("?")
        } else {
            write!(f, "{:b}", self.0)
        }
    }
}
