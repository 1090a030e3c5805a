//! Reference entries: labeled, bounded episodes referenced by id from a chunk.

use core::fmt::Display;

use serde::{Deserialize, Serialize};

/// Identity of one reference entry within a chunk
///
/// The two highest values are reserved for the sentinels. Real ids are handed
/// out by a [`ReferenceEntryIdAllocator`] above [`ReferenceEntryId::RESERVED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceEntryId(pub u32);

impl ReferenceEntryId {
    pub const NO_VALUE: Self = Self(u32::MAX);
    pub const PENDING: Self = Self(u32::MAX - 1);
    /// Ids up to (and including) this value are never allocated
    pub const RESERVED: u32 = 1000;

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

impl Display for ReferenceEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_no_value() {
            f.write_str("-")
        } else if self.is_pending() {
            f.write_str("?")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Monotonic id source, scoped to one build or resampling run
#[derive(Debug, Clone)]
pub struct ReferenceEntryIdAllocator {
    last: u32,
}

impl Default for ReferenceEntryIdAllocator {
    fn default() -> Self {
        Self {
            last: ReferenceEntryId::RESERVED,
        }
    }
}

impl ReferenceEntryIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next unused id
    pub fn next_id(&mut self) -> ReferenceEntryId {
        self.last += 1;
        ReferenceEntryId(self.last)
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> u32 {
        self.last - ReferenceEntryId::RESERVED
    }
}

/// Data describing one reference entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntryData {
    pub id: ReferenceEntryId,
    pub label: String,
    /// Inclusive start in ms
    pub start: f64,
    /// Exclusive end in ms
    pub end: f64,
    pub payload: Option<String>,
}

impl ReferenceEntryData {
    pub fn new(id: ReferenceEntryId, label: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            id,
            label: label.into(),
            start,
            end,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True if `timestamp` lies in `[start, end)`
    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}
