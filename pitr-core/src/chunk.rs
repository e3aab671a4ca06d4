use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChronologyError, Result};

/// Wall-clock instant used for every chain boundary.
pub type Instant = DateTime<Utc>;

/// Half-open interval `[from, to)` of the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Instant,
    pub to: Instant,
}

impl TimeRange {
    /// Build a range, rejecting empty or inverted intervals.
    pub fn new(from: Instant, to: Instant) -> Result<Self> {
        if from >= to {
            return Err(ChronologyError::InvalidRange(format!(
                "range start {} is not before range end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, t: Instant) -> bool {
        self.from <= t && t < self.to
    }
}

/// An immutable captured slice of the change log covering `[from_time, to_time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub key: String,
    pub from_time: Instant,
    pub to_time: Instant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Instant>,
}

impl Chunk {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            from: self.from_time,
            to: self.to_time,
        }
    }

    /// True when this chunk covers every instant of `other` and starts no later than it.
    ///
    /// A crash between upload and cursor advance re-captures from the same cursor, so the
    /// retry chunk supersedes the orphaned one.
    pub fn supersedes(&self, other: &Chunk) -> bool {
        self.from_time <= other.from_time && self.to_time >= other.to_time
    }
}

/// A full snapshot; the anchor a chunk chain is replayed on top of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBackup {
    pub key: String,
    pub created_at: Instant,
    /// `None` for whole-cluster backups.
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Instant>,
}

/// Caller supplied restore target. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreWindow {
    pub from: Option<Instant>,
    pub to: Option<Instant>,
}

impl RestoreWindow {
    pub fn new(from: Option<Instant>, to: Option<Instant>) -> Result<Self> {
        let window = Self { from, to };
        window.validate()?;
        Ok(window)
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn until(to: Instant) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn since(from: Instant) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ChronologyError::InvalidWindow { from, to });
            }
        }
        Ok(())
    }

    /// Overlap predicate between a chunk `[from_time, to_time)` and this window.
    pub fn admits(&self, chunk: &Chunk) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => chunk.from_time < to && chunk.to_time > from,
            (None, Some(to)) => chunk.from_time < to,
            (Some(from), None) => chunk.to_time > from,
            (None, None) => true,
        }
    }
}
