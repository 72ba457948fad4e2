//! Half-open key intervals over opaque byte-string keys.
//!
//! A range is `[start, end)` compared lexicographically. An empty `end`
//! means the range has no upper bound; an empty `start` is simply the
//! smallest possible key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` over byte keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyRange {
    /// Inclusive start key.
    pub start: Vec<u8>,
    /// Exclusive end key; empty means unbounded.
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The whole keyspace.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.end.is_empty()
    }

    /// Returns `true` when `start <= end` or the end is unbounded.
    pub fn is_well_formed(&self) -> bool {
        self.end.is_empty() || self.start <= self.end
    }

    /// Returns `true` when `other` lies entirely within `self`.
    ///
    /// Range routing evaluates this with the query as `self` and the tablet
    /// as `other`: a tablet is selected only when its whole span falls
    /// inside the query, not when the two merely overlap.
    pub fn contains_range(&self, other: &KeyRange) -> bool {
        if self.start > other.start {
            return false;
        }
        if self.end.is_empty() {
            return true;
        }
        !other.end.is_empty() && other.end <= self.end
    }

    /// Checks whether `key` is within `[start, end)`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.end.is_empty() || key < self.end.as_slice())
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}, ", String::from_utf8_lossy(&self.start))?;
        if self.end.is_empty() {
            write!(f, "+inf)")
        } else {
            write!(f, "{:?})", String::from_utf8_lossy(&self.end))
        }
    }
}
