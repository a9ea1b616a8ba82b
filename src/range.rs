//! Half-open `[lo, hi)` byte ranges used for both layer-local offsets and
//! virtual-file offsets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LayerFsError, Result};

/// A half-open interval `[lo, hi)` of unsigned 64-bit offsets.
///
/// `lo == hi` is a valid, zero-width range (used nowhere in practice here,
/// since every chunk carries positive width, but the algebra itself doesn't
/// forbid it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub lo: u64,
    pub hi: u64,
}

impl Range {
    pub fn new(lo: u64, hi: u64) -> Self {
        debug_assert!(lo <= hi, "range lo must not exceed hi: [{lo}, {hi})");
        Self { lo, hi }
    }

    pub fn width(&self) -> u64 {
        self.hi - self.lo
    }

    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    /// `overlap(a, b) ≡ a.lo < b.hi ∧ b.lo < a.hi`
    pub fn overlaps(&self, other: &Range) -> bool {
        self.lo < other.hi && other.lo < self.hi
    }

    /// Intersection of this range with `other`, or `None` if they don't overlap.
    pub fn intersect(&self, other: &Range) -> Option<Range> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        if lo < hi {
            Some(Range { lo, hi })
        } else {
            None
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.lo, self.hi)
    }
}

/// Serializes as the `"[lo,hi)"` wire string, the same grammar the catalog
/// stores and parses, so a [`Chunk`] serialized for the HTTP API carries
/// ranges in the one format this crate already treats as canonical.
impl Serialize for Range {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Range {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Range {
    type Err = LayerFsError;

    /// Parses the catalog's fixed wire grammar: `'[' uint ',' uint ')'`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LayerFsError::InvalidRange(s.to_string());

        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(invalid)?;

        let (lo_str, hi_str) = inner.split_once(',').ok_or_else(invalid)?;

        let lo: u64 = lo_str.trim().parse().map_err(|_| invalid())?;
        let hi: u64 = hi_str.trim().parse().map_err(|_| invalid())?;

        if lo > hi {
            return Err(invalid());
        }

        Ok(Range { lo, hi })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let r = Range::new(10, 42);
        let text = r.to_string();
        assert_eq!(text, "[10,42)");
        assert_eq!(text.parse::<Range>().unwrap(), r);
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["[10,42]", "10,42", "[10,42", "[,42)", "[10,)", "[42,10)"] {
            assert!(bad.parse::<Range>().is_err(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn overlap_is_strict_on_both_sides() {
        assert!(Range::new(0, 5).overlaps(&Range::new(4, 10)));
        assert!(!Range::new(0, 5).overlaps(&Range::new(5, 10)));
        assert!(!Range::new(5, 10).overlaps(&Range::new(0, 5)));
    }

    #[test]
    fn intersect_maps_back_to_overlap() {
        assert_eq!(
            Range::new(0, 10).intersect(&Range::new(5, 20)),
            Some(Range::new(5, 10))
        );
        assert_eq!(Range::new(0, 5).intersect(&Range::new(5, 10)), None);
    }

    #[test]
    fn width_of_empty_range_is_zero() {
        assert_eq!(Range::new(3, 3).width(), 0);
        assert!(Range::new(3, 3).is_empty());
    }
}
