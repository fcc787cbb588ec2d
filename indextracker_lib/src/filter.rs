//! Predicate sets over quote records.
//!
//! A `QuoteFilter` combines optional region membership, inclusive
//! percent-change bounds, and gain/loss/unchanged buckets. Unset predicates
//! match everything. Filters compose with [`QuoteFilter::and`] such that
//! applying `a` then `b` selects the same records as applying `a.and(b)`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::QuoteRecord;

/// Direction of a day's move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeBucket {
    Gain,
    Loss,
    Unchanged,
}

impl ChangeBucket {
    pub fn of(change_pct: f64) -> Self {
        if change_pct > 0.0 {
            Self::Gain
        } else if change_pct < 0.0 {
            Self::Loss
        } else {
            Self::Unchanged
        }
    }
}

impl fmt::Display for ChangeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gain => "gain",
            Self::Loss => "loss",
            Self::Unchanged => "unchanged",
        })
    }
}

impl FromStr for ChangeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gain" | "gainers" | "up" => Ok(Self::Gain),
            "loss" | "losers" | "down" => Ok(Self::Loss),
            "unchanged" | "flat" => Ok(Self::Unchanged),
            other => Err(format!(
                "unknown change bucket '{}' (expected gain, loss, or unchanged)",
                other
            )),
        }
    }
}

/// A conjunction of optional predicates over `QuoteRecord`s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteFilter {
    /// Lowercased region names; `None` allows every region.
    regions: Option<BTreeSet<String>>,
    min_change_pct: Option<f64>,
    max_change_pct: Option<f64>,
    buckets: Option<BTreeSet<ChangeBucket>>,
}

impl QuoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to records whose region matches one of `regions`,
    /// ignoring case.
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.regions = Some(
            regions
                .into_iter()
                .map(|r| r.as_ref().trim().to_lowercase())
                .collect(),
        );
        self
    }

    /// Inclusive lower bound on percent change.
    pub fn with_min_change(mut self, min_pct: f64) -> Self {
        self.min_change_pct = Some(min_pct);
        self
    }

    /// Inclusive upper bound on percent change.
    pub fn with_max_change(mut self, max_pct: f64) -> Self {
        self.max_change_pct = Some(max_pct);
        self
    }

    pub fn with_buckets<I>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = ChangeBucket>,
    {
        self.buckets = Some(buckets.into_iter().collect());
        self
    }

    /// True when no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.regions.is_none()
            && self.min_change_pct.is_none()
            && self.max_change_pct.is_none()
            && self.buckets.is_none()
    }

    pub fn matches(&self, record: &QuoteRecord) -> bool {
        if let Some(regions) = &self.regions {
            if !regions.contains(&record.region.to_lowercase()) {
                return false;
            }
        }
        if let Some(min) = self.min_change_pct {
            if record.change_pct < min {
                return false;
            }
        }
        if let Some(max) = self.max_change_pct {
            if record.change_pct > max {
                return false;
            }
        }
        if let Some(buckets) = &self.buckets {
            if !buckets.contains(&ChangeBucket::of(record.change_pct)) {
                return false;
            }
        }
        true
    }

    /// The filter matching exactly the records both `self` and `other` match.
    pub fn and(self, other: QuoteFilter) -> QuoteFilter {
        QuoteFilter {
            regions: intersect(self.regions, other.regions),
            min_change_pct: tighter(self.min_change_pct, other.min_change_pct, f64::max),
            max_change_pct: tighter(self.max_change_pct, other.max_change_pct, f64::min),
            buckets: intersect(self.buckets, other.buckets),
        }
    }

    /// Records matching this filter, in their original order.
    pub fn apply(&self, records: &[QuoteRecord]) -> Vec<QuoteRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Free-function form of [`QuoteFilter::apply`].
pub fn filter(records: &[QuoteRecord], predicates: &QuoteFilter) -> Vec<QuoteRecord> {
    predicates.apply(records)
}

fn intersect<T: Ord + Clone>(
    a: Option<BTreeSet<T>>,
    b: Option<BTreeSet<T>>,
) -> Option<BTreeSet<T>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.intersection(&b).cloned().collect()),
        (a, None) => a,
        (None, b) => b,
    }
}

fn tighter(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}
