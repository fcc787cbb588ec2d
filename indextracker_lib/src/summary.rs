//! Market-wide aggregates over a set of quotes.
//!
//! All functions are pure and do not perform network calls.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::QuoteRecord;

pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "Bullish",
            Self::Bearish => "Bearish",
            Self::Neutral => "Neutral",
        })
    }
}

/// Advancing/declining counts and the sentiment they imply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketSummary {
    pub total: usize,
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
    pub sentiment: Sentiment,
}

pub fn market_summary(records: &[QuoteRecord]) -> MarketSummary {
    let advancing = records.iter().filter(|r| r.change_pct > 0.0).count();
    let declining = records.iter().filter(|r| r.change_pct < 0.0).count();
    let sentiment = match advancing.cmp(&declining) {
        std::cmp::Ordering::Greater => Sentiment::Bullish,
        std::cmp::Ordering::Less => Sentiment::Bearish,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    };
    MarketSummary {
        total: records.len(),
        advancing,
        declining,
        unchanged: records.len() - advancing - declining,
        sentiment,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPerformance {
    pub region: String,
    pub count: usize,
    pub mean_change_pct: f64,
}

/// Mean percent change per region, sorted by region name.
pub fn region_performance(records: &[QuoteRecord]) -> Vec<RegionPerformance> {
    let mut by_region: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for record in records {
        let entry = by_region.entry(record.region.as_str()).or_default();
        entry.0 += 1;
        entry.1 += record.change_pct;
    }
    by_region
        .into_iter()
        .map(|(region, (count, sum))| RegionPerformance {
            region: region.to_string(),
            count,
            mean_change_pct: sum / count as f64,
        })
        .collect()
}

/// One equal-width histogram bucket. `upper` is exclusive except for the
/// last bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Histogram of percent changes over `[min, max]` with `bins` buckets.
///
/// When every record has the same change a single bin is returned.
pub fn change_distribution(records: &[QuoteRecord], bins: usize) -> Vec<HistogramBin> {
    if records.is_empty() || bins == 0 {
        return Vec::new();
    }
    let (min, max) = records.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
        (lo.min(r.change_pct), hi.max(r.change_pct))
    });
    if max == min {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: records.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();
    for record in records {
        let idx = (((record.change_pct - min) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}
