//! Derived metrics: day-over-day change, normalized history, and technical
//! indicators.
//!
//! Every function here is pure and returns `None` instead of a non-finite
//! number when its inputs cannot support the calculation.

use crate::catalog::IndexDescriptor;
use crate::types::{Bar, HistoryPoint, HistorySeries, LookbackPeriod, QuoteRecord, TechnicalSnapshot};

pub const SMA_SHORT: usize = 20;
pub const SMA_MEDIUM: usize = 50;
pub const SMA_LONG: usize = 200;
pub const RSI_PERIOD: usize = 14;

/// Absolute and percent change between two closes.
///
/// Returns `None` when `prev_close` is zero or either value is not finite.
pub fn change(prev_close: f64, close: f64) -> Option<(f64, f64)> {
    if !prev_close.is_finite() || !close.is_finite() || prev_close == 0.0 {
        return None;
    }
    let abs = close - prev_close;
    Some((abs, 100.0 * abs / prev_close))
}

/// Build a quote from an index's most recent bars (oldest first).
///
/// The last bar supplies price and OHLCV; the one before it supplies the
/// previous close. Returns `None` with fewer than two bars.
pub fn quote_from_bars(index: &IndexDescriptor, bars: &[Bar]) -> Option<QuoteRecord> {
    let [.., prev, last] = bars else {
        return None;
    };
    let (abs, pct) = change(prev.close, last.close)?;
    Some(build_quote(index, last, abs, pct))
}

/// Quote for an index with a single observation, reported as unchanged.
pub fn unchanged_quote(index: &IndexDescriptor, last: &Bar) -> QuoteRecord {
    build_quote(index, last, 0.0, 0.0)
}

fn build_quote(index: &IndexDescriptor, last: &Bar, abs: f64, pct: f64) -> QuoteRecord {
    QuoteRecord {
        symbol: index.symbol.clone(),
        name: index.name.clone(),
        region: index.region.clone(),
        currency: index.currency.clone(),
        price: last.close,
        open: last.open,
        high: last.high,
        low: last.low,
        volume: last.volume,
        change: abs,
        change_pct: pct,
        as_of: last.date,
    }
}

/// Rescale closes so the first observation is 0% and later points are the
/// percent change from it.
pub fn normalize(symbol: &str, period: LookbackPeriod, bars: &[Bar]) -> HistorySeries {
    let points = match bars.first() {
        Some(first) if first.close != 0.0 => bars
            .iter()
            .map(|b| HistoryPoint {
                date: b.date,
                close: b.close,
                normalized_pct: 100.0 * (b.close / first.close - 1.0),
            })
            .collect(),
        _ => Vec::new(),
    };
    HistorySeries {
        symbol: symbol.to_string(),
        period,
        points,
    }
}

/// Mean of the last `window` closes, or `None` if the series is shorter.
pub fn sma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Relative strength index over the last `period` close-to-close deltas.
///
/// Uses simple averages of gains and losses. Needs `period + 1` closes.
/// A window with no losses reads 100.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let window = &closes[closes.len() - (period + 1)..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(g, l), delta| {
            if delta > 0.0 {
                (g + delta, l)
            } else {
                (g, l - delta)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    let value = 100.0 - 100.0 / (1.0 + rs);
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}

/// SMA(20/50/200) and RSI(14) for a history series.
pub fn compute_indicators(series: &HistorySeries) -> TechnicalSnapshot {
    let closes = series.closes();
    TechnicalSnapshot {
        symbol: series.symbol.clone(),
        sma_20: sma(&closes, SMA_SHORT),
        sma_50: sma(&closes, SMA_MEDIUM),
        sma_200: sma(&closes, SMA_LONG),
        rsi_14: rsi(&closes, RSI_PERIOD),
    }
}
