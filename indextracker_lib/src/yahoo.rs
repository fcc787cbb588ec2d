//! Yahoo Finance implementation of [`MarketDataSource`].
//!
//! Daily bars come from the chart endpoint via `YahooConnector::get_quote_range`.
//! History responses are cached per (symbol, period) for a configurable TTL;
//! recent bars are always fetched fresh.

use std::time::Duration;

use chrono::NaiveDate;
use yahoo_finance_api as yahoo;

use crate::cache::MemoryCache;
use crate::source::{MarketDataSource, SourceError};
use crate::types::{Bar, LookbackPeriod};

/// Bar interval requested from Yahoo.
const DAILY_INTERVAL: &str = "1d";

/// Convert seconds since the Unix epoch to a UTC calendar date.
pub fn timestamp_to_date(timestamp: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}

/// Smallest Yahoo range string that covers `count` trading days.
pub fn range_for_recent(count: usize) -> &'static str {
    match count {
        0..=5 => "5d",
        6..=20 => "1mo",
        21..=60 => "3mo",
        61..=125 => "6mo",
        126..=250 => "1y",
        251..=500 => "2y",
        _ => "5y",
    }
}

fn bar_from_parts(
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
) -> Option<Bar> {
    Some(Bar {
        date: timestamp_to_date(timestamp)?,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn quote_to_bar(quote: &yahoo::Quote) -> Option<Bar> {
    bar_from_parts(
        quote.timestamp as i64,
        quote.open,
        quote.high,
        quote.low,
        quote.close,
        quote.volume as u64,
    )
}

/// First three-digit HTTP status code mentioned in an upstream message.
fn status_in(message: &str) -> Option<u16> {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 3)
        .find_map(|token| token.parse::<u16>().ok())
        .filter(|status| (100..600).contains(status))
}

/// Classify an upstream failure message by the HTTP status it carries.
fn classify_message(message: String) -> SourceError {
    match status_in(&message) {
        Some(429) => SourceError::Transient(message),
        Some(status) if status >= 500 => SourceError::Transient(message),
        Some(404) => SourceError::NoData,
        _ if message.to_ascii_lowercase().contains("not found") => SourceError::NoData,
        _ => SourceError::Rejected(message),
    }
}

/// Map a `yahoo_finance_api` error onto the pipeline's retry classes.
///
/// The connector does not check HTTP status before decoding, so a 5xx page
/// surfaces as `DeserializeFailed` and is treated as transient.
pub fn classify_error(err: yahoo::YahooError) -> SourceError {
    let message = err.to_string();
    match err {
        yahoo::YahooError::TooManyRequests(_)
        | yahoo::YahooError::ConnectionFailed(_)
        | yahoo::YahooError::DeserializeFailed(_) => SourceError::Transient(message),
        yahoo::YahooError::NoResult | yahoo::YahooError::NoQuotes => SourceError::NoData,
        yahoo::YahooError::FetchFailed(detail) => classify_message(detail),
        _ => SourceError::Rejected(message),
    }
}

/// The last `count` bars with a usable close.
fn keep_recent_usable(bars: Vec<Bar>, count: usize) -> Vec<Bar> {
    let mut usable: Vec<Bar> = bars.into_iter().filter(Bar::is_usable).collect();
    let keep_from = usable.len().saturating_sub(count);
    usable.split_off(keep_from)
}

/// Yahoo Finance client with a history cache.
pub struct YahooSource {
    connector: yahoo::YahooConnector,
    history_cache: MemoryCache<(String, LookbackPeriod), Vec<Bar>>,
}

impl YahooSource {
    pub fn new(history_ttl: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            connector: yahoo::YahooConnector::new().map_err(classify_error)?,
            history_cache: MemoryCache::new(history_ttl),
        })
    }

    /// Number of cached history responses.
    pub fn cache_len(&self) -> usize {
        self.history_cache.len()
    }

    async fn daily_bars(&self, symbol: &str, range: &str) -> Result<Vec<Bar>, SourceError> {
        let response = self
            .connector
            .get_quote_range(symbol, DAILY_INTERVAL, range)
            .await
            .map_err(classify_error)?;
        let quotes = response.quotes().map_err(classify_error)?;
        let bars: Vec<Bar> = quotes.iter().filter_map(quote_to_bar).collect();
        tracing::debug!("Yahoo returned {} bars for {} ({})", bars.len(), symbol, range);
        Ok(bars)
    }
}

impl MarketDataSource for YahooSource {
    async fn recent_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, SourceError> {
        let bars = self.daily_bars(symbol, range_for_recent(count)).await?;
        Ok(keep_recent_usable(bars, count))
    }

    async fn period_bars(
        &self,
        symbol: &str,
        period: LookbackPeriod,
    ) -> Result<Vec<Bar>, SourceError> {
        let key = (symbol.to_string(), period);
        if let Some(cached) = self.history_cache.get(&key) {
            tracing::debug!("History cache hit for {} ({})", symbol, period);
            return Ok(cached);
        }
        let bars = self.daily_bars(symbol, period.as_range()).await?;
        if !bars.is_empty() {
            self.history_cache.set(key, bars.clone());
        }
        Ok(bars)
    }
}
