//! The upstream market-data seam.
//!
//! The pipeline only needs two operations from a price provider: the last
//! few daily bars for a symbol, and the daily bars over a lookback period.
//! `YahooSource` implements this for Yahoo Finance; tests use scripted
//! in-memory sources.

use std::future::Future;

use thiserror::Error;

use crate::types::{Bar, LookbackPeriod};

/// Errors a market-data source can report for a single symbol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Network failure, rate limiting, or a server-side error. Worth retrying.
    #[error("transient upstream failure: {0}")]
    Transient(String),
    /// The provider answered but had no bars for the symbol.
    #[error("no data returned")]
    NoData,
    /// The provider refused the request (unknown symbol, bad range, ...).
    #[error("rejected by upstream: {0}")]
    Rejected(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A provider of daily OHLCV bars.
///
/// Implementations must return bars ordered oldest first. `recent_bars`
/// should skip bars with unusable closes before taking the last `count`;
/// the pipeline discards any that still come through.
pub trait MarketDataSource: Send + Sync + 'static {
    /// The most recent `count` daily bars for `symbol`.
    fn recent_bars(
        &self,
        symbol: &str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Bar>, SourceError>> + Send;

    /// Daily bars for `symbol` over `period`.
    fn period_bars(
        &self,
        symbol: &str,
        period: LookbackPeriod,
    ) -> impl Future<Output = Result<Vec<Bar>, SourceError>> + Send;
}
