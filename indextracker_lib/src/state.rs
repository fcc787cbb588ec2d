//! Dashboard state owned by the presentation layer.
//!
//! The pipeline never mutates a `DashboardState`; `QuotePipeline::refresh`
//! takes the current one and returns its replacement. A failed refresh
//! returns an error and the caller keeps what it had.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::filter::QuoteFilter;
use crate::pipeline::{HistoryBatch, QuoteBatch};
use crate::summary::{self, MarketSummary};
use crate::types::{LookbackPeriod, QuoteRecord, TechnicalSnapshot};

/// Chart symbols used when a request does not name any.
pub const DEFAULT_CHART_COUNT: usize = 3;

/// Inputs for one batch refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRequest {
    pub symbols: Vec<String>,
    /// Symbols to load history for. `None` picks the first
    /// `default_chart_count` symbols that returned quotes.
    pub chart_symbols: Option<Vec<String>>,
    pub period: LookbackPeriod,
    pub default_chart_count: usize,
}

impl RefreshRequest {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            chart_symbols: None,
            period: LookbackPeriod::default(),
            default_chart_count: DEFAULT_CHART_COUNT,
        }
    }

    pub fn with_chart_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chart_symbols = Some(symbols.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_period(mut self, period: LookbackPeriod) -> Self {
        self.period = period;
        self
    }

    pub fn with_default_chart_count(mut self, count: usize) -> Self {
        self.default_chart_count = count;
        self
    }
}

/// Everything the dashboard shows after a refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    /// Number of successful refreshes that led to this state; 0 before the
    /// first one.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub period: LookbackPeriod,
    pub quotes: QuoteBatch,
    pub history: HistoryBatch,
    pub indicators: Vec<TechnicalSnapshot>,
}

impl DashboardState {
    /// True before the first successful refresh.
    pub fn is_initial(&self) -> bool {
        self.generation == 0
    }

    pub fn filtered_quotes(&self, filter: &QuoteFilter) -> Vec<QuoteRecord> {
        filter.apply(&self.quotes.records)
    }

    pub fn market_summary(&self) -> MarketSummary {
        summary::market_summary(&self.quotes.records)
    }

    pub fn indicators_for(&self, symbol: &str) -> Option<&TechnicalSnapshot> {
        self.indicators.iter().find(|t| t.symbol == symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let request = RefreshRequest::new(["^GSPC", "^DJI"]);
        assert_eq!(request.symbols, vec!["^GSPC".to_string(), "^DJI".to_string()]);
        assert_eq!(request.chart_symbols, None);
        assert_eq!(request.period, LookbackPeriod::OneYear);
        assert_eq!(request.default_chart_count, DEFAULT_CHART_COUNT);
    }

    #[test]
    fn request_builders() {
        let request = RefreshRequest::new(vec!["A".to_string()])
            .with_chart_symbols(["A"])
            .with_period(LookbackPeriod::FiveYears)
            .with_default_chart_count(1);
        assert_eq!(request.chart_symbols, Some(vec!["A".to_string()]));
        assert_eq!(request.period, LookbackPeriod::FiveYears);
        assert_eq!(request.default_chart_count, 1);
    }

    #[test]
    fn initial_state_is_empty() {
        let state = DashboardState::default();
        assert!(state.is_initial());
        assert!(state.quotes.records.is_empty());
        assert_eq!(state.market_summary().total, 0);
        assert!(state.indicators_for("A").is_none());
    }
}
