//! The quote-metrics pipeline: fetch quotes and history for a set of
//! symbols, derive change and indicators, and build dashboard state.
//!
//! Per-symbol fetches run concurrently (Semaphore + JoinSet + mpsc), each
//! wrapped in the configured retry policy. A symbol that fails is reported as
//! a [`SymbolUnavailable`] notice next to the records that succeeded; the
//! whole call only fails when nothing came back and the upstream kept
//! failing after retries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::catalog::IndexCatalog;
use crate::config::{InsufficientHistoryPolicy, PipelineConfig};
use crate::error::{PipelineError, SymbolUnavailable, UnavailableReason};
use crate::metrics;
use crate::retry::RetryFailure;
use crate::source::{MarketDataSource, SourceError};
use crate::state::{DashboardState, RefreshRequest};
use crate::types::{Bar, HistorySeries, LookbackPeriod, QuoteRecord};

/// Observations needed to compute a day-over-day change.
pub const QUOTE_OBSERVATIONS: usize = 2;

/// Current quotes for a batch, in request order, plus per-symbol notices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteBatch {
    pub records: Vec<QuoteRecord>,
    pub unavailable: Vec<SymbolUnavailable>,
}

impl QuoteBatch {
    pub fn get(&self, symbol: &str) -> Option<&QuoteRecord> {
        self.records.iter().find(|r| r.symbol == symbol)
    }

    pub fn by_symbol(&self) -> HashMap<&str, &QuoteRecord> {
        self.records.iter().map(|r| (r.symbol.as_str(), r)).collect()
    }
}

/// Normalized history for a batch, in request order, plus per-symbol notices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryBatch {
    pub series: Vec<HistorySeries>,
    pub unavailable: Vec<SymbolUnavailable>,
}

impl HistoryBatch {
    pub fn get(&self, symbol: &str) -> Option<&HistorySeries> {
        self.series.iter().find(|s| s.symbol == symbol)
    }

    pub fn by_symbol(&self) -> BTreeMap<&str, &HistorySeries> {
        self.series.iter().map(|s| (s.symbol.as_str(), s)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum FetchKind {
    Recent(usize),
    Period(LookbackPeriod),
}

impl FetchKind {
    async fn fetch<S: MarketDataSource>(
        self,
        source: &S,
        symbol: &str,
    ) -> Result<Vec<Bar>, SourceError> {
        match self {
            Self::Recent(count) => source.recent_bars(symbol, count).await,
            Self::Period(period) => source.period_bars(symbol, period).await,
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recent(count) => write!(f, "last {} bars", count),
            Self::Period(period) => write!(f, "{} history", period),
        }
    }
}

/// Message sent from fetch tasks back to the collector.
struct Fetched {
    position: usize,
    result: Result<Vec<Bar>, RetryFailure>,
}

/// Fetches quotes and history from a [`MarketDataSource`] and derives
/// display metrics. Holds no per-refresh state.
pub struct QuotePipeline<S> {
    source: Arc<S>,
    catalog: IndexCatalog,
    config: PipelineConfig,
}

impl<S: MarketDataSource> QuotePipeline<S> {
    pub fn new(source: S, catalog: IndexCatalog, config: PipelineConfig) -> Self {
        Self::with_shared_source(Arc::new(source), catalog, config)
    }

    pub fn with_shared_source(source: Arc<S>, catalog: IndexCatalog, config: PipelineConfig) -> Self {
        Self {
            source,
            catalog,
            config,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Latest quote per symbol, computed from its last two daily bars.
    ///
    /// Symbols with fewer than two usable bars are handled per the
    /// configured [`InsufficientHistoryPolicy`].
    pub async fn fetch_quotes(&self, symbols: &[String]) -> Result<QuoteBatch, PipelineError> {
        let symbols = normalize_symbols(symbols)?;
        let fetched = self
            .fetch_all(&symbols, FetchKind::Recent(QUOTE_OBSERVATIONS))
            .await;

        let mut batch = QuoteBatch::default();
        for (symbol, outcome) in symbols.iter().zip(fetched) {
            let bars = match outcome {
                Ok(bars) => bars,
                Err(reason) => {
                    batch.unavailable.push(SymbolUnavailable::new(symbol, reason));
                    continue;
                }
            };
            let usable: Vec<Bar> = bars.into_iter().filter(Bar::is_usable).collect();
            let index = self.catalog.describe(symbol);
            if let Some(quote) = metrics::quote_from_bars(&index, &usable) {
                batch.records.push(quote);
                continue;
            }
            match (self.config.insufficient_history, usable.as_slice()) {
                (InsufficientHistoryPolicy::ZeroChange, [only]) => {
                    batch.records.push(metrics::unchanged_quote(&index, only));
                }
                _ => batch.unavailable.push(SymbolUnavailable::new(
                    symbol,
                    UnavailableReason::InsufficientData {
                        observations: usable.len(),
                    },
                )),
            }
        }

        report_notices("quote", &batch.unavailable);
        ensure_available(&symbols, batch.records.is_empty(), &batch.unavailable)?;
        tracing::info!(
            "Fetched {} quotes ({} unavailable)",
            batch.records.len(),
            batch.unavailable.len()
        );
        Ok(batch)
    }

    /// Closing-price history per symbol over `period`, normalized to the
    /// first observation. Symbols with no data are omitted and reported.
    pub async fn fetch_history(
        &self,
        symbols: &[String],
        period: LookbackPeriod,
    ) -> Result<HistoryBatch, PipelineError> {
        let symbols = normalize_symbols(symbols)?;
        let fetched = self.fetch_all(&symbols, FetchKind::Period(period)).await;

        let mut batch = HistoryBatch::default();
        for (symbol, outcome) in symbols.iter().zip(fetched) {
            match outcome {
                Ok(bars) => {
                    let usable: Vec<Bar> = bars.into_iter().filter(Bar::is_usable).collect();
                    if usable.is_empty() {
                        batch
                            .unavailable
                            .push(SymbolUnavailable::new(symbol, UnavailableReason::NoData));
                    } else {
                        batch.series.push(metrics::normalize(symbol, period, &usable));
                    }
                }
                Err(reason) => batch.unavailable.push(SymbolUnavailable::new(symbol, reason)),
            }
        }

        report_notices("history", &batch.unavailable);
        ensure_available(&symbols, batch.series.is_empty(), &batch.unavailable)?;
        tracing::info!(
            "Fetched {} history for {} symbols ({} unavailable)",
            period,
            batch.series.len(),
            batch.unavailable.len()
        );
        Ok(batch)
    }

    /// Build the next dashboard state from `state` and `request`.
    ///
    /// Quotes are fetched for every requested symbol, history and
    /// indicators for the chart symbols (by default the first few symbols
    /// that returned quotes). On error the caller should keep `state`.
    pub async fn refresh(
        &self,
        state: &DashboardState,
        request: &RefreshRequest,
    ) -> Result<DashboardState, PipelineError> {
        let quotes = self.fetch_quotes(&request.symbols).await?;

        let chart_symbols = match &request.chart_symbols {
            Some(symbols) => symbols.clone(),
            None => quotes
                .records
                .iter()
                .take(request.default_chart_count)
                .map(|r| r.symbol.clone())
                .collect(),
        };
        let history = if chart_symbols.iter().all(|s| s.trim().is_empty()) {
            HistoryBatch::default()
        } else {
            self.fetch_history(&chart_symbols, request.period).await?
        };
        let indicators = history.series.iter().map(metrics::compute_indicators).collect();

        Ok(DashboardState {
            generation: state.generation + 1,
            refreshed_at: Some(Utc::now()),
            period: request.period,
            quotes,
            history,
            indicators,
        })
    }

    /// Fetch every symbol concurrently, returning outcomes in input order.
    async fn fetch_all(
        &self,
        symbols: &[String],
        kind: FetchKind,
    ) -> Vec<Result<Vec<Bar>, UnavailableReason>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel::<Fetched>(symbols.len().max(1));
        let mut join_set = JoinSet::new();
        let mut positions = HashMap::with_capacity(symbols.len());

        for (position, symbol) in symbols.iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let sender = tx.clone();
            let source = Arc::clone(&self.source);
            let retry = self.config.retry.clone();
            let symbol = symbol.clone();

            let handle = join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                tracing::debug!("Fetching {} for {}", kind, symbol);
                let result = retry
                    .run(&symbol, || kind.fetch(source.as_ref(), &symbol))
                    .await;
                let _ = sender.send(Fetched { position, result }).await;
            });
            positions.insert(handle.id(), position);
        }
        drop(tx);

        let mut slots: Vec<Option<Result<Vec<Bar>, UnavailableReason>>> =
            vec![None; symbols.len()];
        while let Some(fetched) = rx.recv().await {
            slots[fetched.position] = Some(fetched.result.map_err(reason_for));
        }

        while let Some(joined) = join_set.join_next().await {
            let Err(err) = joined else { continue };
            let Some(&position) = positions.get(&err.id()) else {
                tracing::error!("Fetch task failed: {}", err);
                continue;
            };
            tracing::error!("Fetch task for {} failed: {}", symbols[position], err);
            if slots[position].is_none() {
                slots[position] = Some(Err(UnavailableReason::TaskFailed {
                    message: task_failure_message(err),
                }));
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(UnavailableReason::TaskFailed {
                        message: "task ended without a result".to_string(),
                    })
                })
            })
            .collect()
    }
}

/// The panic payload when there is a readable one, else the join error.
fn task_failure_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

fn reason_for(failure: RetryFailure) -> UnavailableReason {
    match failure.error {
        SourceError::Transient(message) => UnavailableReason::RetriesExhausted {
            attempts: failure.attempts,
            message,
        },
        SourceError::NoData => UnavailableReason::NoData,
        SourceError::Rejected(message) => UnavailableReason::Rejected { message },
    }
}

/// Trim, drop blanks, and de-duplicate while keeping first-seen order.
fn normalize_symbols(symbols: &[String]) -> Result<Vec<String>, PipelineError> {
    let mut seen = HashSet::new();
    let normalized: Vec<String> = symbols
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect();
    if normalized.is_empty() {
        return Err(PipelineError::InvalidInput(
            "at least one symbol is required".to_string(),
        ));
    }
    Ok(normalized)
}

fn report_notices(label: &str, notices: &[SymbolUnavailable]) {
    for notice in notices {
        tracing::warn!("{} unavailable for {}", label, notice);
    }
}

/// Fail the batch when nothing succeeded and the upstream never recovered.
fn ensure_available(
    symbols: &[String],
    nothing_succeeded: bool,
    notices: &[SymbolUnavailable],
) -> Result<(), PipelineError> {
    if !nothing_succeeded {
        return Ok(());
    }
    let last_exhausted = notices.iter().rev().find(|n| n.is_exhausted());
    match last_exhausted {
        Some(notice) => Err(PipelineError::DataUnavailable {
            symbols: symbols.to_vec(),
            message: notice.reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_symbols_dedupes_in_order() {
        let out = normalize_symbols(&strings(&[" ^GSPC", "^DJI", "^GSPC ", "", "^N225"])).unwrap();
        assert_eq!(out, strings(&["^GSPC", "^DJI", "^N225"]));
    }

    #[test]
    fn normalize_symbols_rejects_empty() {
        let err = normalize_symbols(&strings(&["", "  "])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn reason_mapping() {
        let exhausted = reason_for(RetryFailure {
            attempts: 3,
            error: SourceError::Transient("503".into()),
        });
        assert_eq!(
            exhausted,
            UnavailableReason::RetriesExhausted {
                attempts: 3,
                message: "503".into()
            }
        );
        assert_eq!(
            reason_for(RetryFailure {
                attempts: 1,
                error: SourceError::NoData
            }),
            UnavailableReason::NoData
        );
    }

    #[test]
    fn ensure_available_only_fails_on_exhaustion() {
        let symbols = strings(&["A", "B"]);
        let rejected = vec![SymbolUnavailable::new(
            "A",
            UnavailableReason::Rejected {
                message: "404".into(),
            },
        )];
        assert!(ensure_available(&symbols, true, &rejected).is_ok());

        let exhausted = vec![SymbolUnavailable::new(
            "B",
            UnavailableReason::RetriesExhausted {
                attempts: 3,
                message: "timeout".into(),
            },
        )];
        assert!(ensure_available(&symbols, false, &exhausted).is_ok());
        let err = ensure_available(&symbols, true, &exhausted).unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable { ref symbols, .. } if symbols.len() == 2));
    }

    #[test]
    fn batch_lookup_helpers() {
        let batch = QuoteBatch::default();
        assert!(batch.get("A").is_none());
        assert!(batch.by_symbol().is_empty());
        assert!(HistoryBatch::default().by_symbol().is_empty());
    }
}
