use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Days, NaiveDate};
use indextracker_lib::{
    Bar, DashboardState, IndexCatalog, InsufficientHistoryPolicy, LookbackPeriod,
    MarketDataSource, PipelineConfig, PipelineError, QuoteFilter, QuotePipeline, RefreshRequest,
    RetryPolicy, SourceError, UnavailableReason,
};

type Script = HashMap<String, VecDeque<Result<Vec<Bar>, SourceError>>>;

/// In-memory source that replays scripted responses per symbol. The last
/// response for a symbol repeats once the script runs out. Symbols marked
/// with `panics` make the fetching task panic.
#[derive(Default)]
struct ScriptedSource {
    recent: Mutex<Script>,
    history: Mutex<Script>,
    calls: Mutex<HashMap<String, usize>>,
    panics: Mutex<HashSet<String>>,
}

impl ScriptedSource {
    fn recent(self, symbol: &str, responses: Vec<Result<Vec<Bar>, SourceError>>) -> Self {
        self.recent
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses.into());
        self
    }

    fn history(self, symbol: &str, responses: Vec<Result<Vec<Bar>, SourceError>>) -> Self {
        self.history
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses.into());
        self
    }

    fn panics(self, symbol: &str) -> Self {
        self.panics.lock().unwrap().insert(symbol.to_string());
        self
    }

    fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    fn next(&self, script: &Mutex<Script>, symbol: &str) -> Result<Vec<Bar>, SourceError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default() += 1;
        let should_panic = self.panics.lock().unwrap().contains(symbol);
        if should_panic {
            panic!("source blew up on {}", symbol);
        }
        let mut script = script.lock().unwrap();
        let Some(queue) = script.get_mut(symbol) else {
            return Err(SourceError::Rejected(format!("unknown symbol {}", symbol)));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

impl MarketDataSource for ScriptedSource {
    async fn recent_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, SourceError> {
        let mut bars = self.next(&self.recent, symbol)?;
        let keep_from = bars.len().saturating_sub(count);
        Ok(bars.split_off(keep_from))
    }

    async fn period_bars(
        &self,
        symbol: &str,
        _period: LookbackPeriod,
    ) -> Result<Vec<Bar>, SourceError> {
        self.next(&self.history, symbol)
    }
}

const CATALOG: &str = r#"
version: 1
indices:
  - { symbol: "A", name: "Alpha Index", region: "North", currency: "USD" }
  - { symbol: "B", name: "Beta Index", region: "South", currency: "EUR" }
  - { symbol: "C", name: "Gamma Index", region: "North", currency: "USD", group: additional }
"#;

fn bars(closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: start + Days::new(i as u64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10_000,
        })
        .collect()
}

fn transient() -> Result<Vec<Bar>, SourceError> {
    Err(SourceError::Transient("503 Service Unavailable".to_string()))
}

fn config(policy: InsufficientHistoryPolicy) -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy::fixed(3, Duration::from_millis(100)),
        concurrency: 4,
        insufficient_history: policy,
    }
}

fn pipeline(source: ScriptedSource) -> QuotePipeline<ScriptedSource> {
    pipeline_with(source, InsufficientHistoryPolicy::Omit)
}

fn pipeline_with(
    source: ScriptedSource,
    policy: InsufficientHistoryPolicy,
) -> QuotePipeline<ScriptedSource> {
    let catalog = IndexCatalog::from_yaml_str(CATALOG).unwrap();
    QuotePipeline::new(source, catalog, config(policy))
}

fn symbols(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn two_symbol_end_to_end_change() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 110.0]))])
        .recent("B", vec![Ok(bars(&[50.0, 45.0]))]);
    let batch = pipeline(source)
        .fetch_quotes(&symbols(&["A", "B"]))
        .await
        .unwrap();

    assert!(batch.unavailable.is_empty());
    let order: Vec<&str> = batch.records.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(order, vec!["A", "B"]);

    let a = batch.get("A").unwrap();
    assert!((a.change_pct - 10.0).abs() < 1e-9);
    assert!((a.change - 10.0).abs() < 1e-9);
    assert_eq!(a.name, "Alpha Index");
    assert_eq!(a.region, "North");

    let b = batch.get("B").unwrap();
    assert!((b.change_pct + 10.0).abs() < 1e-9);
    assert_eq!(b.currency, "EUR");
    assert_eq!(format!("{:+.2}", b.change_pct), "-10.00");
}

#[tokio::test(start_paused = true)]
async fn percent_change_uses_last_two_of_many_bars() {
    let source = ScriptedSource::default().recent("A", vec![Ok(bars(&[80.0, 90.0, 120.0, 126.0]))]);
    let batch = pipeline(source).fetch_quotes(&symbols(&["A"])).await.unwrap();
    let a = batch.get("A").unwrap();
    assert_eq!(a.price, 126.0);
    assert!((a.change_pct - 100.0 * (126.0 - 120.0) / 120.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn one_invalid_symbol_is_isolated() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 101.0]))])
        .recent("B", vec![Ok(bars(&[100.0, 99.0]))]);
    let batch = pipeline(source)
        .fetch_quotes(&symbols(&["A", "BAD", "B"]))
        .await
        .unwrap();

    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.unavailable.len(), 1);
    assert_eq!(batch.unavailable[0].symbol, "BAD");
    assert!(matches!(
        batch.unavailable[0].reason,
        UnavailableReason::Rejected { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn single_observation_is_omitted_by_default() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 102.0]))])
        .recent("C", vec![Ok(bars(&[55.0]))]);
    let batch = pipeline(source)
        .fetch_quotes(&symbols(&["A", "C"]))
        .await
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert!(batch.get("C").is_none());
    assert_eq!(
        batch.unavailable[0].reason,
        UnavailableReason::InsufficientData { observations: 1 }
    );
    assert!(batch.records.iter().all(|r| r.change_pct.is_finite()));
}

#[tokio::test(start_paused = true)]
async fn single_observation_reports_zero_change_when_configured() {
    let source = ScriptedSource::default()
        .recent("C", vec![Ok(bars(&[55.0]))])
        .recent("B", vec![Ok(Vec::new())]);
    let batch = pipeline_with(source, InsufficientHistoryPolicy::ZeroChange)
        .fetch_quotes(&symbols(&["C", "B"]))
        .await
        .unwrap();

    let c = batch.get("C").unwrap();
    assert_eq!(c.change, 0.0);
    assert_eq!(c.change_pct, 0.0);
    assert_eq!(c.price, 55.0);
    // No observations at all is still omitted.
    assert_eq!(
        batch.unavailable[0].reason,
        UnavailableReason::InsufficientData { observations: 0 }
    );
}

#[tokio::test(start_paused = true)]
async fn unusable_closes_are_discarded() {
    let mut raw = bars(&[100.0, 0.0, 110.0]);
    raw[1].close = f64::NAN;
    let source = ScriptedSource::default().recent("A", vec![Ok(raw)]);
    let batch = pipeline(source).fetch_quotes(&symbols(&["A"])).await.unwrap();
    // Only the last two bars are requested; the NaN one is dropped, leaving one.
    assert!(batch.records.is_empty());
    assert_eq!(
        batch.unavailable[0].reason,
        UnavailableReason::InsufficientData { observations: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_on_third_attempt() {
    let source = ScriptedSource::default().recent(
        "A",
        vec![transient(), transient(), Ok(bars(&[100.0, 105.0]))],
    );
    let pipeline = pipeline(source);
    let batch = pipeline.fetch_quotes(&symbols(&["A"])).await.unwrap();

    assert_eq!(batch.records.len(), 1);
    assert!((batch.records[0].change_pct - 5.0).abs() < 1e-9);
    assert_eq!(pipeline.source().calls("A"), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_batch() {
    let source = ScriptedSource::default().recent("A", vec![transient()]);
    let pipeline = pipeline(source);
    let err = pipeline.fetch_quotes(&symbols(&["A"])).await.unwrap_err();

    match err {
        PipelineError::DataUnavailable { symbols, message } => {
            assert_eq!(symbols, vec!["A".to_string()]);
            assert!(message.contains("3 attempts"));
        }
        other => panic!("expected DataUnavailable, got {:?}", other),
    }
    assert_eq!(pipeline.source().calls("A"), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_symbol_next_to_healthy_one_is_a_notice() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 101.0]))])
        .recent("B", vec![transient()]);
    let batch = pipeline(source)
        .fetch_quotes(&symbols(&["A", "B"]))
        .await
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.unavailable.len(), 1);
    assert!(batch.unavailable[0].is_exhausted());
    assert!(matches!(
        batch.unavailable[0].reason,
        UnavailableReason::RetriesExhausted { attempts: 3, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn all_rejected_symbols_return_empty_batch_with_notices() {
    let batch = pipeline(ScriptedSource::default())
        .fetch_quotes(&symbols(&["X", "Y"]))
        .await
        .unwrap();
    assert!(batch.records.is_empty());
    assert_eq!(batch.unavailable.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_symbol_set_is_invalid() {
    let err = pipeline(ScriptedSource::default())
        .fetch_quotes(&[])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[tokio::test(start_paused = true)]
async fn duplicate_symbols_are_fetched_once() {
    let source = ScriptedSource::default().recent("A", vec![Ok(bars(&[1.0, 2.0]))]);
    let pipeline = pipeline(source);
    let batch = pipeline
        .fetch_quotes(&symbols(&["A", " A", "A "]))
        .await
        .unwrap();
    assert_eq!(batch.records.len(), 1);
    assert_eq!(pipeline.source().calls("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_catalog_symbol_uses_fallback_descriptor() {
    let source = ScriptedSource::default().recent("ZZZ", vec![Ok(bars(&[10.0, 11.0]))]);
    let batch = pipeline(source).fetch_quotes(&symbols(&["ZZZ"])).await.unwrap();
    let z = batch.get("ZZZ").unwrap();
    assert_eq!(z.name, "ZZZ");
    assert_eq!(z.region, "Unknown");
    assert_eq!(z.currency, "USD");
}

#[tokio::test(start_paused = true)]
async fn history_is_normalized_and_missing_symbols_omitted() {
    let source = ScriptedSource::default()
        .history("A", vec![Ok(bars(&[200.0, 220.0, 190.0]))])
        .history("B", vec![Ok(Vec::new())]);
    let batch = pipeline(source)
        .fetch_history(&symbols(&["A", "B"]), LookbackPeriod::SixMonths)
        .await
        .unwrap();

    assert_eq!(batch.series.len(), 1);
    let a = batch.get("A").unwrap();
    assert_eq!(a.period, LookbackPeriod::SixMonths);
    assert_eq!(a.points[0].normalized_pct, 0.0);
    assert!((a.points[1].normalized_pct - 10.0).abs() < 1e-9);
    assert!((a.points[2].normalized_pct + 5.0).abs() < 1e-9);

    assert!(batch.by_symbol().get("B").is_none());
    assert_eq!(batch.unavailable[0].symbol, "B");
    assert_eq!(batch.unavailable[0].reason, UnavailableReason::NoData);
}

#[tokio::test(start_paused = true)]
async fn history_retry_exhaustion_fails_the_batch() {
    let source = ScriptedSource::default().history("A", vec![transient()]);
    let err = pipeline(source)
        .fetch_history(&symbols(&["A"]), LookbackPeriod::OneYear)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::DataUnavailable { .. }));
}

fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + i as f64).collect()
}

#[tokio::test(start_paused = true)]
async fn refresh_builds_new_state() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 110.0]))])
        .recent("B", vec![Ok(bars(&[50.0, 45.0]))])
        .recent("C", vec![Ok(bars(&[10.0, 10.0]))])
        .history("A", vec![Ok(bars(&rising(30)))])
        .history("B", vec![Ok(bars(&[5.0; 15]))]);
    let pipeline = pipeline(source);
    let initial = DashboardState::default();

    let request = RefreshRequest::new(["A", "B", "C"])
        .with_default_chart_count(2)
        .with_period(LookbackPeriod::ThreeMonths);
    let state = pipeline.refresh(&initial, &request).await.unwrap();

    assert!(initial.is_initial());
    assert_eq!(state.generation, 1);
    assert!(state.refreshed_at.is_some());
    assert_eq!(state.period, LookbackPeriod::ThreeMonths);
    assert_eq!(state.quotes.records.len(), 3);
    assert_eq!(state.history.series.len(), 2);
    assert_eq!(pipeline.source().calls("C"), 1);

    let a = state.indicators_for("A").unwrap();
    assert!(a.sma_20.is_some());
    assert!(a.sma_50.is_none());
    assert_eq!(a.rsi_14, Some(100.0));

    let b = state.indicators_for("B").unwrap();
    assert!(b.sma_20.is_none());
    assert_eq!(b.rsi_14, Some(100.0));

    let summary = state.market_summary();
    assert_eq!(summary.advancing, 1);
    assert_eq!(summary.declining, 1);
    assert_eq!(summary.unchanged, 1);

    let north = state.filtered_quotes(&QuoteFilter::new().with_regions(["north"]));
    assert_eq!(north.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn explicit_chart_symbols_are_used() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 110.0]))])
        .recent("B", vec![Ok(bars(&[50.0, 45.0]))])
        .history("B", vec![Ok(bars(&[5.0, 5.5]))]);
    let pipeline = pipeline(source);
    let request = RefreshRequest::new(["A", "B"]).with_chart_symbols(["B"]);
    let state = pipeline
        .refresh(&DashboardState::default(), &request)
        .await
        .unwrap();

    assert_eq!(state.history.series.len(), 1);
    assert_eq!(state.history.series[0].symbol, "B");
    assert_eq!(pipeline.source().calls("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_leaves_previous_state_usable() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 110.0])), transient()])
        .history("A", vec![Ok(bars(&[100.0, 110.0]))]);
    let pipeline = QuotePipeline::with_shared_source(
        Arc::new(source),
        IndexCatalog::from_yaml_str(CATALOG).unwrap(),
        config(InsufficientHistoryPolicy::Omit),
    );
    let request = RefreshRequest::new(["A"]);

    let first = pipeline
        .refresh(&DashboardState::default(), &request)
        .await
        .unwrap();
    let second = pipeline.refresh(&first, &request).await;

    assert!(matches!(second, Err(PipelineError::DataUnavailable { .. })));
    assert_eq!(first.generation, 1);
    assert_eq!(first.quotes.records.len(), 1);
    assert!((first.quotes.records[0].change_pct - 10.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn concurrency_of_one_still_fetches_everything() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[1.0, 2.0]))])
        .recent("B", vec![Ok(bars(&[2.0, 1.0]))])
        .recent("C", vec![transient(), Ok(bars(&[3.0, 3.3]))]);
    let catalog = IndexCatalog::from_yaml_str(CATALOG).unwrap();
    let mut cfg = config(InsufficientHistoryPolicy::Omit);
    cfg.concurrency = 1;
    let pipeline = QuotePipeline::new(source, catalog, cfg);

    let batch = pipeline
        .fetch_quotes(&symbols(&["C", "B", "A"]))
        .await
        .unwrap();
    let order: Vec<&str> = batch.records.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(order, vec!["C", "B", "A"]);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetch_does_not_take_down_siblings() {
    let source = ScriptedSource::default()
        .recent("A", vec![Ok(bars(&[100.0, 104.0]))])
        .panics("B");
    let batch = pipeline(source)
        .fetch_quotes(&symbols(&["A", "B"]))
        .await
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert!((batch.get("A").unwrap().change_pct - 4.0).abs() < 1e-9);
    assert_eq!(batch.unavailable.len(), 1);
    assert_eq!(batch.unavailable[0].symbol, "B");
    assert!(matches!(
        batch.unavailable[0].reason,
        UnavailableReason::TaskFailed { .. }
    ));
    assert!(!batch.unavailable[0].is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn each_failed_task_reports_its_own_panic() {
    let source = ScriptedSource::default()
        .panics("A")
        .recent("B", vec![Ok(bars(&[50.0, 55.0]))])
        .panics("C");
    let batch = pipeline(source)
        .fetch_quotes(&symbols(&["A", "B", "C"]))
        .await
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert!(batch.get("B").is_some());

    let notices: Vec<(&str, String)> = batch
        .unavailable
        .iter()
        .map(|n| match &n.reason {
            UnavailableReason::TaskFailed { message } => (n.symbol.as_str(), message.clone()),
            other => panic!("expected TaskFailed for {}, got {:?}", n.symbol, other),
        })
        .collect();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].0, "A");
    assert!(notices[0].1.contains("source blew up on A"));
    assert_eq!(notices[1].0, "C");
    assert!(notices[1].1.contains("source blew up on C"));
}
