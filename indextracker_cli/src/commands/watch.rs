use anyhow::Result;
use clap::Args;
use indextracker_lib::{
    DashboardState, IndexCatalog, LookbackPeriod, MarketDataSource, PipelineError, QuoteFilter,
    QuotePipeline, RefreshInterval, RefreshRequest,
};
use tokio::time::MissedTickBehavior;

use crate::commands::{spinner, FilterArgs, SymbolArgs};
use crate::output::{print_indicators, print_json, print_notices, print_quotes, OutputFormat};

#[derive(Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub symbols: SymbolArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Refresh interval: 1m, 5m, 15m, 30m, 1h
    #[arg(long, default_value = "15m")]
    pub interval: String,

    /// Comma-separated symbols to compute indicators for (default: first 3 quoted)
    #[arg(long, value_delimiter = ',')]
    pub chart: Vec<String>,

    /// Lookback period for indicators: 1mo, 3mo, 6mo, 1y, 2y, 5y
    #[arg(long, default_value = "1y")]
    pub period: String,

    /// Stop after this many refresh cycles
    #[arg(long)]
    pub cycles: Option<u64>,
}

/// Keep the previous state when a refresh fails.
fn settle(state: DashboardState, outcome: Result<DashboardState, PipelineError>) -> DashboardState {
    match outcome {
        Ok(next) => next,
        Err(err) => {
            if state.is_initial() {
                tracing::error!("Refresh failed, no data yet: {}", err);
            } else {
                tracing::error!(
                    "Refresh failed, keeping data from refresh #{}: {}",
                    state.generation,
                    err
                );
            }
            state
        }
    }
}

fn render(
    state: &DashboardState,
    filter: &QuoteFilter,
    catalog: &IndexCatalog,
    format: &OutputFormat,
) -> Result<()> {
    if *format == OutputFormat::Json {
        print_json(state);
        return Ok(());
    }
    let overview = state.market_summary();
    let refreshed = state
        .refreshed_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    eprintln!(
        "Refresh #{} at {}: {} advancing, {} declining, {} unchanged - {}",
        state.generation,
        refreshed,
        overview.advancing,
        overview.declining,
        overview.unchanged,
        overview.sentiment
    );
    print_notices(&state.quotes.unavailable);
    print_notices(&state.history.unavailable);

    print_quotes(&state.filtered_quotes(filter), format)?;
    if !state.indicators.is_empty() {
        println!();
        print_indicators(&state.indicators, catalog, format)?;
    }
    Ok(())
}

pub async fn run<S: MarketDataSource>(
    args: &WatchArgs,
    pipeline: &QuotePipeline<S>,
    format: &OutputFormat,
) -> Result<()> {
    let interval: RefreshInterval = args.interval.parse()?;
    let period: LookbackPeriod = args.period.parse()?;
    let filter = args.filter.to_filter()?;

    let mut request =
        RefreshRequest::new(args.symbols.resolve(pipeline.catalog())).with_period(period);
    if !args.chart.is_empty() {
        request = request.with_chart_symbols(args.chart.iter().cloned());
    }

    eprintln!(
        "Watching {} indices every {} (Ctrl-C to stop)",
        request.symbols.len(),
        interval
    );

    let mut ticker = tokio::time::interval(interval.as_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut state = DashboardState::default();
    let mut cycles = 0u64;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {}
        }

        let pb = spinner(format!("refreshing {} indices...", request.symbols.len()));
        let outcome = tokio::select! {
            _ = &mut ctrl_c => {
                pb.finish_and_clear();
                break;
            }
            outcome = pipeline.refresh(&state, &request) => outcome,
        };
        pb.finish_and_clear();

        let refreshed = outcome.is_ok();
        state = settle(state, outcome);
        if refreshed {
            render(&state, &filter, pipeline.catalog(), format)?;
        }

        cycles += 1;
        if args.cycles.is_some_and(|max| cycles >= max) {
            break;
        }
    }

    eprintln!("Stopped after {} refreshes", state.generation);
    Ok(())
}
