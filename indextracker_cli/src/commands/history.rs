use anyhow::Result;
use clap::Args;
use indextracker_lib::state::DEFAULT_CHART_COUNT;
use indextracker_lib::{IndexCatalog, LookbackPeriod, MarketDataSource, QuotePipeline};

use crate::commands::{spinner, SymbolArgs};
use crate::output::{print_history, print_notices, OutputFormat};

#[derive(Args)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub symbols: SymbolArgs,

    /// Lookback period: 1mo, 3mo, 6mo, 1y, 2y, 5y
    #[arg(long, default_value = "1y")]
    pub period: String,

    /// Only print the last N points per index
    #[arg(long)]
    pub tail: Option<usize>,
}

/// Symbols to chart: whatever was asked for, else the first few defaults.
pub fn chart_symbols(args: &SymbolArgs, catalog: &IndexCatalog) -> Vec<String> {
    let symbols = args.resolve(catalog);
    if args.is_explicit() {
        symbols
    } else {
        symbols.into_iter().take(DEFAULT_CHART_COUNT).collect()
    }
}

pub async fn run<S: MarketDataSource>(
    args: &HistoryArgs,
    pipeline: &QuotePipeline<S>,
    format: &OutputFormat,
) -> Result<()> {
    let period: LookbackPeriod = args.period.parse()?;
    let symbols = chart_symbols(&args.symbols, pipeline.catalog());

    let pb = spinner(format!("fetching {} history for {} indices...", period, symbols.len()));
    let fetched = pipeline.fetch_history(&symbols, period).await;
    pb.finish_and_clear();
    let mut batch = fetched?;

    for series in &batch.series {
        if let (Some(first), Some(last)) = (series.points.first(), series.points.last()) {
            eprintln!(
                "{}: {} points, {} to {}, {:+.2}% over {}",
                series.symbol,
                series.len(),
                first.date,
                last.date,
                last.normalized_pct,
                period
            );
        }
    }
    print_notices(&batch.unavailable);

    if let Some(tail) = args.tail {
        for series in &mut batch.series {
            let keep_from = series.points.len().saturating_sub(tail);
            series.points = series.points.split_off(keep_from);
        }
    }

    print_history(&batch.series, format)
}
