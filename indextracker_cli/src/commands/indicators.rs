use anyhow::Result;
use clap::Args;
use indextracker_lib::metrics::{self, RSI_PERIOD, SMA_LONG};
use indextracker_lib::{LookbackPeriod, MarketDataSource, QuotePipeline, TechnicalSnapshot};

use crate::commands::history::chart_symbols;
use crate::commands::{spinner, SymbolArgs};
use crate::output::{print_indicators, print_notices, OutputFormat};

#[derive(Args)]
pub struct IndicatorsArgs {
    #[command(flatten)]
    pub symbols: SymbolArgs,

    /// Lookback period: 1mo, 3mo, 6mo, 1y, 2y, 5y. SMA 200 needs at least 1y.
    #[arg(long, default_value = "1y")]
    pub period: String,
}

pub async fn run<S: MarketDataSource>(
    args: &IndicatorsArgs,
    pipeline: &QuotePipeline<S>,
    format: &OutputFormat,
) -> Result<()> {
    let period: LookbackPeriod = args.period.parse()?;
    let symbols = chart_symbols(&args.symbols, pipeline.catalog());

    let pb = spinner(format!("computing indicators over {}...", period));
    let fetched = pipeline.fetch_history(&symbols, period).await;
    pb.finish_and_clear();
    let batch = fetched?;

    let snapshots: Vec<TechnicalSnapshot> =
        batch.series.iter().map(metrics::compute_indicators).collect();
    for series in &batch.series {
        if series.len() < SMA_LONG {
            tracing::info!(
                "{} has {} observations, too few for SMA {}",
                series.symbol,
                series.len(),
                SMA_LONG
            );
        }
        if series.len() <= RSI_PERIOD {
            tracing::info!("{} is too short for RSI {}", series.symbol, RSI_PERIOD);
        }
    }
    print_notices(&batch.unavailable);

    print_indicators(&snapshots, pipeline.catalog(), format)
}
