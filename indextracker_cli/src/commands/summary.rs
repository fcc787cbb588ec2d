use anyhow::{bail, Result};
use clap::Args;
use indextracker_lib::summary::{self, DEFAULT_HISTOGRAM_BINS};
use indextracker_lib::{MarketDataSource, QuotePipeline};

use crate::commands::{spinner, FilterArgs, SymbolArgs};
use crate::output::{print_notices, print_summary, OutputFormat};

#[derive(Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub symbols: SymbolArgs,

    // Applies to region performance and the distribution only.
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Number of histogram bins for the change distribution
    #[arg(long, default_value_t = DEFAULT_HISTOGRAM_BINS)]
    pub bins: usize,
}

pub async fn run<S: MarketDataSource>(
    args: &SummaryArgs,
    pipeline: &QuotePipeline<S>,
    format: &OutputFormat,
) -> Result<()> {
    if args.bins == 0 {
        bail!("--bins must be at least 1");
    }
    let filter = args.filter.to_filter()?;
    let symbols = args.symbols.resolve(pipeline.catalog());

    let pb = spinner(format!("fetching quotes for {} indices...", symbols.len()));
    let fetched = pipeline.fetch_quotes(&symbols).await;
    pb.finish_and_clear();
    let batch = fetched?;
    print_notices(&batch.unavailable);

    let overview = summary::market_summary(&batch.records);
    let filtered = filter.apply(&batch.records);
    let regions = summary::region_performance(&filtered);
    let distribution = summary::change_distribution(&filtered, args.bins);

    print_summary(&overview, &regions, &distribution, format)
}
