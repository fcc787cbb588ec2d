use anyhow::Result;
use clap::Args;
use indextracker_lib::summary;
use indextracker_lib::{MarketDataSource, QuotePipeline};

use crate::commands::{spinner, FilterArgs, SymbolArgs};
use crate::output::{print_notices, print_quotes, OutputFormat};

#[derive(Args)]
pub struct QuotesArgs {
    #[command(flatten)]
    pub symbols: SymbolArgs,

    #[command(flatten)]
    pub filter: FilterArgs,
}

pub async fn run<S: MarketDataSource>(
    args: &QuotesArgs,
    pipeline: &QuotePipeline<S>,
    format: &OutputFormat,
) -> Result<()> {
    let filter = args.filter.to_filter()?;
    let symbols = args.symbols.resolve(pipeline.catalog());

    let pb = spinner(format!("fetching quotes for {} indices...", symbols.len()));
    let fetched = pipeline.fetch_quotes(&symbols).await;
    pb.finish_and_clear();
    let batch = fetched?;

    let overview = summary::market_summary(&batch.records);
    let records = filter.apply(&batch.records);
    eprintln!(
        "{} of {} indices shown ({} advancing, {} declining, {} unchanged) - {}",
        records.len(),
        overview.total,
        overview.advancing,
        overview.declining,
        overview.unchanged,
        overview.sentiment
    );
    print_notices(&batch.unavailable);

    print_quotes(&records, format)
}
