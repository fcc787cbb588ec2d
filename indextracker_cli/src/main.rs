mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indextracker_lib::config::{history_ttl_from_env, ENV_CATALOG};
use indextracker_lib::{
    IndexCatalog, InsufficientHistoryPolicy, PipelineConfig, QuotePipeline, YahooSource,
};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "indextracker")]
#[command(about = "Track global stock market indices: quotes, history, and technical indicators")]
struct Cli {
    /// Output format: table, json, csv, or markdown
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Index catalog YAML to use instead of the built-in one
    /// (also INDEXTRACKER_CATALOG)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Report a single observation as an unchanged quote instead of skipping it
    #[arg(long, global = true)]
    zero_change: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the indices in the catalog
    Indices(commands::indices::IndicesArgs),
    /// Fetch current quotes with day-over-day change
    Quotes(commands::quotes::QuotesArgs),
    /// Fetch closing-price history normalized to the first close
    History(commands::history::HistoryArgs),
    /// Compute SMA 20/50/200 and RSI 14
    Indicators(commands::indicators::IndicatorsArgs),
    /// Market breadth, region performance, and change distribution
    Summary(commands::summary::SummaryArgs),
    /// Refresh quotes on an interval until interrupted
    Watch(commands::watch::WatchArgs),
}

fn load_catalog(flag: Option<PathBuf>) -> Result<IndexCatalog> {
    let path = flag.or_else(|| std::env::var_os(ENV_CATALOG).map(PathBuf::from));
    match path {
        Some(path) => IndexCatalog::from_path(&path)
            .with_context(|| format!("loading catalog from {}", path.display())),
        None => Ok(IndexCatalog::embedded()?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("indextracker=info".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_flag(&cli.output);
    let catalog = load_catalog(cli.catalog)?;

    if let Commands::Indices(args) = &cli.command {
        return commands::indices::run(args, &catalog, &format);
    }

    let mut config = PipelineConfig::from_env();
    if cli.zero_change {
        config.insufficient_history = InsufficientHistoryPolicy::ZeroChange;
    }
    let source = YahooSource::new(history_ttl_from_env())?;
    let pipeline = QuotePipeline::new(source, catalog, config);

    match &cli.command {
        Commands::Indices(_) => {}
        Commands::Quotes(args) => commands::quotes::run(args, &pipeline, &format).await?,
        Commands::History(args) => commands::history::run(args, &pipeline, &format).await?,
        Commands::Indicators(args) => commands::indicators::run(args, &pipeline, &format).await?,
        Commands::Summary(args) => commands::summary::run(args, &pipeline, &format).await?,
        Commands::Watch(args) => commands::watch::run(args, &pipeline, &format).await?,
    }

    Ok(())
}
