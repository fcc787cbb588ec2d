//! CLI subcommand implementations.

pub mod history;
pub mod indicators;
pub mod indices;
pub mod quotes;
pub mod summary;
pub mod watch;

use std::borrow::Cow;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use indextracker_lib::{ChangeBucket, IndexCatalog, QuoteFilter};

/// Which indices a command works on.
#[derive(Args, Debug, Clone, Default)]
pub struct SymbolArgs {
    /// Comma-separated symbols to use instead of the defaults (e.g. ^GSPC,^N225)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Comma-separated symbols to track in addition to the defaults
    #[arg(long, value_delimiter = ',')]
    pub add: Vec<String>,

    /// Track every index in the catalog
    #[arg(long, conflicts_with = "symbols")]
    pub all: bool,
}

impl SymbolArgs {
    /// Explicit `--symbols` win; otherwise the default (or full) catalog set
    /// plus any `--add` symbols not already in it.
    pub fn resolve(&self, catalog: &IndexCatalog) -> Vec<String> {
        if !self.symbols.is_empty() {
            return self.symbols.clone();
        }
        let mut symbols = if self.all {
            catalog.all_symbols()
        } else {
            catalog.default_symbols()
        };
        for extra in &self.add {
            let extra = extra.trim();
            if !extra.is_empty() && !symbols.iter().any(|s| s == extra) {
                symbols.push(extra.to_string());
            }
        }
        symbols
    }

    pub fn is_explicit(&self) -> bool {
        !self.symbols.is_empty() || !self.add.is_empty() || self.all
    }
}

/// Quote filter flags shared by `quotes`, `summary`, and `watch`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Comma-separated regions to keep (case-insensitive)
    #[arg(long, value_delimiter = ',')]
    pub region: Vec<String>,

    /// Minimum daily change in percent (inclusive)
    #[arg(long, allow_hyphen_values = true)]
    pub min_change: Option<f64>,

    /// Maximum daily change in percent (inclusive)
    #[arg(long, allow_hyphen_values = true)]
    pub max_change: Option<f64>,

    /// Comma-separated change buckets: gain, loss, unchanged
    #[arg(long, value_delimiter = ',')]
    pub bucket: Vec<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Result<QuoteFilter> {
        let mut filter = QuoteFilter::new();
        if !self.region.is_empty() {
            filter = filter.with_regions(self.region.iter().map(String::as_str));
        }
        if let Some(min) = self.min_change {
            filter = filter.with_min_change(min);
        }
        if let Some(max) = self.max_change {
            filter = filter.with_max_change(max);
        }
        if !self.bucket.is_empty() {
            let buckets = self
                .bucket
                .iter()
                .map(|b| b.parse::<ChangeBucket>().map_err(|e| anyhow!(e)))
                .collect::<Result<Vec<_>>>()?;
            filter = filter.with_buckets(buckets);
        }
        if let (Some(min), Some(max)) = (self.min_change, self.max_change) {
            if min > max {
                return Err(anyhow!(
                    "--min-change ({}) must not exceed --max-change ({})",
                    min,
                    max
                ));
            }
        }
        Ok(filter)
    }
}

/// Stderr spinner shown while a network fetch is in flight.
pub fn spinner(message: impl Into<Cow<'static, str>>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message);
    pb
}
