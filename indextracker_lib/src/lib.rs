//! Library layer for the global index tracker: quote and history fetching,
//! derived metrics, filtering, and market summaries.
//!
//! The [`QuotePipeline`] pulls daily bars from any [`MarketDataSource`]
//! (Yahoo Finance in production), isolates per-symbol failures, and turns the
//! results into quote records, normalized history, and technical indicators.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod state;
pub mod summary;
pub mod types;
pub mod yahoo;

pub use catalog::{CatalogError, IndexCatalog, IndexDescriptor, IndexGroup};
pub use config::{InsufficientHistoryPolicy, PipelineConfig};
pub use error::{PipelineError, SymbolUnavailable, UnavailableReason};
pub use filter::{ChangeBucket, QuoteFilter};
pub use pipeline::{HistoryBatch, QuoteBatch, QuotePipeline};
pub use retry::RetryPolicy;
pub use source::{MarketDataSource, SourceError};
pub use state::{DashboardState, RefreshRequest};
pub use types::{
    Bar, HistoryPoint, HistorySeries, LookbackPeriod, QuoteRecord, RefreshInterval,
    TechnicalSnapshot,
};
pub use yahoo::YahooSource;
