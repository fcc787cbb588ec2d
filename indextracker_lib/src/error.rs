//! Error types for the library layer.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;

/// Errors that abort a whole pipeline call.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No symbol in the batch produced data and the upstream kept failing
    /// after retries.
    #[error("data unavailable for [{}]: {message}", .symbols.join(", "))]
    DataUnavailable {
        symbols: Vec<String>,
        message: String,
    },
    /// Caller-supplied input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Why a single symbol is missing from a batch result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnavailableReason {
    NoData,
    Rejected { message: String },
    InsufficientData { observations: usize },
    RetriesExhausted { attempts: u32, message: String },
    TaskFailed { message: String },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no data returned"),
            Self::Rejected { message } => write!(f, "rejected: {}", message),
            Self::InsufficientData { observations } => write!(
                f,
                "insufficient data ({} observation{}, need 2)",
                observations,
                if *observations == 1 { "" } else { "s" }
            ),
            Self::RetriesExhausted { attempts, message } => {
                write!(f, "gave up after {} attempts: {}", attempts, message)
            }
            Self::TaskFailed { message } => write!(f, "fetch task failed: {}", message),
        }
    }
}

/// An isolated per-symbol failure, reported alongside successful results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolUnavailable {
    pub symbol: String,
    pub reason: UnavailableReason,
}

impl SymbolUnavailable {
    pub fn new(symbol: impl Into<String>, reason: UnavailableReason) -> Self {
        Self {
            symbol: symbol.into(),
            reason,
        }
    }

    /// True when the symbol failed because the upstream never recovered.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.reason, UnavailableReason::RetriesExhausted { .. })
    }
}

impl fmt::Display for SymbolUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.symbol, self.reason)
    }
}
