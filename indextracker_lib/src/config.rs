//! Pipeline configuration, read from `INDEXTRACKER_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const ENV_RETRY_MAX_ATTEMPTS: &str = "INDEXTRACKER_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "INDEXTRACKER_RETRY_BASE_MS";
pub const ENV_RETRY_MAX_MS: &str = "INDEXTRACKER_RETRY_MAX_MS";
pub const ENV_CONCURRENCY: &str = "INDEXTRACKER_CONCURRENCY";
pub const ENV_INSUFFICIENT_HISTORY: &str = "INDEXTRACKER_INSUFFICIENT_HISTORY";
pub const ENV_HISTORY_TTL_SECS: &str = "INDEXTRACKER_HISTORY_TTL_SECS";
pub const ENV_CATALOG: &str = "INDEXTRACKER_CATALOG";

/// What to do with a symbol whose quote cannot be computed because fewer
/// than two observations came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsufficientHistoryPolicy {
    /// Leave the symbol out and report a `SymbolUnavailable` notice.
    #[default]
    Omit,
    /// Report a single observation as an unchanged quote. Symbols with no
    /// observations are still omitted.
    ZeroChange,
}

impl FromStr for InsufficientHistoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "omit" | "drop" => Ok(Self::Omit),
            "zero" | "zero-change" | "zero_change" => Ok(Self::ZeroChange),
            other => Err(format!(
                "unknown insufficient-history policy '{}' (expected omit or zero)",
                other
            )),
        }
    }
}

/// Tunables for `QuotePipeline`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    /// Maximum number of symbols fetched at once.
    pub concurrency: usize,
    pub insufficient_history: InsufficientHistoryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 4,
            insufficient_history: InsufficientHistoryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by any `INDEXTRACKER_*` variables that parse.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let base_delay = parsed(ENV_RETRY_BASE_MS)
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.base_delay);
        let max_delay = parsed(ENV_RETRY_MAX_MS)
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.max_delay)
            .max(base_delay);

        let insufficient_history = match lookup(ENV_INSUFFICIENT_HISTORY) {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}; using default", e);
                defaults.insufficient_history
            }),
            None => defaults.insufficient_history,
        };

        Self {
            retry: RetryPolicy {
                max_attempts: parsed(ENV_RETRY_MAX_ATTEMPTS)
                    .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay,
                max_delay,
                jitter: defaults.retry.jitter,
            },
            concurrency: parsed(ENV_CONCURRENCY)
                .map(|n| n.max(1) as usize)
                .unwrap_or(defaults.concurrency),
            insufficient_history,
        }
    }
}

/// History cache lifetime from `INDEXTRACKER_HISTORY_TTL_SECS`, default 300s.
pub fn history_ttl_from_env() -> Duration {
    std::env::var(ENV_HISTORY_TTL_SECS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300))
}
