//! Index reference table: symbol to display name, region, and currency.
//!
//! The table lives in `seed_data/indices.yml` and is embedded at compile time
//! with `include_str!`. An alternative file with the same schema can be
//! loaded at runtime to change the tracked universe without a rebuild.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version this build understands.
pub const CATALOG_VERSION: u32 = 1;

/// Region reported for symbols missing from the catalog.
pub const UNKNOWN_REGION: &str = "Unknown";
/// Currency reported for symbols missing from the catalog.
pub const FALLBACK_CURRENCY: &str = "USD";

/// Error types for catalog operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse index catalog YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("Failed to read index catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported index catalog version {found} (expected {})", CATALOG_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("Duplicate symbol in index catalog: {0}")]
    DuplicateSymbol(String),
    #[error("Index catalog entry has an empty symbol")]
    EmptySymbol,
}

/// Whether an index is tracked by default or only on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexGroup {
    #[default]
    Default,
    Additional,
}

/// Static metadata for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub symbol: String,
    pub name: String,
    pub region: String,
    pub currency: String,
    #[serde(default)]
    pub group: IndexGroup,
}

impl IndexDescriptor {
    /// Descriptor used for symbols the catalog does not know about.
    pub fn fallback(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            region: UNKNOWN_REGION.to_string(),
            currency: FALLBACK_CURRENCY.to_string(),
            group: IndexGroup::Additional,
        }
    }
}

/// Top-level structure of the catalog YAML file.
#[derive(Deserialize, Debug)]
struct CatalogFile {
    version: u32,
    indices: Vec<IndexDescriptor>,
}

/// Validated, read-only index reference table. Order follows the file.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    version: u32,
    indices: Vec<IndexDescriptor>,
}

impl IndexCatalog {
    /// Parse and validate catalog YAML.
    pub fn from_yaml_str(yaml_content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yml::from_str(yaml_content)?;
        if file.version != CATALOG_VERSION {
            return Err(CatalogError::UnsupportedVersion {
                found: file.version,
            });
        }

        let mut seen = HashSet::new();
        let mut indices = Vec::with_capacity(file.indices.len());
        for mut index in file.indices {
            index.symbol = index.symbol.trim().to_string();
            if index.symbol.is_empty() {
                return Err(CatalogError::EmptySymbol);
            }
            if !seen.insert(index.symbol.clone()) {
                return Err(CatalogError::DuplicateSymbol(index.symbol));
            }
            indices.push(index);
        }

        Ok(Self {
            version: file.version,
            indices,
        })
    }

    /// Load a catalog from a YAML file on disk.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load the catalog embedded at compile time.
    pub fn embedded() -> Result<Self, CatalogError> {
        let yaml_content = include_str!("../../seed_data/indices.yml");
        Self::from_yaml_str(yaml_content)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn indices(&self) -> &[IndexDescriptor] {
        &self.indices
    }

    pub fn get(&self, symbol: &str) -> Option<&IndexDescriptor> {
        self.indices.iter().find(|i| i.symbol == symbol)
    }

    /// Catalog entry for `symbol`, or the unknown-symbol fallback.
    pub fn describe(&self, symbol: &str) -> IndexDescriptor {
        self.get(symbol)
            .cloned()
            .unwrap_or_else(|| IndexDescriptor::fallback(symbol))
    }

    pub fn group(&self, group: IndexGroup) -> Vec<&IndexDescriptor> {
        self.indices.iter().filter(|i| i.group == group).collect()
    }

    /// Symbols tracked when the caller does not choose any.
    pub fn default_symbols(&self) -> Vec<String> {
        self.group(IndexGroup::Default)
            .into_iter()
            .map(|i| i.symbol.clone())
            .collect()
    }

    pub fn all_symbols(&self) -> Vec<String> {
        self.indices.iter().map(|i| i.symbol.clone()).collect()
    }

    /// Distinct regions, sorted.
    pub fn regions(&self) -> BTreeSet<&str> {
        self.indices.iter().map(|i| i.region.as_str()).collect()
    }
}
