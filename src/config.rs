//! # Backend Configuration
//!
//! Centralized constants and the typed configuration consumed by
//! [`crate::container::RootContainer`]. Constants that depend on each other
//! are co-located; check the notes before changing one.
//!
//! ```text
//! DEFAULT_ENTRY_LIMIT (4000)
//!       per-key ID cap; beyond it an index key degrades to the
//!       undefined sentinel and searches on it fall back to a scan.
//!       Overridable per attribute via IndexConfig::entry_limit.
//!
//! DEFAULT_SUBSTRING_LENGTH (6)
//!       substring chunk size. Part of the substring index identity
//!       (tree name suffix "substring.<len>"): changing it means a
//!       different index that must be rebuilt, never reinterpreted.
//!
//! FILTER_CANDIDATE_THRESHOLD (10)
//!       engine-wide cap on index lookups per filter evaluation;
//!       once exhausted, remaining sub-filters evaluate as unindexed.
//! ```
//!
//! Configuration changes are applied live through
//! `RootContainer::apply_index_config`, which rebuilds only the affected
//! per-type index trees.

use crate::index::indexer::IndexType;
use eyre::{ensure, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub const DEFAULT_ENTRY_LIMIT: usize = 4000;
pub const DEFAULT_SUBSTRING_LENGTH: usize = 6;
pub const FILTER_CANDIDATE_THRESHOLD: usize = 10;

/// Index configuration for one attribute type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub types: BTreeSet<IndexType>,
    /// Per-attribute override of [`DEFAULT_ENTRY_LIMIT`].
    pub entry_limit: Option<usize>,
    pub substring_length: usize,
}

impl IndexConfig {
    pub fn new(types: impl IntoIterator<Item = IndexType>) -> IndexConfig {
        IndexConfig {
            types: types.into_iter().collect(),
            entry_limit: None,
            substring_length: DEFAULT_SUBSTRING_LENGTH,
        }
    }

    pub fn with_entry_limit(mut self, limit: usize) -> IndexConfig {
        self.entry_limit = Some(limit);
        self
    }

    pub fn with_substring_length(mut self, len: usize) -> IndexConfig {
        self.substring_length = len;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub db_path: PathBuf,
    pub base_dns: Vec<String>,
    pub default_entry_limit: usize,
    pub indexes: BTreeMap<String, IndexConfig>,
}

impl BackendConfig {
    pub fn builder() -> BackendConfigBuilder {
        BackendConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct BackendConfigBuilder {
    db_path: Option<PathBuf>,
    base_dns: Vec<String>,
    default_entry_limit: Option<usize>,
    indexes: BTreeMap<String, IndexConfig>,
}

impl BackendConfigBuilder {
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn base_dn(mut self, dn: impl Into<String>) -> Self {
        self.base_dns.push(dn.into());
        self
    }

    pub fn default_entry_limit(mut self, limit: usize) -> Self {
        self.default_entry_limit = Some(limit);
        self
    }

    pub fn index(mut self, attr: &str, config: IndexConfig) -> Self {
        self.indexes.insert(attr.to_ascii_lowercase(), config);
        self
    }

    pub fn build(self) -> Result<BackendConfig> {
        let db_path = self
            .db_path
            .ok_or_else(|| eyre::eyre!("db_path is required"))?;
        ensure!(!self.base_dns.is_empty(), "at least one base DN is required");
        for (attr, cfg) in &self.indexes {
            ensure!(
                !cfg.types.is_empty(),
                "index for '{}' configures no index types",
                attr
            );
            ensure!(
                cfg.substring_length >= 3,
                "substring length for '{}' must be at least 3",
                attr
            );
            if let Some(limit) = cfg.entry_limit {
                ensure!(limit > 0, "entry limit for '{}' must be positive", attr);
            }
        }
        Ok(BackendConfig {
            db_path,
            base_dns: self.base_dns,
            default_entry_limit: self.default_entry_limit.unwrap_or(DEFAULT_ENTRY_LIMIT),
            indexes: self.indexes,
        })
    }
}
