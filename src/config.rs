//! Engine configuration
//!
//! Defaults, an optional JSON file and the process environment are layered
//! into a single `EngineConfig` that is validated once at startup, before any
//! statement is generated.

use crate::error::{Result, TablesplitError};
use crate::shard::BoundaryMode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

pub const DATABASE_ENV: &str = "DATABASE";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const PARALLEL_ENV: &str = "PARALLEL";
pub const SHARD_COUNT_ENV: &str = "TABLESPLIT_SHARD_COUNT";
pub const SHARD_SIZE_ENV: &str = "TABLESPLIT_SHARD_SIZE";

pub const DEFAULT_SHARD_COUNT: usize = 200;
pub const DEFAULT_SHARD_SIZE: u64 = 50_000;

/// Shard tables carry a three-digit suffix.
pub const MAX_SHARD_COUNT: usize = 1000;

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

fn identifier_pattern() -> &'static Regex {
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles")
    })
}

/// Layout of the logical table and how to reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connection string; only needed by modes that touch the store
    pub database_url: Option<String>,

    /// Worker-pool size; only needed by modes that touch the store
    pub parallel: Option<usize>,

    /// Raw `PARALLEL` from the environment. Parsed by `store()` only, so modes
    /// that never touch the store ignore it.
    #[serde(skip)]
    pub parallel_env: Option<String>,

    pub shard_count: usize,
    pub shard_size: u64,

    /// Logical table the shards are carved out of
    pub source_table: String,
    pub key_column: String,
    pub content_column: String,

    pub boundary: BoundaryMode,

    /// Applied with `SET statement_timeout` on every worker connection
    pub statement_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            parallel: None,
            parallel_env: None,
            shard_count: DEFAULT_SHARD_COUNT,
            shard_size: DEFAULT_SHARD_SIZE,
            source_table: "files".to_string(),
            key_column: "id".to_string(),
            content_column: "contents".to_string(),
            boundary: BoundaryMode::default(),
            statement_timeout_ms: None,
        }
    }
}

/// Settings the worker pool needs, present only once they were validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub parallel: usize,
    pub statement_timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Load defaults, the optional JSON file, then `.env` and the process
    /// environment, and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Overlay values from an environment lookup. Set-but-malformed layout
    /// values are rejected here; unset values keep whatever the lower layer
    /// provided. `PARALLEL` is kept raw until `store()`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(DATABASE_ENV).or_else(|| get(DATABASE_URL_ENV)) {
            self.database_url = Some(url);
        }
        if let Some(raw) = get(PARALLEL_ENV) {
            self.parallel_env = Some(raw);
        }
        if let Some(raw) = get(SHARD_COUNT_ENV) {
            self.shard_count = parse_env(SHARD_COUNT_ENV, &raw)?;
        }
        if let Some(raw) = get(SHARD_SIZE_ENV) {
            self.shard_size = parse_env(SHARD_SIZE_ENV, &raw)?;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || self.shard_count > MAX_SHARD_COUNT {
            return Err(TablesplitError::Config(format!(
                "shard_count must be between 1 and {}, got {}",
                MAX_SHARD_COUNT, self.shard_count
            )));
        }
        if self.shard_size == 0 {
            return Err(TablesplitError::Config("shard_size must be at least 1".to_string()));
        }
        if self.shard_size.checked_mul(self.shard_count as u64).is_none() {
            return Err(TablesplitError::Config(
                "shard_count * shard_size overflows the key domain".to_string(),
            ));
        }

        for (field, value) in [
            ("source_table", &self.source_table),
            ("key_column", &self.key_column),
            ("content_column", &self.content_column),
        ] {
            if !identifier_pattern().is_match(value) {
                return Err(TablesplitError::Config(format!(
                    "{} '{}' is not a plain SQL identifier",
                    field, value
                )));
            }
        }

        if self.parallel == Some(0) {
            return Err(TablesplitError::Config(format!("{} must be at least 1", PARALLEL_ENV)));
        }

        Ok(())
    }

    /// Store settings for modes that execute statements. Fails when either the
    /// connection string or the worker count is missing or malformed.
    pub fn store(&self) -> Result<StoreConfig> {
        let database_url = self
            .database_url
            .clone()
            .ok_or_else(|| TablesplitError::Config(format!("{} is not set", DATABASE_ENV)))?;

        let parallel = match &self.parallel_env {
            Some(raw) => Some(parse_env::<usize>(PARALLEL_ENV, raw)?),
            None => self.parallel,
        };
        let parallel = match parallel {
            Some(0) => {
                return Err(TablesplitError::Config(format!("{} must be at least 1", PARALLEL_ENV)))
            }
            Some(n) => n,
            None => {
                return Err(TablesplitError::Config(format!("{} is not set", PARALLEL_ENV)))
            }
        };

        Ok(StoreConfig {
            database_url,
            parallel,
            statement_timeout_ms: self.statement_timeout_ms,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        TablesplitError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
    })
}
