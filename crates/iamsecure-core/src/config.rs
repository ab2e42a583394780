use crate::checks::multi::DEFAULT_CONCURRENT_CHECKS;
use crate::checks::stale_keys::{StaleKeyOptions, DEFAULT_UNUSED_DAYS_LIMIT};
use crate::directory::{HttpDirectory, IdentityDirectory, SnapshotDirectory};
use crate::scan::DEFAULT_USER_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const ENV_UNUSED_DAYS_LIMIT: &str = "STALE_ACCESS_KEYS_UNUSED_DAYS_LIMIT";
pub const ENV_USER_BATCH_SIZE: &str = "IAMSECURE_USER_BATCH_SIZE";
pub const ENV_CHECK_CONCURRENCY: &str = "IAMSECURE_CHECK_CONCURRENCY";
pub const ENV_DIRECTORY_URL: &str = "IAMSECURE_DIRECTORY_URL";
pub const ENV_DIRECTORY_TOKEN: &str = "IAMSECURE_DIRECTORY_TOKEN";

/// Invalid construction arguments, reported before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one security check must be requested")]
    NoChecks,

    #[error("security check names must not be blank")]
    BlankCheckName,

    #[error("number of concurrent checks must be greater than 0 (got {0})")]
    InvalidConcurrency(usize),

    #[error("user batch size must be greater than 0 (got {0})")]
    InvalidBatchSize(usize),

    #[error("unsupported checks: {}", .0.join(", "))]
    UnsupportedChecks(Vec<String>),

    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: String, value: String },

    #[error("no identity directory configured")]
    MissingDirectory,

    #[error("{0}")]
    Load(String),
}

/// Where the audited users come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectorySource {
    Snapshot {
        path: PathBuf,
    },
    Http {
        base_url: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl DirectorySource {
    pub fn connect(&self) -> anyhow::Result<Arc<dyn IdentityDirectory>> {
        let directory: Arc<dyn IdentityDirectory> = match self {
            DirectorySource::Snapshot { path } => Arc::new(SnapshotDirectory::from_path(path)?),
            DirectorySource::Http { base_url, token } => {
                Arc::new(HttpDirectory::new(base_url, token.clone())?)
            }
        };
        Ok(directory)
    }
}

/// Audit settings loaded from `iamsecure.toml`, the environment and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Days without use after which an active access key is stale.
    pub unused_days_limit: i64,
    /// Users inspected concurrently inside one check.
    pub user_batch_size: usize,
    /// Checks run concurrently by the aggregator.
    pub check_concurrency: usize,
    pub directory: Option<DirectorySource>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            unused_days_limit: DEFAULT_UNUSED_DAYS_LIMIT,
            user_batch_size: DEFAULT_USER_BATCH_SIZE,
            check_concurrency: DEFAULT_CONCURRENT_CHECKS,
            directory: None,
        }
    }
}

impl AuditConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Load(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ConfigError::Load(format!("Invalid config file '{}': {}", path.display(), e))
        })
    }

    /// Overlay values from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup. Blank values are ignored.
    pub fn with_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var(ENV_UNUSED_DAYS_LIMIT) {
            self.unused_days_limit = parse_setting(ENV_UNUSED_DAYS_LIMIT, &raw)?;
        }
        if let Some(raw) = var(ENV_USER_BATCH_SIZE) {
            self.user_batch_size = parse_setting(ENV_USER_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = var(ENV_CHECK_CONCURRENCY) {
            self.check_concurrency = parse_setting(ENV_CHECK_CONCURRENCY, &raw)?;
        }
        if let Some(base_url) = var(ENV_DIRECTORY_URL) {
            self.directory = Some(DirectorySource::Http {
                base_url: base_url.trim().to_string(),
                token: var(ENV_DIRECTORY_TOKEN),
            });
        }

        Ok(self)
    }

    /// The configured directory, required before a report can run.
    pub fn directory_source(&self) -> Result<&DirectorySource, ConfigError> {
        self.directory.as_ref().ok_or(ConfigError::MissingDirectory)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(0));
        }
        if self.check_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(0));
        }
        StaleKeyOptions {
            unused_days_limit: self.unused_days_limit,
        }
        .validate()
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
