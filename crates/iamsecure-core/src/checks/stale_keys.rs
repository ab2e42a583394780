use crate::checker::{CheckError, CheckResult, Checker};
use crate::config::ConfigError;
use crate::directory::{AccessKeyMetadata, Identity, IdentityDirectory};
use crate::redact::{mask_key_id, redact_key_ids};
use crate::scan::{IdentityInspector, PaginatedBatchScanner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_UNUSED_DAYS_LIMIT: i64 = 90;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleKeyOptions {
    pub unused_days_limit: i64,
}

impl Default for StaleKeyOptions {
    fn default() -> Self {
        Self {
            unused_days_limit: DEFAULT_UNUSED_DAYS_LIMIT,
        }
    }
}

impl StaleKeyOptions {
    /// A negative limit would flag every active key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unused_days_limit < 0 {
            return Err(ConfigError::InvalidSetting {
                key: "unused_days_limit".to_string(),
                value: self.unused_days_limit.to_string(),
            });
        }
        Ok(())
    }
}

/// An active access key that has not been used for too long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleKeyFinding {
    pub identity_name: String,
    pub arn: String,
    pub masked_key_id: String,
    pub days_since_last_use: i64,
    pub never_used: bool,
}

/// Detects active access keys unused for at least `unused_days_limit` days.
///
/// Keys with no recorded use are aged from their creation date.
pub struct StaleAccessKeysChecker {
    directory: Arc<dyn IdentityDirectory>,
    options: StaleKeyOptions,
    scanner: PaginatedBatchScanner,
}

impl StaleAccessKeysChecker {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        options: StaleKeyOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            directory,
            options,
            scanner: PaginatedBatchScanner::default(),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, ConfigError> {
        self.scanner = PaginatedBatchScanner::new(batch_size)?;
        Ok(self)
    }

    pub fn unused_days_limit(&self) -> i64 {
        self.options.unused_days_limit
    }

    /// Run the check as if it started at `now`.
    pub async fn run_check_at(&self, now: DateTime<Utc>) -> Result<CheckResult, CheckError> {
        let inspector = StaleKeyInspector {
            now,
            unused_days_limit: self.options.unused_days_limit,
        };
        let findings = self
            .scanner
            .scan(Arc::clone(&self.directory), Arc::new(inspector))
            .await?;

        info!(
            count = findings.len(),
            unused_days_limit = self.options.unused_days_limit,
            "stale access key check finished"
        );

        if findings.is_empty() {
            return Ok(CheckResult::passed(json!({ "count": 0, "findings": [] })));
        }

        Ok(CheckResult::action_required(
            "Some users have stale access keys.",
            json!({ "count": findings.len(), "findings": findings }),
        ))
    }
}

#[async_trait]
impl Checker for StaleAccessKeysChecker {
    async fn run_check(&self) -> Result<CheckResult, CheckError> {
        self.run_check_at(Utc::now()).await
    }
}

/// Whole days from `earlier` to `later`, rounded down.
pub fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (later - earlier).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

struct StaleKeyInspector {
    now: DateTime<Utc>,
    unused_days_limit: i64,
}

impl StaleKeyInspector {
    /// Days since the key was last used, and whether it was never used.
    async fn key_age(
        &self,
        directory: &dyn IdentityDirectory,
        key: &AccessKeyMetadata,
    ) -> (i64, bool) {
        match directory.get_access_key_last_used(&key.access_key_id).await {
            Ok(Some(last_used)) => (days_between(self.now, last_used), false),
            Ok(None) => (days_between(self.now, key.create_date), true),
            Err(e) => {
                warn!(
                    key = %mask_key_id(&key.access_key_id),
                    error = %redact_key_ids(&e.to_string()),
                    transient = e.is_transient(),
                    "failed to get last used date for access key, falling back to creation date"
                );
                (days_between(self.now, key.create_date), true)
            }
        }
    }
}

#[async_trait]
impl IdentityInspector for StaleKeyInspector {
    type Finding = StaleKeyFinding;

    async fn inspect(
        &self,
        directory: &dyn IdentityDirectory,
        identity: &Identity,
    ) -> Result<Vec<StaleKeyFinding>, CheckError> {
        let keys = directory
            .list_access_keys(&identity.user_name)
            .await
            .map_err(|e| CheckError::directory("list_access_keys", e))?;

        let mut findings = Vec::new();
        for key in keys.iter().filter(|k| k.status.is_active()) {
            let (days, never_used) = self.key_age(directory, key).await;

            if days >= self.unused_days_limit {
                findings.push(StaleKeyFinding {
                    identity_name: identity.user_name.clone(),
                    arn: identity.arn.clone(),
                    masked_key_id: mask_key_id(&key.access_key_id),
                    days_since_last_use: days,
                    never_used,
                });
            }
        }

        Ok(findings)
    }
}
