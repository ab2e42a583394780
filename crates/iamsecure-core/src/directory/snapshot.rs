use super::{
    AccessKeyMetadata, DirectoryError, Identity, IdentityDirectory, IdentityPage, LoginProfile,
    MfaDevice,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Exported state of a directory, as stored in a snapshot JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySnapshot {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub users: Vec<SnapshotUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUser {
    pub user_name: String,
    pub arn: String,
    #[serde(default)]
    pub login_profile: Option<LoginProfile>,
    #[serde(default)]
    pub mfa_devices: Vec<MfaDevice>,
    #[serde(default)]
    pub access_keys: Vec<SnapshotAccessKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotAccessKey {
    #[serde(flatten)]
    pub metadata: AccessKeyMetadata,
    #[serde(default)]
    pub last_used_date: Option<DateTime<Utc>>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// In-memory directory serving a [`DirectorySnapshot`].
///
/// Pages are addressed by an opaque cursor holding the offset of the next
/// user. Failures can be injected per user or per key, and every call can be
/// delayed, which makes this the directory used by the test suites as well.
pub struct SnapshotDirectory {
    snapshot: DirectorySnapshot,
    login_profile_failures: HashMap<String, DirectoryError>,
    mfa_failures: HashMap<String, DirectoryError>,
    access_key_failures: HashMap<String, DirectoryError>,
    last_used_failures: HashMap<String, DirectoryError>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SnapshotDirectory {
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        Self {
            snapshot,
            login_profile_failures: HashMap::new(),
            mfa_failures: HashMap::new(),
            access_key_failures: HashMap::new(),
            last_used_failures: HashMap::new(),
            latency: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            anyhow::anyhow!("Failed to read directory snapshot '{}': {}", path.display(), error)
        })?;
        Self::from_json(&content).map_err(|error| {
            anyhow::anyhow!("Invalid directory snapshot '{}': {}", path.display(), error)
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let snapshot: DirectorySnapshot = serde_json::from_str(content)?;
        Ok(Self::new(snapshot))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.snapshot.page_size = page_size.max(1);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_login_profile(mut self, user_name: &str, error: DirectoryError) -> Self {
        self.login_profile_failures.insert(user_name.to_string(), error);
        self
    }

    pub fn fail_mfa_devices(mut self, user_name: &str, error: DirectoryError) -> Self {
        self.mfa_failures.insert(user_name.to_string(), error);
        self
    }

    pub fn fail_access_keys(mut self, user_name: &str, error: DirectoryError) -> Self {
        self.access_key_failures.insert(user_name.to_string(), error);
        self
    }

    pub fn fail_last_used(mut self, access_key_id: &str, error: DirectoryError) -> Self {
        self.last_used_failures.insert(access_key_id.to_string(), error);
        self
    }

    pub fn snapshot(&self) -> &DirectorySnapshot {
        &self.snapshot
    }

    /// Total number of directory calls served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn user(&self, user_name: &str) -> Result<&SnapshotUser, DirectoryError> {
        self.snapshot
            .users
            .iter()
            .find(|u| u.user_name == user_name)
            .ok_or_else(|| DirectoryError::NotFound(format!("user '{}'", user_name)))
    }

    fn access_key(&self, access_key_id: &str) -> Result<&SnapshotAccessKey, DirectoryError> {
        self.snapshot
            .users
            .iter()
            .flat_map(|u| u.access_keys.iter())
            .find(|k| k.metadata.access_key_id == access_key_id)
            .ok_or_else(|| DirectoryError::NotFound("access key".to_string()))
    }

    async fn enter(&self) -> CallGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = CallGuard {
            in_flight: &self.in_flight,
        };
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        guard
    }
}

struct CallGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn parse_cursor(cursor: Option<&str>) -> Result<usize, DirectoryError> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| DirectoryError::Malformed(format!("invalid cursor '{}'", raw))),
    }
}

#[async_trait]
impl IdentityDirectory for SnapshotDirectory {
    async fn list_identities(
        &self,
        cursor: Option<String>,
    ) -> Result<IdentityPage, DirectoryError> {
        let _guard = self.enter().await;
        let start = parse_cursor(cursor.as_deref())?;
        let page_size = self.snapshot.page_size.max(1);
        let end = (start + page_size).min(self.snapshot.users.len());

        let identities = self.snapshot.users[start.min(end)..end]
            .iter()
            .map(|u| Identity {
                user_name: u.user_name.clone(),
                arn: u.arn.clone(),
            })
            .collect();
        let has_more = end < self.snapshot.users.len();

        Ok(IdentityPage {
            identities,
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn get_login_profile(&self, user_name: &str) -> Result<LoginProfile, DirectoryError> {
        let _guard = self.enter().await;
        if let Some(error) = self.login_profile_failures.get(user_name) {
            return Err(error.clone());
        }
        self.user(user_name)?
            .login_profile
            .clone()
            .ok_or_else(|| DirectoryError::NotFound(format!("login profile for '{}'", user_name)))
    }

    async fn list_mfa_devices(&self, user_name: &str) -> Result<Vec<MfaDevice>, DirectoryError> {
        let _guard = self.enter().await;
        if let Some(error) = self.mfa_failures.get(user_name) {
            return Err(error.clone());
        }
        Ok(self.user(user_name)?.mfa_devices.clone())
    }

    async fn list_access_keys(
        &self,
        user_name: &str,
    ) -> Result<Vec<AccessKeyMetadata>, DirectoryError> {
        let _guard = self.enter().await;
        if let Some(error) = self.access_key_failures.get(user_name) {
            return Err(error.clone());
        }
        Ok(self
            .user(user_name)?
            .access_keys
            .iter()
            .map(|k| k.metadata.clone())
            .collect())
    }

    async fn get_access_key_last_used(
        &self,
        access_key_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        let _guard = self.enter().await;
        if let Some(error) = self.last_used_failures.get(access_key_id) {
            return Err(error.clone());
        }
        Ok(self.access_key(access_key_id)?.last_used_date)
    }
}
