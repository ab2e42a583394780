//! Identity directory boundary.
//!
//! Checks only ever talk to an [`IdentityDirectory`]. Adapters translate their
//! transport failures into [`DirectoryError`] once, so that the checks can tell
//! a "not found" answer apart from a transient or fatal failure without
//! inspecting error strings.

pub mod http;
pub mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpDirectory;
pub use snapshot::SnapshotDirectory;

/// A provider-managed user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_name: String,
    pub arn: String,
}

/// One page of a cursor-paginated identity listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPage {
    #[serde(default)]
    pub identities: Vec<Identity>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl IdentityPage {
    /// Cursor for the following page, `None` once the listing is exhausted.
    pub fn continuation(&self) -> Option<String> {
        if self.has_more {
            self.next_cursor.clone()
        } else {
            None
        }
    }
}

/// Console (password) sign-in profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginProfile {
    pub create_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password_reset_required: bool,
}

/// A registered MFA device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaDevice {
    pub serial_number: String,
    pub enable_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKeyStatus {
    Active,
    Inactive,
    Expired,
}

impl AccessKeyStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AccessKeyStatus::Active)
    }
}

/// Metadata of a long-lived access key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyMetadata {
    pub access_key_id: String,
    pub status: AccessKeyStatus,
    pub create_date: DateTime<Utc>,
}

/// Failure of a directory call, classified at the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("no such entity: {0}")]
    NotFound(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("malformed directory response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound(_))
    }

    /// Failures that a retry at the client boundary could clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Throttled(_) | DirectoryError::Unavailable(_))
    }
}

/// Remote identity provider operations used by the checks.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn list_identities(
        &self,
        cursor: Option<String>,
    ) -> Result<IdentityPage, DirectoryError>;

    /// Fails with [`DirectoryError::NotFound`] when the user cannot sign in
    /// interactively.
    async fn get_login_profile(&self, user_name: &str) -> Result<LoginProfile, DirectoryError>;

    async fn list_mfa_devices(&self, user_name: &str) -> Result<Vec<MfaDevice>, DirectoryError>;

    async fn list_access_keys(
        &self,
        user_name: &str,
    ) -> Result<Vec<AccessKeyMetadata>, DirectoryError>;

    /// `Ok(None)` when the key has no recorded use.
    async fn get_access_key_last_used(
        &self,
        access_key_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_requires_has_more() {
        let page = IdentityPage {
            identities: Vec::new(),
            has_more: false,
            next_cursor: Some("abc".into()),
        };
        assert_eq!(page.continuation(), None);

        let page = IdentityPage {
            has_more: true,
            ..page
        };
        assert_eq!(page.continuation(), Some("abc".to_string()));
    }

    #[test]
    fn test_error_classification() {
        assert!(DirectoryError::NotFound("x".into()).is_not_found());
        assert!(DirectoryError::Throttled("x".into()).is_transient());
        assert!(!DirectoryError::Other("x".into()).is_transient());
    }
}
