use crate::checker::{CheckError, CheckResult, Checker};
use crate::config::ConfigError;
use crate::directory::{Identity, IdentityDirectory};
use crate::scan::{IdentityInspector, PaginatedBatchScanner};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// A console user without any registered MFA device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaFinding {
    pub identity_name: String,
    pub arn: String,
}

/// Detects users that can sign in to the console without MFA.
///
/// Users without a login profile are skipped: MFA only matters for
/// interactive sign-in.
pub struct MissingMfaChecker {
    directory: Arc<dyn IdentityDirectory>,
    scanner: PaginatedBatchScanner,
}

impl MissingMfaChecker {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            directory,
            scanner: PaginatedBatchScanner::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, ConfigError> {
        self.scanner = PaginatedBatchScanner::new(batch_size)?;
        Ok(self)
    }
}

struct MfaInspector;

#[async_trait]
impl IdentityInspector for MfaInspector {
    type Finding = MfaFinding;

    async fn inspect(
        &self,
        directory: &dyn IdentityDirectory,
        identity: &Identity,
    ) -> Result<Vec<MfaFinding>, CheckError> {
        match directory.get_login_profile(&identity.user_name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => {
                error!(
                    user = %identity.user_name,
                    error = %e,
                    "failed to get login profile"
                );
                return Err(CheckError::directory("get_login_profile", e));
            }
        }

        let devices = directory
            .list_mfa_devices(&identity.user_name)
            .await
            .map_err(|e| CheckError::directory("list_mfa_devices", e))?;

        if devices.is_empty() {
            return Ok(vec![MfaFinding {
                identity_name: identity.user_name.clone(),
                arn: identity.arn.clone(),
            }]);
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl Checker for MissingMfaChecker {
    async fn run_check(&self) -> Result<CheckResult, CheckError> {
        let findings = self
            .scanner
            .scan(Arc::clone(&self.directory), Arc::new(MfaInspector))
            .await?;

        info!(count = findings.len(), "missing MFA check finished");

        if findings.is_empty() {
            return Ok(CheckResult::passed(json!({ "count": 0, "noMfaUsers": [] })));
        }

        Ok(CheckResult::action_required(
            "Some IAM users do not have MFA enabled.",
            json!({ "count": findings.len(), "noMfaUsers": findings }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckStatus;
    use crate::directory::snapshot::{DirectorySnapshot, SnapshotUser};
    use crate::directory::{DirectoryError, LoginProfile, MfaDevice, SnapshotDirectory};

    fn user(name: &str, console: bool, devices: usize) -> SnapshotUser {
        SnapshotUser {
            user_name: name.to_string(),
            arn: format!("arn:aws:iam::123456789012:user/{}", name),
            login_profile: console.then(|| LoginProfile {
                create_date: None,
                password_reset_required: false,
            }),
            mfa_devices: (0..devices)
                .map(|i| MfaDevice {
                    serial_number: format!("arn:aws:iam::123456789012:mfa/{}-{}", name, i),
                    enable_date: None,
                })
                .collect(),
            access_keys: Vec::new(),
        }
    }

    fn directory(users: Vec<SnapshotUser>) -> SnapshotDirectory {
        SnapshotDirectory::new(DirectorySnapshot {
            page_size: 100,
            users,
        })
    }

    #[tokio::test]
    async fn test_console_user_without_mfa_is_flagged() {
        let checker = MissingMfaChecker::new(Arc::new(directory(vec![user("alice", true, 0)])));
        let result = checker.run_check().await.unwrap();

        assert_eq!(result.status(), CheckStatus::ActionRequired);
        assert_eq!(result.message(), Some("Some IAM users do not have MFA enabled."));
        assert_eq!(result.data()["count"], 1);
        assert_eq!(result.data()["noMfaUsers"][0]["identityName"], "alice");
        assert_eq!(
            result.data()["noMfaUsers"][0]["arn"],
            "arn:aws:iam::123456789012:user/alice"
        );
    }

    #[tokio::test]
    async fn test_user_without_login_profile_is_skipped() {
        let dir = directory(vec![user("svc-build", false, 0)]);
        let checker = MissingMfaChecker::new(Arc::new(dir));
        let result = checker.run_check().await.unwrap();

        assert_eq!(result.status(), CheckStatus::Passed);
        assert_eq!(result.data()["count"], 0);
        assert_eq!(result.data()["noMfaUsers"], json!([]));
    }

    #[tokio::test]
    async fn test_user_with_mfa_passes() {
        let checker = MissingMfaChecker::new(Arc::new(directory(vec![user("bob", true, 2)])));
        let result = checker.run_check().await.unwrap();
        assert_eq!(result.status(), CheckStatus::Passed);
    }

    #[tokio::test]
    async fn test_each_flagged_user_reported_once_across_pages() {
        let users: Vec<SnapshotUser> = (0..25)
            .map(|i| user(&format!("user-{:02}", i), i % 2 == 0, if i % 4 == 0 { 1 } else { 0 }))
            .collect();
        let dir = directory(users).with_page_size(7);
        let checker = MissingMfaChecker::new(Arc::new(dir)).with_batch_size(3).unwrap();
        let result = checker.run_check().await.unwrap();

        // Console users are the even ones; those divisible by 4 have MFA.
        let mut names: Vec<String> = result.data()["noMfaUsers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["identityName"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        let expected: Vec<String> = (0..25)
            .filter(|i| i % 2 == 0 && i % 4 != 0)
            .map(|i| format!("user-{:02}", i))
            .collect();
        assert_eq!(names, expected);
        assert_eq!(result.data()["count"], expected.len());
    }

    #[tokio::test]
    async fn test_unexpected_login_profile_error_fails_check() {
        let dir = directory(vec![user("alice", true, 0), user("bob", true, 0)])
            .fail_login_profile("bob", DirectoryError::Unavailable("connection reset".into()));
        let checker = MissingMfaChecker::new(Arc::new(dir));

        let error = checker.run_check().await.unwrap_err();
        assert!(matches!(
            error,
            CheckError::Directory {
                operation: "get_login_profile",
                source: DirectoryError::Unavailable(_),
            }
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let checker = MissingMfaChecker::new(Arc::new(directory(Vec::new())));
        assert!(checker.with_batch_size(0).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_on_one_instance_agree() {
        let users = (0..30).map(|i| user(&format!("user-{:02}", i), true, 0)).collect();
        let dir = directory(users).with_page_size(7);
        let checker = Arc::new(MissingMfaChecker::new(Arc::new(dir)).with_batch_size(3).unwrap());

        let (first, second) = tokio::join!(checker.run_check(), checker.run_check());
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.data()["count"], 30);
        assert_eq!(second.data()["count"], 30);

        let mut names: Vec<&str> = second.data()["noMfaUsers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["identityName"].as_str().unwrap())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 30);
    }
}
