//! Static registry of the checks that can be requested by name.
//!
//! The list is deliberately hardcoded. Loading checks dynamically (for example
//! from manifests carrying a name, an implementation and its settings) can
//! replace this table later without touching the callers.

use crate::checker::Checker;
use crate::checks::{
    MissingMfaChecker, MultiSecurityChecker, NamedCheck, StaleAccessKeysChecker, StaleKeyOptions,
};
use crate::config::{AuditConfig, ConfigError};
use crate::directory::IdentityDirectory;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Mfa,
    StaleAccessKeys,
}

type Constructor =
    fn(Arc<dyn IdentityDirectory>, &AuditConfig) -> Result<Arc<dyn Checker>, ConfigError>;

const ALL_CHECKS: [CheckKind; 2] = [CheckKind::Mfa, CheckKind::StaleAccessKeys];

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Mfa => "MFA",
            CheckKind::StaleAccessKeys => "StaleAccessKeys",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CheckKind::Mfa => "Console users without a registered MFA device",
            CheckKind::StaleAccessKeys => "Active access keys unused beyond the configured limit",
        }
    }

    pub fn all() -> impl Iterator<Item = CheckKind> {
        ALL_CHECKS.into_iter()
    }

    fn constructor(&self) -> Constructor {
        match self {
            CheckKind::Mfa => build_mfa,
            CheckKind::StaleAccessKeys => build_stale_access_keys,
        }
    }

    /// Build the checker for this kind.
    pub fn build(
        &self,
        directory: Arc<dyn IdentityDirectory>,
        config: &AuditConfig,
    ) -> Result<Arc<dyn Checker>, ConfigError> {
        (self.constructor())(directory, config)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckKind::all()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedChecks(vec![s.to_string()]))
    }
}

fn build_mfa(
    directory: Arc<dyn IdentityDirectory>,
    config: &AuditConfig,
) -> Result<Arc<dyn Checker>, ConfigError> {
    let checker = MissingMfaChecker::new(directory).with_batch_size(config.user_batch_size)?;
    Ok(Arc::new(checker))
}

fn build_stale_access_keys(
    directory: Arc<dyn IdentityDirectory>,
    config: &AuditConfig,
) -> Result<Arc<dyn Checker>, ConfigError> {
    let options = StaleKeyOptions {
        unused_days_limit: config.unused_days_limit,
    };
    let checker = StaleAccessKeysChecker::new(directory, options)?
        .with_batch_size(config.user_batch_size)?;
    Ok(Arc::new(checker))
}

/// Names of every supported check, in registry order.
pub fn supported_checks() -> Vec<&'static str> {
    CheckKind::all().map(|kind| kind.as_str()).collect()
}

/// Requested names that are not in the registry, in request order.
pub fn unsupported_checks<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| name.parse::<CheckKind>().is_err())
        .map(str::to_string)
        .collect()
}

/// Build one aggregator running the requested checks against `directory`.
pub fn create_instance<S: AsRef<str>>(
    names: &[S],
    directory: Arc<dyn IdentityDirectory>,
    config: &AuditConfig,
) -> Result<MultiSecurityChecker, ConfigError> {
    if names.is_empty() {
        return Err(ConfigError::NoChecks);
    }
    config.validate()?;

    let unsupported = unsupported_checks(names);
    if !unsupported.is_empty() {
        return Err(ConfigError::UnsupportedChecks(unsupported));
    }

    let mut checks = Vec::with_capacity(names.len());
    for name in names {
        let kind: CheckKind = name.as_ref().parse()?;
        let checker = kind.build(Arc::clone(&directory), config)?;
        checks.push(NamedCheck::new(kind.as_str(), checker));
    }

    MultiSecurityChecker::new(checks, config.check_concurrency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::snapshot::DirectorySnapshot;
    use crate::directory::SnapshotDirectory;

    fn empty_directory() -> Arc<dyn IdentityDirectory> {
        Arc::new(SnapshotDirectory::new(DirectorySnapshot::default()))
    }

    #[test]
    fn test_supported_checks() {
        assert_eq!(supported_checks(), vec!["MFA", "StaleAccessKeys"]);
    }

    #[test]
    fn test_parse_round_trip() {
        for kind in CheckKind::all() {
            assert_eq!(kind.as_str().parse::<CheckKind>().unwrap(), kind);
        }
        assert!("mfa".parse::<CheckKind>().is_err());
    }

    #[test]
    fn test_unsupported_names_listed_in_order() {
        let error = create_instance(
            &["Root", "MFA", "PasswordPolicy"],
            empty_directory(),
            &AuditConfig::default(),
        )
        .err()
        .unwrap();
        assert_eq!(
            error,
            ConfigError::UnsupportedChecks(vec!["Root".into(), "PasswordPolicy".into()])
        );
    }

    #[test]
    fn test_empty_request_rejected() {
        let names: [&str; 0] = [];
        let error = create_instance(&names, empty_directory(), &AuditConfig::default())
            .err()
            .unwrap();
        assert_eq!(error, ConfigError::NoChecks);
    }

    #[test]
    fn test_create_instance_uses_config() {
        let config = AuditConfig {
            check_concurrency: 1,
            ..AuditConfig::default()
        };
        let multi =
            create_instance(&["StaleAccessKeys", "MFA"], empty_directory(), &config).unwrap();
        assert_eq!(multi.check_names(), vec!["StaleAccessKeys", "MFA"]);
        assert_eq!(multi.concurrency(), 1);
    }

    #[test]
    fn test_invalid_config_rejected_before_building() {
        let config = AuditConfig {
            user_batch_size: 0,
            ..AuditConfig::default()
        };
        let error = create_instance(&["MFA"], empty_directory(), &config).err().unwrap();
        assert_eq!(error, ConfigError::InvalidBatchSize(0));
    }

    #[tokio::test]
    async fn test_instance_runs_against_empty_directory() {
        let multi = create_instance(
            &["MFA", "StaleAccessKeys"],
            empty_directory(),
            &AuditConfig::default(),
        )
        .unwrap();
        let result = multi.run_check().await.unwrap();
        assert_eq!(result.status(), crate::checker::CheckStatus::Passed);
    }
}
