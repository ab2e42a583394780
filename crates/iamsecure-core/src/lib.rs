pub mod checker;
pub mod checks;
pub mod config;
pub mod directory;
pub mod redact;
pub mod registry;
pub mod scan;

pub use checker::{CheckError, CheckResult, CheckStatus, Checker};
pub use checks::{
    MissingMfaChecker, MultiSecurityChecker, NamedCheck, NamedReport, StaleAccessKeysChecker,
};
pub use config::{AuditConfig, ConfigError, DirectorySource};
pub use directory::{DirectoryError, IdentityDirectory};
pub use registry::{create_instance, supported_checks, unsupported_checks, CheckKind};
