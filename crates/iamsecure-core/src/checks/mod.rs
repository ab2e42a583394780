pub mod mfa;
pub mod multi;
pub mod stale_keys;

pub use mfa::{MfaFinding, MissingMfaChecker};
pub use multi::{aggregate, MultiSecurityChecker, NamedCheck, NamedReport};
pub use stale_keys::{StaleAccessKeysChecker, StaleKeyFinding, StaleKeyOptions};
