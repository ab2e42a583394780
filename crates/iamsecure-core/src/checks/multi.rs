use crate::checker::{CheckError, CheckResult, CheckStatus, Checker};
use crate::config::ConfigError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

pub const DEFAULT_CONCURRENT_CHECKS: usize = 2;

const CHECK_FAILED_MESSAGE: &str = "Could not complete security check.";

/// A checker labelled with the name it is reported under.
#[derive(Clone)]
pub struct NamedCheck {
    pub name: String,
    pub checker: Arc<dyn Checker>,
}

impl NamedCheck {
    pub fn new(name: impl Into<String>, checker: Arc<dyn Checker>) -> Self {
        Self {
            name: name.into(),
            checker,
        }
    }
}

/// One entry of the aggregated report.
#[derive(Debug, Clone, Serialize)]
pub struct NamedReport {
    pub name: String,
    pub report: CheckResult,
}

/// Runs several named checks and merges their results into one report.
///
/// Checks run in batches of `concurrency`; a failing check is reported as
/// requiring action without affecting the others. The aggregator is a
/// [`Checker`] itself, so aggregators can be nested.
pub struct MultiSecurityChecker {
    checks: Vec<NamedCheck>,
    concurrency: usize,
}

impl MultiSecurityChecker {
    pub fn new(checks: Vec<NamedCheck>, concurrency: usize) -> Result<Self, ConfigError> {
        if checks.is_empty() {
            return Err(ConfigError::NoChecks);
        }
        if checks.iter().any(|c| c.name.trim().is_empty()) {
            return Err(ConfigError::BlankCheckName);
        }
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(concurrency));
        }

        Ok(Self {
            checks,
            concurrency,
        })
    }

    pub fn with_default_concurrency(checks: Vec<NamedCheck>) -> Result<Self, ConfigError> {
        Self::new(checks, DEFAULT_CONCURRENT_CHECKS)
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every check and return the reports in append order.
    pub async fn run_all(&self) -> Vec<NamedReport> {
        let mut reports = Vec::with_capacity(self.checks.len());

        for batch in self.checks.chunks(self.concurrency) {
            let mut tasks = JoinSet::new();
            let mut names = HashMap::new();

            for named in batch {
                let checker = Arc::clone(&named.checker);
                let handle = tasks.spawn(async move { checker.run_check().await });
                names.insert(handle.id(), named.name.clone());
            }

            while let Some(joined) = tasks.join_next_with_id().await {
                let (id, outcome) = match joined {
                    Ok((id, outcome)) => (id, outcome),
                    Err(e) => (e.id(), Err(CheckError::Task(e.to_string()))),
                };
                let name = names.remove(&id).unwrap_or_default();

                let report = match outcome {
                    Ok(report) => report,
                    Err(e) => {
                        error!(check = %name, error = %e, "error running security check");
                        CheckResult::action_required(CHECK_FAILED_MESSAGE, json!({}))
                    }
                };
                reports.push(NamedReport { name, report });
            }
        }

        reports
    }
}

/// Roll several named reports up into one result.
pub fn aggregate(reports: Vec<NamedReport>) -> CheckResult {
    let action_required: Vec<&str> = reports
        .iter()
        .filter(|r| r.report.status() == CheckStatus::ActionRequired)
        .map(|r| r.name.as_str())
        .collect();

    if action_required.is_empty() {
        return CheckResult::passed(json!(reports));
    }

    let message = format!(
        "The following security checks require action: {}",
        action_required.join(", ")
    );
    CheckResult::action_required(message, json!(reports))
}

#[async_trait]
impl Checker for MultiSecurityChecker {
    async fn run_check(&self) -> Result<CheckResult, CheckError> {
        let reports = self.run_all().await;
        let result = aggregate(reports);
        info!(
            checks = self.checks.len(),
            status = result.status().symbol(),
            "security checks finished"
        );
        Ok(result)
    }
}
