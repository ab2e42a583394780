use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Overall verdict of a security check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckStatus {
    Passed,
    ActionRequired,
}

impl CheckStatus {
    pub fn symbol(&self) -> &str {
        match self {
            CheckStatus::Passed => "PASSED",
            CheckStatus::ActionRequired => "ACTION REQUIRED",
        }
    }

    pub fn requires_action(&self) -> bool {
        matches!(self, CheckStatus::ActionRequired)
    }
}

/// The report every checker produces for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    #[serde(rename = "resultStatus")]
    status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(serialize_with = "serialize_rfc3339")]
    detected_time: DateTime<Utc>,
    data: Value,
}

impl CheckResult {
    /// A passing result stamped with the current time.
    pub fn passed(data: Value) -> Self {
        Self {
            status: CheckStatus::Passed,
            message: None,
            detected_time: Utc::now(),
            data,
        }
    }

    /// A failing result stamped with the current time.
    pub fn action_required(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: CheckStatus::ActionRequired,
            message: Some(message.into()),
            detected_time: Utc::now(),
            data,
        }
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn detected_time(&self) -> DateTime<Utc> {
        self.detected_time
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}

fn serialize_rfc3339<S: Serializer>(
    time: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Errors that abort a single check run.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("directory call '{operation}' failed: {source}")]
    Directory {
        operation: &'static str,
        #[source]
        source: DirectoryError,
    },

    #[error("inspection task did not complete: {0}")]
    Task(String),
}

impl CheckError {
    pub fn directory(operation: &'static str, source: DirectoryError) -> Self {
        CheckError::Directory { operation, source }
    }
}

/// A unit implementing one security inspection.
///
/// Implementations keep no scan progress between calls, so one instance may be
/// run concurrently from several tasks.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn run_check(&self) -> Result<CheckResult, CheckError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_passed_has_no_message() {
        let result = CheckResult::passed(json!({ "count": 0 }));
        assert_eq!(result.status(), CheckStatus::Passed);
        assert!(result.message().is_none());
        assert_eq!(result.data()["count"], 0);
    }

    #[test]
    fn test_serialized_shape() {
        let result = CheckResult::action_required("Something is off.", json!({ "count": 2 }));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["resultStatus"], "ActionRequired");
        assert_eq!(value["message"], "Something is off.");
        assert_eq!(value["data"]["count"], 2);
        let time = value["detectedTime"].as_str().unwrap();
        assert!(time.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(time).is_ok());
    }

    #[test]
    fn test_passed_omits_message_field() {
        let value = serde_json::to_value(CheckResult::passed(json!({}))).unwrap();
        assert!(value.get("message").is_none());
        assert_eq!(value["resultStatus"], "Passed");
    }
}
