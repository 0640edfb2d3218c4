use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    Skipped,
    Error,
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecStatus::Success => write!(f, "success"),
            ExecStatus::Skipped => write!(f, "skipped"),
            ExecStatus::Error => write!(f, "error"),
        }
    }
}

/// Outcome reported by an executor call.
///
/// Serializes as a flat JSON object: `status`, an optional `message`, and
/// whatever call-specific details the executor attached (image names,
/// process output, timestamps).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecReport {
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ExecReport {
    fn with_status(status: ExecStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            details: Map::new(),
        }
    }

    pub fn success() -> Self {
        Self::with_status(ExecStatus::Success, None)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_status(ExecStatus::Skipped, Some(message.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(ExecStatus::Error, Some(message.into()))
    }

    /// Error report carrying a failed process's exit code and output.
    pub fn process_failure(code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        Self::with_status(ExecStatus::Error, None)
            .with("returncode", code)
            .with("stdout", stdout)
            .with("stderr", stderr)
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    /// Human-readable description of why this report is not a success.
    pub fn failure_message(&self) -> String {
        if let Some(ref msg) = self.message {
            return msg.clone();
        }
        if let Some(stderr) = self.details.get("stderr").and_then(Value::as_str) {
            let trimmed = stderr.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
        if let Some(code) = self.details.get("returncode").and_then(Value::as_i64) {
            return format!("process exited with status {code}");
        }
        format!("executor reported status '{}'", self.status)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "message": format!("unserializable report: {e}"),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Available,
    NotBuilt,
    External,
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentState::Available => write!(f, "available"),
            ComponentState::NotBuilt => write!(f, "not_built"),
            ComponentState::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentStatus {
    pub status: ComponentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn image(status: ComponentState, image: impl Into<String>) -> Self {
        Self {
            status,
            image: Some(image.into()),
            message: None,
        }
    }

    pub fn external() -> Self {
        Self {
            status: ComponentState::External,
            image: None,
            message: Some("External component".to_owned()),
        }
    }
}

pub type ComponentStatusMap = BTreeMap<String, ComponentStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_flat() {
        let report = ExecReport::success()
            .with("image", "reg/api:latest")
            .with("returncode", 0);
        let json = report.to_value();
        assert_eq!(json["status"], "success");
        assert_eq!(json["image"], "reg/api:latest");
        assert_eq!(json["returncode"], 0);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn report_deserializes_details() {
        let report: ExecReport =
            serde_json::from_str(r#"{"status":"error","message":"boom","stderr":"x"}"#).unwrap();
        assert_eq!(report.status, ExecStatus::Error);
        assert_eq!(report.message.as_deref(), Some("boom"));
        assert_eq!(report.detail("stderr"), Some(&Value::from("x")));
    }

    #[test]
    fn failure_message_prefers_message_then_stderr() {
        assert_eq!(ExecReport::error("no such path").failure_message(), "no such path");
        let report = ExecReport::process_failure(Some(2), "", "  denied\n");
        assert_eq!(report.failure_message(), "denied");
        let report = ExecReport::process_failure(Some(2), "", "");
        assert_eq!(report.failure_message(), "process exited with status 2");
        let report = ExecReport::skipped("external");
        assert_eq!(report.failure_message(), "external");
    }

    #[test]
    fn only_success_is_success() {
        assert!(ExecReport::success().is_success());
        assert!(!ExecReport::skipped("x").is_success());
        assert!(!ExecReport::error("x").is_success());
    }

    #[test]
    fn component_status_json() {
        let json = serde_json::to_value(ComponentStatus::image(
            ComponentState::NotBuilt,
            "reg/api:latest",
        ))
        .unwrap();
        assert_eq!(json["status"], "not_built");
        assert_eq!(json["image"], "reg/api:latest");

        let json = serde_json::to_value(ComponentStatus::external()).unwrap();
        assert_eq!(json["status"], "external");
        assert!(json.get("image").is_none());
    }
}
