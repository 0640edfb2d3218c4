use crate::lifecycle::validate_transition;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque operation identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for thread names and terse log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for OperationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Build,
    Deploy,
    BuildAndDeploy,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::BuildAndDeploy => "build_and_deploy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Request parameters, fixed at creation. Serialized flat into the
/// operation object as `component`, or `components` + `cloud_provider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OperationParams {
    Build {
        component: String,
    },
    Deploy {
        cloud_provider: String,
    },
    BuildAndDeploy {
        components: Vec<String>,
        cloud_provider: String,
    },
}

impl OperationParams {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Build { .. } => OperationKind::Build,
            Self::Deploy { .. } => OperationKind::Deploy,
            Self::BuildAndDeploy { .. } => OperationKind::BuildAndDeploy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Building,
    Deploying,
}

/// A tracked unit of asynchronous work.
///
/// The lifecycle is only ever advanced through [`start`](Self::start),
/// [`complete`](Self::complete), [`fail`](Self::fail) and
/// [`settle`](Self::settle), which check the transition and stamp
/// `completed_at` exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub status: OperationStatus,
    #[serde(flatten)]
    pub params: OperationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_action: Option<Phase>,
    /// Per-component build reports; only for `build_and_deploy`, and only
    /// for the components that were actually attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_results: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn new(id: OperationId, params: OperationParams) -> Self {
        let kind = params.kind();
        Self {
            id,
            kind,
            status: OperationStatus::Pending,
            params,
            current_component: None,
            current_action: None,
            build_results: (kind == OperationKind::BuildAndDeploy).then(BTreeMap::new),
            deploy_result: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(OperationStatus::Running)
    }

    /// Show what the worker is currently doing.
    pub fn set_progress(&mut self, component: Option<&str>, phase: Phase) {
        self.current_component = component.map(str::to_owned);
        self.current_action = Some(phase);
    }

    pub fn record_build(&mut self, component: &str, report: Value) {
        self.build_results
            .get_or_insert_with(BTreeMap::new)
            .insert(component.to_owned(), report);
    }

    pub fn complete(&mut self, result: Value) -> Result<(), CoreError> {
        self.transition(OperationStatus::Completed)?;
        self.result = Some(result);
        self.error = None;
        self.finish();
        Ok(())
    }

    /// Terminate as failed. `result` carries the executor report when the
    /// failure was reported by the executor rather than raised as a fault.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        result: Option<Value>,
    ) -> Result<(), CoreError> {
        self.transition(OperationStatus::Failed)?;
        self.error = Some(error.into());
        if result.is_some() {
            self.result = result;
        }
        self.finish();
        Ok(())
    }

    /// Force the operation into `failed` from wherever it is. A pending
    /// operation passes through `running` first. Returns `false` if the
    /// operation was already terminal.
    pub fn settle(&mut self, error: impl Into<String>) -> Result<bool, CoreError> {
        match self.status {
            OperationStatus::Completed | OperationStatus::Failed => Ok(false),
            OperationStatus::Pending => {
                self.start()?;
                self.fail(error, None)?;
                Ok(true)
            }
            OperationStatus::Running => {
                self.fail(error, None)?;
                Ok(true)
            }
        }
    }

    fn transition(&mut self, to: OperationStatus) -> Result<(), CoreError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    fn finish(&mut self) {
        self.current_component = None;
        self.current_action = None;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build_op() -> Operation {
        Operation::new(
            OperationId::generate(),
            OperationParams::Build {
                component: "api".to_owned(),
            },
        )
    }

    #[test]
    fn new_operation_is_pending() {
        let op = build_op();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.kind, OperationKind::Build);
        assert!(op.completed_at.is_none());
        assert!(op.build_results.is_none());
    }

    #[test]
    fn complete_sets_result_and_timestamp() {
        let mut op = build_op();
        op.start().unwrap();
        op.set_progress(Some("api"), Phase::Building);
        op.complete(json!({"status": "success"})).unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert!(op.result.is_some());
        assert!(op.error.is_none());
        assert!(op.completed_at.is_some());
        assert!(op.current_component.is_none());
    }

    #[test]
    fn cannot_complete_from_pending() {
        let mut op = build_op();
        assert!(matches!(
            op.complete(json!({})),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(op.status, OperationStatus::Pending);
    }

    #[test]
    fn terminal_state_is_final() {
        let mut op = build_op();
        op.start().unwrap();
        op.fail("boom", None).unwrap();
        let stamped = op.completed_at;
        assert!(op.start().is_err());
        assert!(op.complete(json!({})).is_err());
        assert!(op.fail("again", None).is_err());
        assert_eq!(op.error.as_deref(), Some("boom"));
        assert_eq!(op.completed_at, stamped);
    }

    #[test]
    fn settle_from_pending_goes_through_running() {
        let mut op = build_op();
        assert!(op.settle("worker never started").unwrap());
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.completed_at.is_some());
        assert!(!op.settle("twice").unwrap());
        assert_eq!(op.error.as_deref(), Some("worker never started"));
    }

    #[test]
    fn json_shape_flattens_params() {
        let op = Operation::new(
            OperationId::from("op-1"),
            OperationParams::BuildAndDeploy {
                components: vec!["a".to_owned(), "b".to_owned()],
                cloud_provider: "vultr".to_owned(),
            },
        );
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["id"], "op-1");
        assert_eq!(v["kind"], "build_and_deploy");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["components"], json!(["a", "b"]));
        assert_eq!(v["cloud_provider"], "vultr");
        assert_eq!(v["build_results"], json!({}));
        assert!(v.get("completed_at").is_none());
        assert!(v.get("error").is_none());
        assert!(v["created_at"].is_string());
    }

    #[test]
    fn short_id() {
        let id = OperationId::generate();
        assert_eq!(id.short().len(), 8);
        assert_eq!(OperationId::from("abc").short(), "abc");
    }
}
