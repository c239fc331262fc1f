//! Run records, the unit of auditability

use crate::auth::UserContext;
use crate::plan::{Environment, ExecutionPlan, RiskLevel, Skill};
use crate::tools::ToolEvidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Run lifecycle
///
/// `pending_approval` / `running` are the only entry states. `dry_run`,
/// `failed`, `rejected` and `succeeded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    PendingApproval,
    Running,
    DryRun,
    Succeeded,
    Failed,
    Rejected,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::PendingApproval => "pending_approval",
            RunStatus::Running => "running",
            RunStatus::DryRun => "dry_run",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::DryRun | RunStatus::Succeeded | RunStatus::Failed | RunStatus::Rejected
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(RunStatus::PendingApproval),
            "running" => Ok(RunStatus::Running),
            "dry_run" => Ok(RunStatus::DryRun),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "rejected" => Ok(RunStatus::Rejected),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Decision submitted by an approver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Approval decision recorded on a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    #[default]
    None,
}

impl From<Decision> for ApprovalDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ApprovalDecision::Approved,
            Decision::Rejected => ApprovalDecision::Rejected,
        }
    }
}

/// One append-only evidence log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceEntry {
    /// Adapter output for a step
    Step {
        step: String,
        title: String,
        tool: Skill,
        result: ToolEvidence,
    },
    /// A step that could not be dispatched
    StepError { step: String, error: String },
    /// An approval or rejection
    Approval {
        by: String,
        decision: Decision,
        comment: Option<String>,
        at: DateTime<Utc>,
    },
    /// The third-party event that triggered the run
    Webhook { payload: Value },
    /// The uploaded file that triggered the run
    Upload {
        filename: String,
        rows: usize,
        sha256: String,
    },
}

/// A governed request and everything that happened to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub requested_by: String,
    pub role: String,
    pub environment: Environment,
    pub message: String,
    pub plan: ExecutionPlan,
    pub status: RunStatus,
    pub approval_required: bool,
    pub approval_decision: ApprovalDecision,
    pub evidence: Vec<EvidenceEntry>,
    pub error: Option<String>,
}

/// Opaque 12-character run id
pub fn new_run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

impl RunRecord {
    /// New run in its entry state: `pending_approval` if approval is required,
    /// otherwise `running`.
    pub fn new(
        requested_by: &UserContext,
        environment: Environment,
        message: impl Into<String>,
        plan: ExecutionPlan,
        approval_required: bool,
        evidence: Vec<EvidenceEntry>,
    ) -> Self {
        let status = if approval_required {
            RunStatus::PendingApproval
        } else {
            RunStatus::Running
        };

        Self {
            run_id: new_run_id(),
            created_at: Utc::now(),
            requested_by: requested_by.username.clone(),
            role: requested_by.role.to_string(),
            environment,
            message: message.into(),
            plan,
            status,
            approval_required,
            approval_decision: ApprovalDecision::None,
            evidence,
            error: None,
        }
    }

    pub fn risk(&self) -> RiskLevel {
        self.plan.intent.risk
    }

    /// Build the record that results from applying `patch`
    pub fn apply(&self, patch: &RunPatch) -> RunRecord {
        RunRecord {
            status: patch.status.unwrap_or(self.status),
            approval_decision: patch.approval_decision.unwrap_or(self.approval_decision),
            evidence: patch
                .evidence
                .clone()
                .unwrap_or_else(|| self.evidence.clone()),
            error: patch.error.clone().or_else(|| self.error.clone()),
            ..self.clone()
        }
    }
}

/// Whole-field replacements for a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub approval_decision: Option<ApprovalDecision>,
    pub evidence: Option<Vec<EvidenceEntry>>,
    pub error: Option<String>,
}

impl RunPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn approval_decision(mut self, decision: ApprovalDecision) -> Self {
        self.approval_decision = Some(decision);
        self
    }

    pub fn evidence(mut self, evidence: Vec<EvidenceEntry>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafter::stub_plan;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(approval_required: bool) -> RunRecord {
        RunRecord::new(
            &UserContext::default(),
            Environment::Dev,
            "exclude web01",
            stub_plan("exclude web01", None),
            approval_required,
            Vec::new(),
        )
    }

    #[test]
    fn test_entry_status_follows_approval_flag() {
        assert_eq!(run(true).status, RunStatus::PendingApproval);
        assert_eq!(run(false).status, RunStatus::Running);
        assert_eq!(run(false).approval_decision, ApprovalDecision::None);
    }

    #[test]
    fn test_run_id_is_twelve_hex_chars() {
        let id = new_run_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_apply_replaces_only_named_fields() {
        let original = run(true);
        let patched = original.apply(&RunPatch::new().status(RunStatus::Rejected));

        assert_eq!(patched.status, RunStatus::Rejected);
        assert_eq!(patched.plan, original.plan);
        assert_eq!(patched.run_id, original.run_id);
        assert_eq!(original.status, RunStatus::PendingApproval);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::PendingApproval.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        for status in [RunStatus::DryRun, RunStatus::Failed, RunStatus::Rejected, RunStatus::Succeeded] {
            assert!(status.is_terminal());
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_evidence_is_tagged() {
        let entry = EvidenceEntry::StepError {
            step: "S1".to_string(),
            error: "no adapter registered".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"type": "step_error", "step": "S1", "error": "no adapter registered"})
        );
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let original = run(false);
        let text = serde_json::to_string(&original).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["approval_decision"], "none");
        assert_eq!(serde_json::from_str::<RunRecord>(&text).unwrap(), original);
    }
}
