//! Run lifecycle
//!
//! Intake of governed requests and the approval state machine:
//!
//! ```text
//! created ──► pending_approval ──approved──► running ──► dry_run | failed
//!        │                     └─rejected──► rejected
//!        └──► running ──► dry_run | failed
//! ```
//!
//! Every transition goes through the store's compare-and-set so concurrent
//! callers cannot both move the same run.

use crate::auth::UserContext;
use crate::error::AppError;
use crate::orchestrator::Orchestrator;
use crate::plan::{Environment, RiskLevel, StepArgs};
use crate::run::store::RunStore;
use crate::run::{ApprovalDecision, Decision, EvidenceEntry, RunPatch, RunRecord, RunStatus};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A governed request from any trigger (chat, webhook, upload)
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub message: String,
    pub skill_hint: Option<String>,
    pub environment: Environment,
    pub change_id: Option<String>,
    pub requested_by: UserContext,
    /// Evidence recorded before any step runs (trigger payloads)
    pub evidence: Vec<EvidenceEntry>,
    /// Extra arguments merged into the first step of the governed plan
    pub first_step_args: StepArgs,
}

impl RunRequest {
    pub fn new(message: impl Into<String>, requested_by: UserContext) -> Self {
        Self {
            message: message.into(),
            skill_hint: None,
            environment: Environment::default(),
            change_id: None,
            requested_by,
            evidence: Vec::new(),
            first_step_args: StepArgs::new(),
        }
    }

    pub fn skill_hint(mut self, hint: Option<String>) -> Self {
        self.skill_hint = hint;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn change_id(mut self, change_id: Option<String>) -> Self {
        self.change_id = change_id;
        self
    }

    pub fn evidence(mut self, entry: EvidenceEntry) -> Self {
        self.evidence.push(entry);
        self
    }

    pub fn first_step_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.first_step_args.insert(key.into(), value.into());
        self
    }
}

pub struct RunService {
    store: Arc<dyn RunStore>,
    orchestrator: Arc<Orchestrator>,
}

impl RunService {
    pub fn new(store: Arc<dyn RunStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { store, orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Govern, record and, when no approval is needed, execute a request.
    ///
    /// Creation is committed before execution; an execution failure leaves
    /// the run in `failed` rather than undoing it.
    pub async fn submit(&self, request: RunRequest) -> Result<RunRecord, AppError> {
        let governed = self
            .orchestrator
            .governed_run(
                &request.message,
                request.skill_hint.as_deref(),
                request.environment,
                request.change_id.as_deref(),
                &request.requested_by,
            )
            .await;

        if governed.drafted_offline {
            debug!("Plan for {} drafted offline", request.requested_by.username);
        }

        let plan = request
            .first_step_args
            .iter()
            .fold(governed.plan, |plan, (key, value)| {
                plan.with_step_arg(0, key.clone(), value.clone())
            });

        let run = RunRecord::new(
            &request.requested_by,
            request.environment,
            request.message,
            plan,
            governed.approval_required,
            request.evidence,
        );
        let run = self.store.create(run).await?;

        info!(
            "🆕 Run {} created by {} in {}: {} ({} policy gates)",
            run.run_id,
            run.requested_by,
            run.environment,
            run.status,
            governed.gates.len()
        );

        if run.status == RunStatus::Running {
            self.execute(run).await
        } else {
            Ok(run)
        }
    }

    /// Record an approval decision on a pending run.
    ///
    /// Approving a high-risk run needs an admin; rejecting does not.
    pub async fn decide(
        &self,
        run_id: &str,
        decision: Decision,
        comment: Option<String>,
        user: &UserContext,
    ) -> Result<RunRecord, AppError> {
        let run = self.get(run_id).await?;

        if run.status != RunStatus::PendingApproval {
            return Err(AppError::InvalidState(format!(
                "Run {} is not pending approval (status: {})",
                run_id, run.status
            )));
        }

        if decision == Decision::Approved
            && run.risk() == RiskLevel::High
            && !user.role.can_approve_high_risk()
        {
            warn!("⛔ {} ({}) tried to approve high-risk run {}", user.username, user.role, run_id);
            return Err(AppError::Forbidden(
                "Admin approval required for high-risk runs".to_string(),
            ));
        }

        let mut evidence = run.evidence.clone();
        evidence.push(EvidenceEntry::Approval {
            by: user.username.clone(),
            decision,
            comment,
            at: Utc::now(),
        });

        let next = match decision {
            Decision::Approved => RunStatus::Running,
            Decision::Rejected => RunStatus::Rejected,
        };
        let patch = RunPatch::new()
            .status(next)
            .approval_decision(ApprovalDecision::from(decision))
            .evidence(evidence);

        let run = self
            .store
            .update_if_status(run_id, RunStatus::PendingApproval, &patch)
            .await?;

        info!("✅ Run {} {} by {}", run_id, next, user.username);

        match decision {
            Decision::Approved => self.execute(run).await,
            Decision::Rejected => Ok(run),
        }
    }

    /// Execute a running run's plan and record the outcome
    async fn execute(&self, run: RunRecord) -> Result<RunRecord, AppError> {
        let patch = match self.orchestrator.execute_plan(&run.plan).await {
            Ok(entries) => {
                let mut evidence = run.evidence.clone();
                evidence.extend(entries);
                RunPatch::new().status(RunStatus::DryRun).evidence(evidence)
            }
            Err(e) => {
                warn!("❌ Run {} failed: {}", run.run_id, e);
                RunPatch::new().status(RunStatus::Failed).error(e.to_string())
            }
        };

        let run = self
            .store
            .update_if_status(&run.run_id, RunStatus::Running, &patch)
            .await?;
        info!("🏁 Run {} finished: {}", run.run_id, run.status);
        Ok(run)
    }

    pub async fn get(&self, run_id: &str) -> Result<RunRecord, AppError> {
        self.store
            .get(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))
    }

    pub async fn list(&self) -> Result<Vec<RunRecord>, AppError> {
        Ok(self.store.list().await?)
    }
}
