//! Orchestrator
//!
//! Composes drafting and policy into a governed plan, and drives a plan's
//! steps through the tool registry in declared order.

use crate::auth::UserContext;
use crate::drafter::{DraftContext, PlanDrafter};
use crate::plan::{Environment, ExecutionPlan};
use crate::policy::{PolicyEngine, PolicyGate};
use crate::run::EvidenceEntry;
use crate::tools::ToolRegistry;
use thiserror::Error;
use tracing::{debug, info, warn};

/// An adapter fault that aborts the remaining steps of a plan
#[derive(Error, Debug)]
#[error("Step {step} failed: {message}")]
pub struct ExecutionError {
    pub step: String,
    pub message: String,
}

/// Output of [`Orchestrator::governed_run`]
#[derive(Debug, Clone)]
pub struct GovernedPlan {
    pub plan: ExecutionPlan,
    pub approval_required: bool,
    pub gates: Vec<PolicyGate>,
    pub drafted_offline: bool,
}

pub struct Orchestrator {
    drafter: PlanDrafter,
    policy: PolicyEngine,
    registry: ToolRegistry,
    patch_cutoff_hours: u32,
}

impl Orchestrator {
    pub fn new(drafter: PlanDrafter, policy: PolicyEngine, registry: ToolRegistry) -> Self {
        Self {
            drafter,
            policy,
            registry,
            patch_cutoff_hours: 24,
        }
    }

    pub fn with_patch_cutoff_hours(mut self, hours: u32) -> Self {
        self.patch_cutoff_hours = hours;
        self
    }

    pub fn drafter(&self) -> &PlanDrafter {
        &self.drafter
    }

    /// Draft a plan and run it through policy.
    ///
    /// `approval_required` is the final plan's `needs_approval`.
    pub async fn governed_run(
        &self,
        message: &str,
        skill_hint: Option<&str>,
        environment: Environment,
        change_id: Option<&str>,
        user: &UserContext,
    ) -> GovernedPlan {
        let context = DraftContext {
            environment,
            change_id_present: change_id.is_some_and(|id| !id.trim().is_empty()),
            user: user.clone(),
            patch_cutoff_hours: self.patch_cutoff_hours,
        };

        let outcome = self
            .drafter
            .draft_with_outcome(message, skill_hint, &context)
            .await;
        let drafted_offline = outcome.is_fallback();

        let assessment = self.policy.assess(outcome.plan(), environment, change_id);
        let approval_required = assessment.plan.intent.needs_approval;

        info!(
            "📋 Governed plan for {}: skill={}, risk={}, approval_required={}",
            user.username, assessment.plan.intent.skill, assessment.plan.intent.risk, approval_required
        );

        GovernedPlan {
            plan: assessment.plan,
            approval_required,
            gates: assessment.gates,
            drafted_offline,
        }
    }

    /// Run every step in order and collect one evidence entry per step.
    ///
    /// A step whose tool has no adapter is recorded as a step error and
    /// execution continues. An adapter fault stops execution.
    pub async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<Vec<EvidenceEntry>, ExecutionError> {
        let mut evidence = Vec::with_capacity(plan.steps.len());

        for step in &plan.steps {
            let Some(adapter) = self.registry.get(step.tool) else {
                warn!("No adapter registered for {} (step {})", step.tool, step.id);
                evidence.push(EvidenceEntry::StepError {
                    step: step.id.clone(),
                    error: format!("no adapter registered for {}", step.tool),
                });
                continue;
            };

            debug!("▶️  Step {} via {}", step.id, step.tool);
            let result = adapter.invoke(&step.args).await.map_err(|e| ExecutionError {
                step: step.id.clone(),
                message: e.to_string(),
            })?;

            evidence.push(EvidenceEntry::Step {
                step: step.id.clone(),
                title: step.title.clone(),
                tool: step.tool,
                result,
            });
        }

        Ok(evidence)
    }
}
