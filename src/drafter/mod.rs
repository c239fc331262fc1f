//! Plan Drafter
//!
//! Turns a free-text request into a candidate [`ExecutionPlan`]. When a model
//! is configured it is asked for strict JSON; every failure along that path
//! (network, timeout, malformed JSON, schema violation) degrades to the
//! deterministic stub plan. Callers always receive a usable plan, while the
//! [`DraftOutcome`] keeps the fallback observable.

mod gemini;
mod prompt;
mod stub;

pub use gemini::GeminiModel;
pub use prompt::{output_schema, strip_code_fences, DraftRequest};
pub use stub::stub_plan;

use crate::auth::UserContext;
use crate::plan::{Environment, ExecutionPlan, PlanError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fallback reason recorded when no model is configured
pub const NO_MODEL_REASON: &str = "no model configured";

/// Errors on the model drafting path. Never leave this module.
#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Drafting timed out")]
    Timeout,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema violation: {0}")]
    Schema(#[from] PlanError),
}

/// External generative capability that produces plan JSON
#[async_trait]
pub trait PlanModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &DraftRequest) -> Result<String, DraftError>;
}

/// Metadata passed to the model alongside the request
#[derive(Debug, Clone, Serialize)]
pub struct DraftContext {
    pub environment: Environment,
    pub change_id_present: bool,
    pub user: UserContext,
    pub patch_cutoff_hours: u32,
}

/// Which path produced the plan
#[derive(Debug, Clone)]
pub enum DraftOutcome {
    Drafted(ExecutionPlan),
    Fallback { plan: ExecutionPlan, reason: String },
}

impl DraftOutcome {
    pub fn plan(&self) -> &ExecutionPlan {
        match self {
            DraftOutcome::Drafted(plan) => plan,
            DraftOutcome::Fallback { plan, .. } => plan,
        }
    }

    pub fn into_plan(self) -> ExecutionPlan {
        match self {
            DraftOutcome::Drafted(plan) => plan,
            DraftOutcome::Fallback { plan, .. } => plan,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DraftOutcome::Fallback { .. })
    }
}

/// Drafting counters reported by the health endpoint
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStats {
    pub drafted: u64,
    pub fallbacks: u64,
}

pub struct PlanDrafter {
    model: Option<Arc<dyn PlanModel>>,
    timeout: Duration,
    drafted: AtomicU64,
    fallbacks: AtomicU64,
}

impl PlanDrafter {
    /// Drafter that always uses the deterministic stub
    pub fn offline() -> Self {
        Self {
            model: None,
            timeout: Duration::ZERO,
            drafted: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn with_model(model: Arc<dyn PlanModel>, timeout: Duration) -> Self {
        Self {
            model: Some(model),
            timeout,
            ..Self::offline()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.name())
    }

    pub fn stats(&self) -> DraftStats {
        DraftStats {
            drafted: self.drafted.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Draft a plan. Never fails.
    pub async fn draft(
        &self,
        message: &str,
        skill_hint: Option<&str>,
        context: &DraftContext,
    ) -> ExecutionPlan {
        self.draft_with_outcome(message, skill_hint, context)
            .await
            .into_plan()
    }

    pub async fn draft_with_outcome(
        &self,
        message: &str,
        skill_hint: Option<&str>,
        context: &DraftContext,
    ) -> DraftOutcome {
        let Some(model) = &self.model else {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
            debug!("No plan model configured, using offline plan");
            return DraftOutcome::Fallback {
                plan: stub_plan(message, skill_hint),
                reason: NO_MODEL_REASON.to_string(),
            };
        };

        match self.try_draft(model.as_ref(), message, skill_hint, context).await {
            Ok(plan) => {
                self.drafted.fetch_add(1, Ordering::Relaxed);
                info!(
                    "📝 Drafted plan via {}: skill={}, steps={}",
                    model.name(),
                    plan.intent.skill,
                    plan.steps.len()
                );
                DraftOutcome::Drafted(plan)
            }
            Err(e) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️  Plan drafting via {} failed, using offline plan: {}", model.name(), e);
                DraftOutcome::Fallback {
                    plan: stub_plan(message, skill_hint),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_draft(
        &self,
        model: &dyn PlanModel,
        message: &str,
        skill_hint: Option<&str>,
        context: &DraftContext,
    ) -> Result<ExecutionPlan, DraftError> {
        let request = DraftRequest::new(message, skill_hint, context);

        let text = tokio::time::timeout(self.timeout, model.complete(&request))
            .await
            .map_err(|_| DraftError::Timeout)??;

        let plan = ExecutionPlan::from_json(&strip_code_fences(&text))?;
        Ok(plan)
    }
}
