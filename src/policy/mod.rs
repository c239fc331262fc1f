//! Policy Engine
//!
//! Governance gates applied to every drafted plan before it can run. The
//! engine is pure: the same plan, environment and change ticket always give
//! the same result, and gates only ever escalate a plan to high risk with
//! mandatory approval. They never relax it.

use crate::config::GovernanceConfig;
use crate::plan::{Environment, ExecutionPlan, Skill};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Step argument keys that hold bulk target lists
pub const BULK_TARGET_KEYS: [&str; 3] = ["targets", "servers", "hosts"];

/// Two to five uppercase letters followed by at least four digits (`CHG123456`)
static CHANGE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2,5}[0-9]{4,}$").expect("change id pattern is valid"));

/// Whether a change ticket id is present and well-formed
pub fn is_valid_change_id(change_id: Option<&str>) -> bool {
    change_id
        .map(str::trim)
        .is_some_and(|id| CHANGE_ID_PATTERN.is_match(id))
}

/// A gate that fired for a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum PolicyGate {
    /// Production run without a valid change ticket
    ChangeTicket,
    /// Sensitive skill requested in production
    SensitiveSkillInProd { skill: Skill },
    /// A step targets at least the bulk threshold of hosts
    BulkOperation { step: String, key: String, count: usize },
}

/// Plan after policy plus the gates that escalated it
#[derive(Debug, Clone)]
pub struct PolicyAssessment {
    pub plan: ExecutionPlan,
    pub gates: Vec<PolicyGate>,
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    require_change_id_for_prod: bool,
    bulk_threshold: usize,
}

impl PolicyEngine {
    pub fn new(require_change_id_for_prod: bool, bulk_threshold: usize) -> Self {
        Self {
            require_change_id_for_prod,
            bulk_threshold,
        }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(config.require_change_id_for_prod, config.bulk_threshold)
    }

    /// Apply all gates and return the resulting plan
    pub fn evaluate(
        &self,
        plan: &ExecutionPlan,
        environment: Environment,
        change_id: Option<&str>,
    ) -> ExecutionPlan {
        self.assess(plan, environment, change_id).plan
    }

    /// Apply all gates, keeping track of which ones fired
    pub fn assess(
        &self,
        plan: &ExecutionPlan,
        environment: Environment,
        change_id: Option<&str>,
    ) -> PolicyAssessment {
        let mut gates = Vec::new();

        if environment.is_production()
            && self.require_change_id_for_prod
            && !is_valid_change_id(change_id)
        {
            gates.push(PolicyGate::ChangeTicket);
        }

        if plan.intent.skill.is_sensitive() && environment.is_production() {
            gates.push(PolicyGate::SensitiveSkillInProd {
                skill: plan.intent.skill,
            });
        }

        gates.extend(self.bulk_gates(plan));

        if gates.is_empty() {
            return PolicyAssessment {
                plan: plan.clone(),
                gates,
            };
        }

        info!(
            "🚦 Policy escalated {} plan in {}: {:?}",
            plan.intent.skill, environment, gates
        );

        PolicyAssessment {
            plan: plan.with_intent(plan.intent.escalated()),
            gates,
        }
    }

    fn bulk_gates(&self, plan: &ExecutionPlan) -> Vec<PolicyGate> {
        let mut gates = Vec::new();
        for step in &plan.steps {
            for key in BULK_TARGET_KEYS {
                let count = step
                    .args
                    .get(key)
                    .and_then(|v| v.as_array())
                    .map(Vec::len);

                if let Some(count) = count {
                    if count >= self.bulk_threshold {
                        gates.push(PolicyGate::BulkOperation {
                            step: step.id.clone(),
                            key: key.to_string(),
                            count,
                        });
                    }
                }
            }
        }
        gates
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(true, 30)
    }
}
