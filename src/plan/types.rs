//! Plan types shared by the drafter, policy engine, orchestrator and run store

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Free-form adapter arguments attached to a plan step
pub type StepArgs = Map<String, Value>;

/// Automation capability. Every skill has exactly one tool adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    PatchingExclusion,
    StorageOps,
    ManageengineDowntime,
    VulnTriage,
    SolarwindsEvent,
}

impl Skill {
    pub const ALL: [Skill; 5] = [
        Skill::PatchingExclusion,
        Skill::StorageOps,
        Skill::ManageengineDowntime,
        Skill::VulnTriage,
        Skill::SolarwindsEvent,
    ];

    /// Skill used when no usable hint is available
    pub const DEFAULT: Skill = Skill::PatchingExclusion;

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::PatchingExclusion => "patching_exclusion",
            Skill::StorageOps => "storage_ops",
            Skill::ManageengineDowntime => "manageengine_downtime",
            Skill::VulnTriage => "vuln_triage",
            Skill::SolarwindsEvent => "solarwinds_event",
        }
    }

    /// Storage operations are sensitive: drafted as medium risk with approval,
    /// and always gated in production.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Skill::StorageOps)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skill {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skill::ALL
            .iter()
            .copied()
            .find(|skill| skill.as_str() == s.trim())
            .ok_or_else(|| PlanError::UnknownSkill(s.to_string()))
    }
}

/// Risk classification, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target environment of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the plan is trying to achieve and how dangerous it is.
///
/// Produced by the drafter; only the policy engine replaces `risk` and
/// `needs_approval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub skill: Skill,
    pub summary: String,
    pub risk: RiskLevel,
    pub needs_approval: bool,
}

impl Intent {
    /// Same intent forced to high risk with mandatory approval
    pub fn escalated(&self) -> Intent {
        Intent {
            risk: RiskLevel::High,
            needs_approval: true,
            ..self.clone()
        }
    }
}

/// A single step of a plan, bound to a tool adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub action: String,
    pub tool: Skill,
    pub args: StepArgs,
    pub safe: bool,
}

/// Linear script of steps executed in declared order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionPlan {
    pub intent: Intent,
    pub steps: Vec<PlanStep>,
    pub assumptions: Vec<String>,
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Unknown skill: {0}")]
    UnknownSkill(String),

    #[error("Plan does not match schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("Plan step has an empty id")]
    EmptyStepId,

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),
}

impl ExecutionPlan {
    /// Parse and validate a plan from JSON text
    pub fn from_json(text: &str) -> Result<Self, PlanError> {
        let plan: ExecutionPlan = serde_json::from_str(text)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check invariants serde cannot express: step ids are present and unique
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(PlanError::EmptyStepId);
            }
            if !seen.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(())
    }

    /// Build a new plan with the intent replaced
    pub fn with_intent(&self, intent: Intent) -> ExecutionPlan {
        ExecutionPlan {
            intent,
            steps: self.steps.clone(),
            assumptions: self.assumptions.clone(),
        }
    }

    /// Build a new plan with `key` set in the args of the step at `index`.
    ///
    /// Out-of-range indexes leave the plan unchanged.
    pub fn with_step_arg(&self, index: usize, key: impl Into<String>, value: Value) -> ExecutionPlan {
        let key = key.into();
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                if i != index {
                    return step.clone();
                }
                let mut args = step.args.clone();
                args.insert(key.clone(), value.clone());
                PlanStep { args, ..step.clone() }
            })
            .collect();

        ExecutionPlan {
            intent: self.intent.clone(),
            steps,
            assumptions: self.assumptions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn plan_json() -> Value {
        json!({
            "intent": {
                "skill": "vuln_triage",
                "summary": "Triage findings",
                "risk": "low",
                "needs_approval": false
            },
            "steps": [
                {"id": "S1", "title": "Load", "action": "Load findings", "tool": "vuln_triage", "args": {}, "safe": true},
                {"id": "S2", "title": "Segment", "action": "Segment by team", "tool": "vuln_triage", "args": {"teams": ["linux"]}, "safe": true}
            ],
            "assumptions": ["findings are current"]
        })
    }

    #[test]
    fn test_parse_valid_plan() {
        let plan = ExecutionPlan::from_json(&plan_json().to_string()).unwrap();
        assert_eq!(plan.intent.skill, Skill::VulnTriage);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].args["teams"], json!(["linux"]));
    }

    #[test]
    fn test_rejects_extra_top_level_key() {
        let mut value = plan_json();
        value["notes"] = json!("not allowed");
        let result = ExecutionPlan::from_json(&value.to_string());
        assert!(matches!(result, Err(PlanError::Schema(_))));
    }

    #[test]
    fn test_rejects_unknown_tool() {
        let mut value = plan_json();
        value["steps"][0]["tool"] = json!("ghost");
        assert!(ExecutionPlan::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_rejects_missing_required_step_field() {
        let mut value = plan_json();
        value["steps"][0].as_object_mut().unwrap().remove("safe");
        assert!(ExecutionPlan::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn test_rejects_duplicate_step_ids() {
        let mut value = plan_json();
        value["steps"][1]["id"] = json!("S1");
        let result = ExecutionPlan::from_json(&value.to_string());
        assert!(matches!(result, Err(PlanError::DuplicateStepId(id)) if id == "S1"));
    }

    #[test]
    fn test_with_step_arg_does_not_touch_original() {
        let plan = ExecutionPlan::from_json(&plan_json().to_string()).unwrap();
        let updated = plan.with_step_arg(0, "input_rows", json!(42));

        assert_eq!(updated.steps[0].args["input_rows"], json!(42));
        assert!(!plan.steps[0].args.contains_key("input_rows"));
        assert_eq!(updated.steps[1], plan.steps[1]);
    }

    #[test]
    fn test_with_step_arg_out_of_range_is_noop() {
        let plan = ExecutionPlan::from_json(&plan_json().to_string()).unwrap();
        assert_eq!(plan.with_step_arg(9, "input_rows", json!(1)), plan);
    }

    #[test]
    fn test_skill_from_str() {
        assert_eq!("storage_ops".parse::<Skill>().unwrap(), Skill::StorageOps);
        assert!("ghost".parse::<Skill>().is_err());
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }
}
