//! Deterministic offline plan
//!
//! Used when no model is configured and whenever model drafting fails.

use crate::plan::{ExecutionPlan, Intent, PlanStep, RiskLevel, Skill, StepArgs};
use serde_json::json;

const SUMMARY_PREVIEW_CHARS: usize = 80;

/// Build the fixed two-step plan for a request.
///
/// An unknown or missing hint selects [`Skill::DEFAULT`].
pub fn stub_plan(message: &str, skill_hint: Option<&str>) -> ExecutionPlan {
    let skill = skill_hint
        .and_then(|hint| hint.parse::<Skill>().ok())
        .unwrap_or(Skill::DEFAULT);

    let preview: String = message.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    let (risk, needs_approval) = if skill.is_sensitive() {
        (RiskLevel::Medium, true)
    } else {
        (RiskLevel::Low, false)
    };

    let mut execute_args = StepArgs::new();
    execute_args.insert(
        "note".to_string(),
        json!("Offline plan. Configure GEMINI_API_KEY for model drafting."),
    );

    ExecutionPlan {
        intent: Intent {
            skill,
            summary: format!("Dry-run plan for: {}", preview),
            risk,
            needs_approval,
        },
        steps: vec![
            PlanStep {
                id: "S1".to_string(),
                title: "Validate request & policy".to_string(),
                action: "Validate inputs (targets, window, change id) and apply policy gates.".to_string(),
                tool: skill,
                args: StepArgs::new(),
                safe: true,
            },
            PlanStep {
                id: "S2".to_string(),
                title: "Execute (dry-run)".to_string(),
                action: "Call the tool adapter in dry-run mode and capture evidence.".to_string(),
                tool: skill,
                args: execute_args,
                safe: true,
            },
        ],
        assumptions: vec![
            "Dry-run only: adapters simulate their integrations.".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_selects_skill() {
        let plan = stub_plan("triage the scan", Some("vuln_triage"));
        assert_eq!(plan.intent.skill, Skill::VulnTriage);
        assert!(plan.steps.iter().all(|s| s.tool == Skill::VulnTriage));
    }

    #[test]
    fn test_invalid_hint_falls_back_to_default() {
        let plan = stub_plan("do something", Some("reboot_the_world"));
        assert_eq!(plan.intent.skill, Skill::DEFAULT);
    }

    #[test]
    fn test_missing_hint_uses_default() {
        assert_eq!(stub_plan("hello", None).intent.skill, Skill::PatchingExclusion);
    }

    #[test]
    fn test_storage_ops_needs_approval() {
        let plan = stub_plan("unmount /data", Some("storage_ops"));
        assert_eq!(plan.intent.risk, RiskLevel::Medium);
        assert!(plan.intent.needs_approval);
    }

    #[test]
    fn test_other_skills_are_low_risk() {
        for skill in Skill::ALL.iter().filter(|s| !s.is_sensitive()) {
            let plan = stub_plan("x", Some(skill.as_str()));
            assert_eq!(plan.intent.risk, RiskLevel::Low);
            assert!(!plan.intent.needs_approval);
        }
    }

    #[test]
    fn test_two_step_template_is_valid() {
        let plan = stub_plan("exclude web01 from patching", None);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].id, "S1");
        assert_eq!(plan.steps[1].id, "S2");
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_summary_truncates_on_char_boundary() {
        let message = "é".repeat(200);
        let plan = stub_plan(&message, None);
        let preview = plan.intent.summary.trim_start_matches("Dry-run plan for: ");
        assert_eq!(preview.chars().count(), 80);
    }
}
