//! Drafting request construction and response clean-up

use crate::drafter::DraftContext;
use crate::plan::Skill;
use serde::Serialize;
use serde_json::{json, Value};

pub const SYSTEM_INSTRUCTIONS: &str = "You are OpsPilot, an infrastructure automation planner.\n\
Return STRICT JSON only, matching the provided schema.\n\
Never include markdown fences or commentary.\n\
Only choose skill from the allowed list.";

const TASK: &str = "Create an execution plan for infrastructure automation.";

const RULES: [&str; 4] = [
    "Return STRICT JSON only. No extra keys.",
    "Prefer safe, reversible steps. Mark unsafe steps safe=false.",
    "If request is risky or ambiguous, set needs_approval=true.",
    "Keep args minimal and practical for adapters.",
];

/// Structured request handed to the model
#[derive(Debug, Clone, Serialize)]
pub struct DraftRequest {
    pub task: &'static str,
    pub user_message: String,
    pub skill_hint: Option<String>,
    pub context: DraftContext,
    pub output_schema: Value,
    pub rules: Vec<&'static str>,
}

impl DraftRequest {
    pub fn new(message: &str, skill_hint: Option<&str>, context: &DraftContext) -> Self {
        Self {
            task: TASK,
            user_message: message.to_string(),
            skill_hint: skill_hint.map(str::to_string),
            context: context.clone(),
            output_schema: output_schema(),
            rules: RULES.to_vec(),
        }
    }
}

/// JSON schema the model output must conform to
pub fn output_schema() -> Value {
    let skills: Vec<&str> = Skill::ALL.iter().map(Skill::as_str).collect();

    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "intent": {
                "type": "object",
                "properties": {
                    "skill": {"type": "string", "enum": skills},
                    "summary": {"type": "string"},
                    "risk": {"type": "string", "enum": ["low", "medium", "high"]},
                    "needs_approval": {"type": "boolean"}
                },
                "required": ["skill", "summary", "risk", "needs_approval"]
            },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "title": {"type": "string"},
                        "action": {"type": "string"},
                        "tool": {"type": "string", "enum": skills},
                        "args": {"type": "object"},
                        "safe": {"type": "boolean"}
                    },
                    "required": ["id", "title", "action", "tool", "args", "safe"]
                }
            },
            "assumptions": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["intent", "steps", "assumptions"]
    })
}

/// Remove markdown code fences a model may wrap around its JSON
pub fn strip_code_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserContext;
    use crate::plan::Environment;

    #[test]
    fn test_strip_fenced_json() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_plain_json_untouched() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_schema_lists_every_skill() {
        let schema = output_schema();
        let skills = schema["properties"]["intent"]["properties"]["skill"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(skills.len(), Skill::ALL.len());
        assert_eq!(schema["required"], json!(["intent", "steps", "assumptions"]));
    }

    #[test]
    fn test_request_serializes_context() {
        let context = DraftContext {
            environment: Environment::Prod,
            change_id_present: true,
            user: UserContext::default(),
            patch_cutoff_hours: 24,
        };
        let request = DraftRequest::new("unmount /data", Some("storage_ops"), &context);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["skill_hint"], "storage_ops");
        assert_eq!(value["context"]["environment"], "prod");
        assert_eq!(value["context"]["change_id_present"], true);
        assert_eq!(value["rules"].as_array().unwrap().len(), 4);
    }
}
