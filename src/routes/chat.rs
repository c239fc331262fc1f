//! Chat Routes
//!
//! Free-text requests become governed runs.

use crate::auth::UserContext;
use crate::error::{validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::plan::Environment;
use crate::run::{RunRecord, RunRequest, RunStatus};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::{Validate, ValidationError};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(custom(function = "not_blank"))]
    pub message: String,
    #[serde(default)]
    pub skill_hint: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub change_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub run: RunRecord,
    pub assistant_message: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Message is required".into());
        return Err(error);
    }
    Ok(())
}

/// Human-readable summary of what happened to a freshly submitted run
pub fn assistant_message(run: &RunRecord) -> String {
    let mut message = format!(
        "I prepared a {} risk plan for \"{}\". {}",
        run.risk().as_str().to_uppercase(),
        run.plan.intent.skill,
        if run.approval_required {
            "Approval is required before execution."
        } else {
            "Executing now in dry-run mode."
        }
    );

    match run.status {
        RunStatus::DryRun => message.push_str(" Dry-run completed. Review evidence in the run details."),
        RunStatus::Failed => {
            let error = run.error.as_deref().unwrap_or("unknown error");
            message.push_str(&format!(" Execution failed: {}", error));
        }
        _ => {}
    }

    message
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Submit a chat request
pub async fn chat(
    State(state): State<SharedState>,
    user: UserContext,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<SuccessResponse<ChatResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    debug!("Chat request from {} ({})", user.username, payload.environment);

    let request = RunRequest::new(payload.message, user)
        .skill_hint(payload.skill_hint)
        .environment(payload.environment)
        .change_id(payload.change_id);

    let run = state.runs.submit(request).await?;
    let assistant_message = assistant_message(&run);

    Ok(Json(SuccessResponse::with_data(
        "Run created",
        ChatResponse { run, assistant_message },
    )))
}
