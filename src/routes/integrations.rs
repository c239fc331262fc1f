//! Integration Routes
//!
//! Third-party triggers: SolarWinds alerts and vulnerability scan uploads.
//! Both enter the same governed pipeline as chat requests, under a service
//! identity, with the trigger recorded as the first evidence entry.

use crate::auth::UserContext;
use crate::error::{validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::plan::{Environment, Skill};
use crate::run::{EvidenceEntry, RunRequest};
use crate::state::SharedState;
use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::info;

/// Fields copied from a SolarWinds alert into the first step
const ALERT_FIELDS: [&str; 3] = ["site", "device", "state"];

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub run_id: String,
    pub approval_required: bool,
}

/// Multipart field carrying the uploaded scan
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub run_id: String,
    pub rows: usize,
    pub approval_required: bool,
}

/// Data rows in a CSV-ish upload: non-blank lines minus the header.
///
/// `\n`, `\r\n` and a lone `\r` all end a line.
pub fn count_rows(content: &str) -> usize {
    content
        .split(|c: char| c == '\n' || c == '\r')
        .filter(|line| !line.trim().is_empty())
        .count()
        .saturating_sub(1)
}

/// SolarWinds IP SLA alert
pub async fn solarwinds_webhook(
    State(state): State<SharedState>,
    Json(payload): Json<Map<String, Value>>,
) -> ApiResult<Json<SuccessResponse<WebhookResponse>>> {
    let field = |key: &str| payload.get(key).and_then(Value::as_str);
    let message = format!(
        "SolarWinds IP SLA event: {} at {} ({})",
        field("state").unwrap_or("unknown"),
        field("site").unwrap_or("unknown"),
        field("device").unwrap_or("unknown"),
    );

    let mut request = RunRequest::new(message, UserContext::service("solarwinds"))
        .skill_hint(Some(Skill::SolarwindsEvent.to_string()))
        .environment(Environment::Prod)
        .change_id(field("change_id").map(str::to_string));
    for key in ALERT_FIELDS {
        if let Some(value) = payload.get(key) {
            request = request.first_step_arg(key, value.clone());
        }
    }
    let request = request.evidence(EvidenceEntry::Webhook {
        payload: Value::Object(payload),
    });

    let run = state.runs.submit(request).await?;
    info!("📡 SolarWinds alert opened run {} ({})", run.run_id, run.status);

    Ok(Json(SuccessResponse::with_data(
        "Webhook accepted",
        WebhookResponse {
            run_id: run.run_id,
            approval_required: run.approval_required,
        },
    )))
}

/// Vulnerability scan upload (multipart form with a `file` part)
pub async fn vuln_upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SuccessResponse<UploadResponse>>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| validation_error(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| validation_error(format!("Failed to read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) =
        upload.ok_or_else(|| validation_error(format!("Missing '{}' field", UPLOAD_FIELD)))?;

    let content = String::from_utf8_lossy(&bytes);
    let rows = count_rows(&content);

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    let message = format!(
        "Vulnerability triage for uploaded file {} with approx {} rows. \
         Segment by team (Wintel/Linux/App) and prioritize.",
        filename, rows
    );

    let request = RunRequest::new(message, UserContext::service("operator"))
        .skill_hint(Some(Skill::VulnTriage.to_string()))
        .environment(Environment::Dev)
        .first_step_arg("input_rows", rows)
        .evidence(EvidenceEntry::Upload {
            filename,
            rows,
            sha256,
        });

    let run = state.runs.submit(request).await?;
    info!("📄 Upload opened run {} with {} rows", run.run_id, rows);

    Ok(Json(SuccessResponse::with_data(
        "Upload accepted",
        UploadResponse {
            run_id: run.run_id,
            rows,
            approval_required: run.approval_required,
        },
    )))
}
