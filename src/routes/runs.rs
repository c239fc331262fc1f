//! Run Routes
//!
//! Listing, lookup and approval decisions.

use crate::auth::UserContext;
use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::run::{Decision, RunRecord};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub decision: Decision,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run: RunRecord,
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunRecord>,
}

/// List all runs, newest first
pub async fn list_runs(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<RunListResponse>>> {
    let runs = state.runs.list().await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} runs", runs.len()),
        RunListResponse { runs },
    )))
}

/// Get a single run
pub async fn get_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<SuccessResponse<RunResponse>>> {
    let run = state.runs.get(&run_id).await?;

    Ok(Json(SuccessResponse::with_data("Run retrieved", RunResponse { run })))
}

/// Approve or reject a pending run
pub async fn approve_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
    user: UserContext,
    Json(payload): Json<ApproveRequest>,
) -> ApiResult<Json<SuccessResponse<RunResponse>>> {
    let run = state
        .runs
        .decide(&run_id, payload.decision, payload.comment, &user)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Run {}", run.status),
        RunResponse { run },
    )))
}
