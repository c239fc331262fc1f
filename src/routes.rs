//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod chat;
mod integrations;
mod runs;

use crate::auth::{ROLE_HEADER, USER_HEADER};
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, HeaderName, Method},
    routing::{get, post},
    Json, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/api/health", get(health_check))
        // Conversational intake
        .route("/api/chat", post(chat::chat))
        // Runs & approvals
        .route("/api/runs", get(runs::list_runs))
        .route("/api/runs/{run_id}", get(runs::get_run))
        .route("/api/runs/{run_id}/approve", post(runs::approve_run))
        // Integration triggers
        .route("/api/solarwinds/webhook", post(integrations::solarwinds_webhook))
        .route("/api/vuln/upload", post(integrations::vuln_upload))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_HEADER),
            HeaderName::from_static(ROLE_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let drafter = state.runs.orchestrator().drafter();

    Json(serde_json::json!({
        "success": true,
        "status": "ok",
        "app": state.settings.app_name,
        "llm_configured": drafter.is_configured(),
        "model": drafter.model_name(),
        "drafting": drafter.stats(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::InMemoryRunStore;
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let settings = Settings {
            tool_latency: Duration::ZERO,
            ..Settings::default()
        };
        let state = AppState::new(settings.clone(), Arc::new(InMemoryRunStore::new())).unwrap();
        create_router(Arc::new(state), &settings)
    }

    fn post_json(uri: &str, body: Value, user: Option<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some((name, role)) = user {
            builder = builder.header(USER_HEADER, name).header(ROLE_HEADER, role);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn test_health_reports_offline_drafting() {
        let (status, body) = send(&app(), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["app"], "OpsPilot");
        assert_eq!(body["llm_configured"], false);
        assert_eq!(body["drafting"], json!({"drafted": 0, "fallbacks": 0}));
    }

    #[tokio::test]
    async fn test_health_counts_offline_plans_as_fallbacks() {
        let app = app();
        send(
            &app,
            post_json("/api/chat", json!({"message": "exclude web01 from patching"}), None),
        )
        .await;

        let (_, body) = send(&app, get("/api/health")).await;
        assert_eq!(body["drafting"], json!({"drafted": 0, "fallbacks": 1}));
    }

    #[tokio::test]
    async fn test_chat_low_risk_runs_dry() {
        let app = app();
        let (status, body) = send(
            &app,
            post_json("/api/chat", json!({"message": "exclude web01 from patching"}), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run"]["status"], "dry_run");
        assert_eq!(body["run"]["requested_by"], "operator");
        assert_eq!(
            body["assistant_message"],
            "I prepared a LOW risk plan for \"patching_exclusion\". Executing now in dry-run mode. \
             Dry-run completed. Review evidence in the run details."
        );
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message() {
        let (status, body) = send(&app(), post_json("/api/chat", json!({"message": "   "}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_high_risk_approval_flow() {
        let app = app();
        let (_, body) = send(
            &app,
            post_json(
                "/api/chat",
                json!({"message": "exclude db01", "environment": "prod"}),
                Some(("operator", "operator")),
            ),
        )
        .await;
        assert_eq!(body["run"]["status"], "pending_approval");
        let run_id = body["run"]["run_id"].as_str().unwrap().to_string();
        let approve = format!("/api/runs/{}/approve", run_id);

        let (status, body) = send(
            &app,
            post_json(&approve, json!({"decision": "approved"}), Some(("operator", "operator"))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        // directory role wins over a spoofed header
        let (status, _) = send(
            &app,
            post_json(&approve, json!({"decision": "approved"}), Some(("viewer", "admin"))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            post_json(&approve, json!({"decision": "approved", "comment": "ok"}), Some(("admin", "admin"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run"]["status"], "dry_run");
        assert_eq!(body["run"]["approval_decision"], "approved");
        assert_eq!(body["run"]["evidence"][0]["type"], "approval");

        let (status, body) = send(
            &app,
            post_json(&approve, json!({"decision": "approved"}), Some(("admin", "admin"))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let (status, body) = send(&app(), get("/api/runs/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let app = app();
        for message in ["first", "second"] {
            send(&app, post_json("/api/chat", json!({"message": message}), None)).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (status, body) = send(&app, get("/api/runs")).await;
        assert_eq!(status, StatusCode::OK);
        let messages: Vec<&str> = body["runs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["message"].as_str().unwrap())
            .collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_solarwinds_webhook_requires_approval_in_prod() {
        let app = app();
        let payload = json!({"site": "DC1", "device": "rtr-01", "state": "down"});
        let (status, body) = send(&app, post_json("/api/solarwinds/webhook", payload.clone(), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approval_required"], true);

        let run_id = body["run_id"].as_str().unwrap();
        let (_, body) = send(&app, get(&format!("/api/runs/{}", run_id))).await;
        assert_eq!(body["run"]["requested_by"], "solarwinds");
        assert_eq!(body["run"]["environment"], "prod");
        assert_eq!(body["run"]["plan"]["intent"]["risk"], "high");
        assert_eq!(body["run"]["evidence"][0], json!({"type": "webhook", "payload": payload}));
    }

    const BOUNDARY: &str = "opspilot-test-boundary";

    fn multipart_upload(field: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {content}\r\n\
             --{b}--\r\n",
            b = BOUNDARY,
        );
        Request::builder()
            .method(Method::POST)
            .uri("/api/vuln/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_vuln_upload_counts_rows() {
        let app = app();
        let content = "host,cve\r\n\r\nweb01,CVE-1\r\nweb02,CVE-2\r\n  ";
        let (status, body) = send(&app, multipart_upload("file", "scan.csv", content)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"], 2);
        assert_eq!(body["approval_required"], false);

        let run_id = body["run_id"].as_str().unwrap();
        let (_, body) = send(&app, get(&format!("/api/runs/{}", run_id))).await;
        let run = &body["run"];
        assert_eq!(run["status"], "dry_run");
        assert_eq!(run["plan"]["steps"][0]["args"]["input_rows"], 2);
        assert_eq!(run["evidence"][0]["type"], "upload");
        assert_eq!(run["evidence"][0]["filename"], "scan.csv");

        let expected = format!("{:x}", Sha256::digest(content.as_bytes()));
        assert_eq!(run["evidence"][0]["sha256"], expected.as_str());
    }

    #[tokio::test]
    async fn test_vuln_upload_requires_file_field() {
        let app = app();
        let request = multipart_upload("attachment", "scan.csv", "host,cve\r\nweb01,CVE-1");
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
