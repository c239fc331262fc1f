//! OpsPilot API - Governed Automation Orchestrator
//!
//! Turns natural-language operations requests into reviewed, auditable
//! dry-run executions:
//! - Draft: a model (or the offline stub) proposes a typed execution plan
//! - Govern: policy gates escalate risk and require approval
//! - Approve: high-risk runs need an admin decision
//! - Execute: tool adapters simulate each step and record evidence

mod auth;
mod config;
mod drafter;
mod error;
mod models;
mod orchestrator;
mod plan;
mod policy;
mod routes;
mod run;
mod state;
mod tools;

use crate::config::Settings;
use crate::routes::create_router;
use crate::run::{InMemoryRunStore, PostgresRunStore, RunStore};
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before tracing so LOG_FORMAT / RUST_LOG apply
    let _ = dotenvy::dotenv();
    init_tracing();

    info!("🚀 Starting OpsPilot - Governed Automation Orchestrator...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let store: Arc<dyn RunStore> = match &settings.database {
        Some(database) => {
            let store = PostgresRunStore::connect(&database.url, database.max_pool_size).await?;
            Arc::new(store)
        }
        None => {
            warn!("⚠️  DATABASE_URL not set, runs are kept in memory only");
            Arc::new(InMemoryRunStore::new())
        }
    };

    let state = Arc::new(AppState::new(settings.clone(), store)?);

    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET  /api/health                 - Service and drafting status");
    info!("   POST /api/chat                   - Submit a request");
    info!("   GET  /api/runs                   - List runs");
    info!("   GET  /api/runs/:id               - Run details and evidence");
    info!("   POST /api/runs/:id/approve       - Approve or reject");
    info!("   POST /api/solarwinds/webhook     - SolarWinds alert trigger");
    info!("   POST /api/vuln/upload            - Vulnerability scan upload (multipart)");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` switches to structured JSON lines
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,opspilot_api=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
