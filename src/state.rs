//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::auth::UserDirectory;
use crate::config::Settings;
use crate::drafter::{DraftError, GeminiModel, PlanDrafter};
use crate::orchestrator::Orchestrator;
use crate::policy::PolicyEngine;
use crate::run::{RunService, RunStore};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use tracing::info;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,

    /// Run intake and approval workflow
    pub runs: RunService,

    /// Demo identities resolved from request headers
    pub users: UserDirectory,
}

impl AppState {
    /// Wire drafter, policy and tools from settings on top of `store`
    pub fn new(settings: Settings, store: Arc<dyn RunStore>) -> Result<Self, DraftError> {
        let drafter = match GeminiModel::from_config(&settings.llm)? {
            Some(model) => {
                info!("🤖 Plan drafting via {}", settings.llm.model);
                PlanDrafter::with_model(Arc::new(model), settings.llm.timeout)
            }
            None => {
                info!("🤖 GEMINI_API_KEY not set, plans are drafted offline");
                PlanDrafter::offline()
            }
        };

        let orchestrator = Orchestrator::new(
            drafter,
            PolicyEngine::from_config(&settings.governance),
            ToolRegistry::with_defaults(settings.tool_latency),
        )
        .with_patch_cutoff_hours(settings.governance.patch_cutoff_hours);

        let users = UserDirectory::from_json(&settings.demo_users_json);
        info!("👥 Loaded {} demo users", users.len());

        Ok(Self {
            runs: RunService::new(store, Arc::new(orchestrator)),
            users,
            settings,
        })
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
