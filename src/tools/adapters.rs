//! Simulated tool adapters
//!
//! Arguments are read leniently. A malformed argument is reported in the
//! evidence under `error` instead of failing the step.

use crate::plan::{Skill, StepArgs};
use crate::tools::{AdapterError, ToolAdapter, ToolEvidence};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Read a list argument: missing is empty, non-list is an error message
fn list_arg(args: &StepArgs, key: &str) -> Result<Vec<Value>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(format!("'{}' must be a list, got {}", key, other)),
    }
}

fn str_arg<'a>(args: &'a StepArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

// =============================================================================
// PATCHING EXCLUSION
// =============================================================================

pub struct PatchingExclusionAdapter {
    latency: Duration,
}

impl PatchingExclusionAdapter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ToolAdapter for PatchingExclusionAdapter {
    fn skill(&self) -> Skill {
        Skill::PatchingExclusion
    }

    async fn invoke(&self, args: &StepArgs) -> Result<ToolEvidence, AdapterError> {
        tokio::time::sleep(self.latency).await;

        let window = str_arg(args, "patch_window").unwrap_or("unknown");
        let evidence = match list_arg(args, "servers") {
            Ok(servers) => ToolEvidence::new(
                self.skill(),
                "dry-run: exclusions would be updated in patching tool",
            )
            .with("servers_count", servers.len()),
            Err(e) => ToolEvidence::new(self.skill(), "dry-run: skipped, invalid server list")
                .with("error", e),
        };

        Ok(evidence
            .with("action", "update_exclusions")
            .with("patch_window", window))
    }
}

// =============================================================================
// STORAGE OPERATIONS
// =============================================================================

pub struct StorageOpsAdapter {
    latency: Duration,
}

impl StorageOpsAdapter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ToolAdapter for StorageOpsAdapter {
    fn skill(&self) -> Skill {
        Skill::StorageOps
    }

    async fn invoke(&self, args: &StepArgs) -> Result<ToolEvidence, AdapterError> {
        tokio::time::sleep(self.latency).await;

        let action = str_arg(args, "action").unwrap_or("mount");
        let evidence = match list_arg(args, "targets") {
            Ok(targets) => ToolEvidence::new(
                self.skill(),
                "dry-run: would execute pre-checks, action, and post-checks",
            )
            .with("targets", targets),
            Err(e) => ToolEvidence::new(self.skill(), "dry-run: skipped, invalid target list")
                .with("targets", Vec::<Value>::new())
                .with("error", e),
        };

        Ok(evidence.with("action", action))
    }
}

// =============================================================================
// MANAGEENGINE DOWNTIME
// =============================================================================

pub struct ManageEngineDowntimeAdapter {
    latency: Duration,
}

impl ManageEngineDowntimeAdapter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ToolAdapter for ManageEngineDowntimeAdapter {
    fn skill(&self) -> Skill {
        Skill::ManageengineDowntime
    }

    async fn invoke(&self, args: &StepArgs) -> Result<ToolEvidence, AdapterError> {
        tokio::time::sleep(self.latency).await;

        // monitors take precedence; servers are accepted as an alias
        let monitors = match list_arg(args, "monitors") {
            Ok(monitors) if !monitors.is_empty() => Ok(monitors),
            Ok(_) => list_arg(args, "servers"),
            Err(e) => Err(e),
        };

        let window = json!({
            "start": args.get("start").cloned().unwrap_or(Value::Null),
            "end": args.get("end").cloned().unwrap_or(Value::Null),
            "timezone": str_arg(args, "timezone").unwrap_or("UTC"),
        });

        let evidence = match monitors {
            Ok(monitors) => ToolEvidence::new(
                self.skill(),
                "dry-run: downtime schedule would be created/updated via ManageEngine API",
            )
            .with("monitors", monitors),
            Err(e) => ToolEvidence::new(self.skill(), "dry-run: skipped, invalid monitor list")
                .with("monitors", Vec::<Value>::new())
                .with("error", e),
        };

        Ok(evidence.with("window", window))
    }
}

// =============================================================================
// VULNERABILITY TRIAGE
// =============================================================================

pub struct VulnTriageAdapter {
    latency: Duration,
}

impl VulnTriageAdapter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ToolAdapter for VulnTriageAdapter {
    fn skill(&self) -> Skill {
        Skill::VulnTriage
    }

    async fn invoke(&self, args: &StepArgs) -> Result<ToolEvidence, AdapterError> {
        tokio::time::sleep(self.latency).await;

        let rows = args.get("input_rows").and_then(Value::as_u64).unwrap_or(0);
        Ok(
            ToolEvidence::new(self.skill(), "dry-run: findings would be segmented and tickets proposed")
                .with("input_rows", rows),
        )
    }
}

// =============================================================================
// SOLARWINDS EVENT
// =============================================================================

pub struct SolarWindsEventAdapter {
    latency: Duration,
}

impl SolarWindsEventAdapter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ToolAdapter for SolarWindsEventAdapter {
    fn skill(&self) -> Skill {
        Skill::SolarwindsEvent
    }

    async fn invoke(&self, args: &StepArgs) -> Result<ToolEvidence, AdapterError> {
        tokio::time::sleep(self.latency).await;

        let field = |key: &str| args.get(key).cloned().unwrap_or(Value::Null);
        Ok(
            ToolEvidence::new(self.skill(), "dry-run: would trigger AWX template + notify DL")
                .with("site", field("site"))
                .with("device", field("device"))
                .with("state", field("state")),
        )
    }
}
