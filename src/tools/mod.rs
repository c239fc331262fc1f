//! Tool Registry
//!
//! Maps each skill to the adapter that carries it out. Adapters here are
//! dry-run simulations: they sleep to model I/O latency and describe what a
//! real integration would have done.

mod adapters;

pub use adapters::{
    ManageEngineDowntimeAdapter, PatchingExclusionAdapter, SolarWindsEventAdapter,
    StorageOpsAdapter, VulnTriageAdapter,
};

use crate::plan::{Skill, StepArgs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// What an adapter reports back for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvidence {
    pub adapter: Skill,
    /// Narrative of the simulated outcome
    pub result: String,
    /// Adapter-specific fields
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ToolEvidence {
    pub fn new(adapter: Skill, result: impl Into<String>) -> Self {
        Self {
            adapter,
            result: result.into(),
            details: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// An adapter fault that could not be folded into evidence.
///
/// The built-in adapters never return this.
#[derive(Error, Debug)]
#[error("Adapter {adapter} failed: {message}")]
pub struct AdapterError {
    pub adapter: Skill,
    pub message: String,
}

#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn skill(&self) -> Skill;

    async fn invoke(&self, args: &StepArgs) -> Result<ToolEvidence, AdapterError>;
}

/// Static mapping from skill to adapter
#[derive(Clone, Default)]
pub struct ToolRegistry {
    adapters: HashMap<Skill, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    /// Registry with no adapters
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter using the given simulated latency
    pub fn with_defaults(latency: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PatchingExclusionAdapter::new(latency)));
        registry.register(Arc::new(StorageOpsAdapter::new(latency)));
        registry.register(Arc::new(ManageEngineDowntimeAdapter::new(latency)));
        registry.register(Arc::new(VulnTriageAdapter::new(latency)));
        registry.register(Arc::new(SolarWindsEventAdapter::new(latency)));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        self.adapters.insert(adapter.skill(), adapter);
    }

    pub fn get(&self, skill: Skill) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(&skill).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}
