//! Run storage
//!
//! The store owns the authoritative copy of every run; callers only ever see
//! snapshots. Mutation is whole-field replacement through [`RunPatch`], and
//! `update_if_status` gives atomic compare-and-set on the status so two
//! concurrent approvals cannot both transition the same run.

use crate::run::{RunPatch, RunRecord, RunStatus};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Run {0} not found")]
    NotFound(String),

    #[error("Run {0} already exists")]
    Duplicate(String),

    #[error("Run {run_id} is {actual}, expected {expected}")]
    StatusMismatch {
        run_id: String,
        expected: RunStatus,
        actual: RunStatus,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run. Fails with `Duplicate` if the id is taken.
    async fn create(&self, run: RunRecord) -> Result<RunRecord, StoreError>;

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError>;

    /// All runs, newest first
    async fn list(&self) -> Result<Vec<RunRecord>, StoreError>;

    async fn update(&self, run_id: &str, patch: &RunPatch) -> Result<RunRecord, StoreError>;

    /// Apply `patch` only if the run is currently in `expected` status
    async fn update_if_status(
        &self,
        run_id: &str,
        expected: RunStatus,
        patch: &RunPatch,
    ) -> Result<RunRecord, StoreError>;
}

/// Newest first; ties broken by run id so the order is total
pub fn newest_first(a: &RunRecord, b: &RunRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.run_id.cmp(&a.run_id))
}

/// Thread-safe in-memory run store
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: RunRecord) -> Result<RunRecord, StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.run_id) {
            return Err(StoreError::Duplicate(run.run_id));
        }
        runs.insert(run.run_id.clone(), run.clone());
        debug!("Stored run {} ({})", run.run_id, run.status);
        Ok(run)
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        let runs = self.runs.read().await;
        let mut list: Vec<RunRecord> = runs.values().cloned().collect();
        list.sort_by(newest_first);
        Ok(list)
    }

    async fn update(&self, run_id: &str, patch: &RunPatch) -> Result<RunRecord, StoreError> {
        let mut runs = self.runs.write().await;
        let current = runs
            .get(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        let updated = current.apply(patch);
        runs.insert(run_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn update_if_status(
        &self,
        run_id: &str,
        expected: RunStatus,
        patch: &RunPatch,
    ) -> Result<RunRecord, StoreError> {
        let mut runs = self.runs.write().await;
        let current = runs
            .get(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        if current.status != expected {
            return Err(StoreError::StatusMismatch {
                run_id: run_id.to_string(),
                expected,
                actual: current.status,
            });
        }

        let updated = current.apply(patch);
        runs.insert(run_id.to_string(), updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserContext;
    use crate::drafter::stub_plan;
    use crate::plan::Environment;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn run_at(offset_secs: i64) -> RunRecord {
        let mut run = RunRecord::new(
            &UserContext::default(),
            Environment::Dev,
            "msg",
            stub_plan("msg", None),
            true,
            Vec::new(),
        );
        run.created_at = Utc::now() + Duration::seconds(offset_secs);
        run
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryRunStore::new();
        let run = store.create(run_at(0)).await.unwrap();
        assert_eq!(store.get(&run.run_id).await.unwrap(), Some(run));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = InMemoryRunStore::new();
        let run = store.create(run_at(0)).await.unwrap();
        let result = store.create(run.clone()).await;
        assert!(matches!(result, Err(StoreError::Duplicate(id)) if id == run.run_id));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_for_any_insertion_order() {
        let store = InMemoryRunStore::new();
        for offset in [5, -3, 10, 0, 7] {
            store.create(run_at(offset)).await.unwrap();
        }

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 5);
        for pair in listed.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_update_unknown_run_is_not_found() {
        let store = InMemoryRunStore::new();
        let result = store.update("nope", &RunPatch::new().status(RunStatus::Failed)).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_fields() {
        let store = InMemoryRunStore::new();
        let run = store.create(run_at(0)).await.unwrap();
        let updated = store
            .update(&run.run_id, &RunPatch::new().status(RunStatus::Failed).error("boom"))
            .await
            .unwrap();

        assert_eq!(updated.status, RunStatus::Failed);
        assert_eq!(updated.error.as_deref(), Some("boom"));
        assert_eq!(store.get(&run.run_id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_update_if_status_rejects_mismatch() {
        let store = InMemoryRunStore::new();
        let run = store.create(run_at(0)).await.unwrap();
        let result = store
            .update_if_status(&run.run_id, RunStatus::Running, &RunPatch::new().status(RunStatus::DryRun))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::StatusMismatch { actual: RunStatus::PendingApproval, .. })
        ));
        assert_eq!(store.get(&run.run_id).await.unwrap().unwrap().status, RunStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_concurrent_transitions_only_one_wins() {
        let store = Arc::new(InMemoryRunStore::new());
        let run = store.create(run_at(0)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let run_id = run.run_id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_if_status(&run_id, RunStatus::PendingApproval, &RunPatch::new().status(RunStatus::Running))
                    .await
                    .is_ok()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
