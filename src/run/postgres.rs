//! PostgreSQL run store
//!
//! Each run is a JSONB document keyed by id, with `created_at` and `status`
//! mirrored into columns for ordering and compare-and-set. Updates take a
//! row lock (`SELECT ... FOR UPDATE`) for the read-modify-write.

use crate::run::store::{RunStore, StoreError};
use crate::run::{RunPatch, RunRecord, RunStatus};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_types::Json;
use serde_json::Value;
use tokio_postgres::Row;
use tracing::info;

pub struct PostgresRunStore {
    pool: Pool,
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Decode the `record` column; a row that no longer matches `RunRecord`
/// surfaces as a backend error instead of a panic.
fn decode_row(row: &Row) -> Result<RunRecord, StoreError> {
    let Json(value): Json<Value> = row.try_get(0).map_err(backend)?;
    decode_record(value)
}

fn decode_record(value: Value) -> Result<RunRecord, StoreError> {
    serde_json::from_value(value).map_err(|e| backend(format!("Corrupt run record: {}", e)))
}

impl PostgresRunStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from a `postgres://` URL and make sure the schema exists
    pub async fn connect(database_url: &str, max_pool_size: usize) -> Result<Self, StoreError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| backend(format!("Failed to parse DATABASE_URL: {}", e)))?;

        let host = match config.get_hosts().first() {
            Some(tokio_postgres::config::Host::Tcp(host)) => host.clone(),
            Some(_) => return Err(backend("Unix socket connections are not supported")),
            None => return Err(backend("No host in DATABASE_URL")),
        };

        let mut cfg = Config::new();
        cfg.host = Some(host.clone());
        cfg.port = Some(config.get_ports().first().copied().unwrap_or(5432));
        cfg.user = config.get_user().map(str::to_string);
        cfg.password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = config.get_dbname().map(str::to_string);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(max_pool_size));

        let use_tls = host.contains("neon.tech") || database_url.contains("sslmode=require");

        let pool = if use_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls).map_err(backend)?
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
                .map_err(backend)?
        };

        let store = Self::new(pool);
        store.migrate().await?;
        info!("✅ Run store connected to PostgreSQL (TLS: {})", use_tls);
        Ok(store)
    }

    /// Create the runs table if it does not exist
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(backend)?;

        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    created_at TIMESTAMPTZ NOT NULL,
                    status TEXT NOT NULL,
                    record JSONB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs (created_at DESC, run_id DESC);",
            )
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn patch_locked(
        &self,
        run_id: &str,
        expected: Option<RunStatus>,
        patch: &RunPatch,
    ) -> Result<RunRecord, StoreError> {
        let mut client = self.pool.get().await.map_err(backend)?;
        let tx = client.transaction().await.map_err(backend)?;

        let row = tx
            .query_opt("SELECT record FROM runs WHERE run_id = $1 FOR UPDATE", &[&run_id])
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        let current = decode_row(&row)?;

        if let Some(expected) = expected {
            if current.status != expected {
                return Err(StoreError::StatusMismatch {
                    run_id: run_id.to_string(),
                    expected,
                    actual: current.status,
                });
            }
        }

        let updated = current.apply(patch);
        tx.execute(
            "UPDATE runs SET status = $2, record = $3 WHERE run_id = $1",
            &[&run_id, &updated.status.as_str(), &Json(&updated)],
        )
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn create(&self, run: RunRecord) -> Result<RunRecord, StoreError> {
        let client = self.pool.get().await.map_err(backend)?;

        let inserted = client
            .execute(
                "INSERT INTO runs (run_id, created_at, status, record)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (run_id) DO NOTHING",
                &[&run.run_id, &run.created_at, &run.status.as_str(), &Json(&run)],
            )
            .await
            .map_err(backend)?;

        if inserted == 0 {
            return Err(StoreError::Duplicate(run.run_id));
        }
        Ok(run)
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let client = self.pool.get().await.map_err(backend)?;

        let row = client
            .query_opt("SELECT record FROM runs WHERE run_id = $1", &[&run_id])
            .await
            .map_err(backend)?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn list(&self) -> Result<Vec<RunRecord>, StoreError> {
        let client = self.pool.get().await.map_err(backend)?;

        let rows = client
            .query("SELECT record FROM runs ORDER BY created_at DESC, run_id DESC", &[])
            .await
            .map_err(backend)?;

        rows.iter().map(decode_row).collect()
    }

    async fn update(&self, run_id: &str, patch: &RunPatch) -> Result<RunRecord, StoreError> {
        self.patch_locked(run_id, None, patch).await
    }

    async fn update_if_status(
        &self,
        run_id: &str,
        expected: RunStatus,
        patch: &RunPatch,
    ) -> Result<RunRecord, StoreError> {
        self.patch_locked(run_id, Some(expected), patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserContext;
    use crate::drafter::stub_plan;
    use crate::plan::Environment;
    use serde_json::json;

    #[test]
    fn test_decode_record_reads_stored_document() {
        let run = RunRecord::new(
            &UserContext::default(),
            Environment::Dev,
            "exclude web01",
            stub_plan("exclude web01", None),
            false,
            Vec::new(),
        );
        let stored = serde_json::to_value(&run).unwrap();

        assert_eq!(decode_record(stored).unwrap(), run);
    }

    #[test]
    fn test_decode_record_rejects_malformed_document() {
        let err = decode_record(json!({"run_id": "r1", "status": "exploded"})).unwrap_err();
        match err {
            StoreError::Backend(message) => assert!(message.contains("Corrupt run record")),
            other => panic!("expected backend error, got {:?}", other),
        }
    }
}
