// File: fieldops-sync/src/versions.rs
// Purpose: Append-only log of accepted writes, keyed by the etag they minted

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{Payload, SyncOperation};
use crate::scope::CallerScope;

/// Log of accepted writes. Serves the operational-transform base lookup
/// (what payload did this stale etag refer to?) and write history. Rows age
/// out on the same retention window as tombstones.
#[derive(Clone)]
pub struct VersionLog {
    pool: SqlitePool,
}

impl VersionLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the version log table. Idempotent.
    pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _fieldops_version_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                etag TEXT NOT NULL,
                operation TEXT NOT NULL,
                data TEXT NOT NULL,
                client_id TEXT,
                recorded_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_fieldops_version_log_etag
            ON _fieldops_version_log(entity_type, tenant_id, entity_id, etag)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Append one accepted write.
    pub async fn record(
        &self,
        scope: &CallerScope,
        entity_type: &str,
        entity_id: &str,
        operation: SyncOperation,
        etag: &str,
        data: &Payload,
        client_id: Option<&str>,
    ) -> Result<()> {
        let data_json = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO _fieldops_version_log
            (entity_type, tenant_id, entity_id, etag, operation, data, client_id, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity_type)
        .bind(&scope.tenant_id)
        .bind(entity_id)
        .bind(etag)
        .bind(operation.to_string())
        .bind(&data_json)
        .bind(client_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Payload that a given etag referred to, if still retained.
    pub async fn find_by_etag(
        &self,
        scope: &CallerScope,
        entity_type: &str,
        entity_id: &str,
        etag: &str,
    ) -> Result<Option<Payload>> {
        let row = sqlx::query(
            r#"
            SELECT data FROM _fieldops_version_log
            WHERE entity_type = ? AND tenant_id = ? AND entity_id = ? AND etag = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(entity_type)
        .bind(&scope.tenant_id)
        .bind(entity_id)
        .bind(etag)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| {
            let data_str: String = row.get("data");
            serde_json::from_str::<serde_json::Value>(&data_str)
                .ok()
                .and_then(|v| v.as_object().cloned())
        }))
    }

    /// Trim entries older than the cutoff.
    pub async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM _fieldops_version_log WHERE recorded_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
