// File: fieldops-sync/src/conflicts.rs
// Purpose: Persistence for open conflict records

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::ConflictRecord;
use crate::scope::CallerScope;

/// Store for open `ConflictRecord`s. At most one open record per
/// (tenant, entity_type, entity_id, client_id); a later losing push from the
/// same client replaces the earlier record.
#[derive(Clone)]
pub struct ConflictLog {
    pool: SqlitePool,
}

impl ConflictLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the conflicts table. Idempotent.
    pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _fieldops_conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                client_etag TEXT,
                server_etag TEXT NOT NULL,
                client_data TEXT NOT NULL,
                server_data TEXT NOT NULL,
                client_timestamp DATETIME NOT NULL,
                server_timestamp DATETIME NOT NULL,
                UNIQUE (tenant_id, entity_type, entity_id, client_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn record_from_row(row: &SqliteRow) -> ConflictRecord {
        let parse_payload = |column: &str| {
            let s: String = row.get(column);
            serde_json::from_str::<serde_json::Value>(&s)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default()
        };

        ConflictRecord {
            entity_type: row.get("entity_type"),
            entity_id: row.get("entity_id"),
            client_id: row.get("client_id"),
            client_etag: row.get("client_etag"),
            server_etag: row.get("server_etag"),
            client_data: parse_payload("client_data"),
            server_data: parse_payload("server_data"),
            client_timestamp: row.get("client_timestamp"),
            server_timestamp: row.get("server_timestamp"),
        }
    }

    /// Persist (or replace) an open conflict record.
    pub async fn record(&self, scope: &CallerScope, conflict: &ConflictRecord) -> Result<()> {
        let client_json =
            serde_json::to_string(&conflict.client_data).unwrap_or_else(|_| "{}".to_string());
        let server_json =
            serde_json::to_string(&conflict.server_data).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO _fieldops_conflicts
            (tenant_id, entity_type, entity_id, client_id, client_etag, server_etag,
             client_data, server_data, client_timestamp, server_timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, entity_type, entity_id, client_id) DO UPDATE SET
                client_etag = excluded.client_etag,
                server_etag = excluded.server_etag,
                client_data = excluded.client_data,
                server_data = excluded.server_data,
                client_timestamp = excluded.client_timestamp,
                server_timestamp = excluded.server_timestamp
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&conflict.entity_type)
        .bind(&conflict.entity_id)
        .bind(&conflict.client_id)
        .bind(&conflict.client_etag)
        .bind(&conflict.server_etag)
        .bind(&client_json)
        .bind(&server_json)
        .bind(conflict.client_timestamp)
        .bind(conflict.server_timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Open conflicts for one client, restricted to the given entity types.
    pub async fn open_for_client(
        &self,
        scope: &CallerScope,
        client_id: &str,
        entity_types: &[String],
    ) -> Result<Vec<ConflictRecord>> {
        let mut records = Vec::new();

        for entity_type in entity_types {
            let rows = sqlx::query(
                "SELECT * FROM _fieldops_conflicts \
                 WHERE tenant_id = ? AND entity_type = ? AND client_id = ? \
                 ORDER BY entity_id ASC",
            )
            .bind(&scope.tenant_id)
            .bind(entity_type)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;

            records.extend(rows.iter().map(Self::record_from_row));
        }

        Ok(records)
    }

    /// Latest open conflict on an entity, any client.
    pub async fn get(
        &self,
        scope: &CallerScope,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<ConflictRecord>> {
        let row = sqlx::query(
            "SELECT * FROM _fieldops_conflicts \
             WHERE tenant_id = ? AND entity_type = ? AND entity_id = ? \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(&scope.tenant_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::record_from_row))
    }

    /// Whether a client has an open conflict on an entity.
    pub async fn has_open(
        &self,
        scope: &CallerScope,
        entity_type: &str,
        entity_id: &str,
        client_id: &str,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM _fieldops_conflicts \
             WHERE tenant_id = ? AND entity_type = ? AND entity_id = ? AND client_id = ?",
        )
        .bind(&scope.tenant_id)
        .bind(entity_type)
        .bind(entity_id)
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Destroy every open conflict on an entity (after resolution).
    pub async fn clear(
        &self,
        scope: &CallerScope,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM _fieldops_conflicts \
             WHERE tenant_id = ? AND entity_type = ? AND entity_id = ?",
        )
        .bind(&scope.tenant_id)
        .bind(entity_type)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
