// File: fieldops-sync/src/store.rs
// Purpose: Entity storage capability and the bundled SQLite implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{Payload, SyncStatus, VersionedRecord};
use crate::scope::CallerScope;

/// One conditional write against an entity row.
///
/// `expected_etag: None` means create; `Some` is the pre-image etag the row
/// must still carry for the write to land.
#[derive(Debug, Clone)]
pub struct ConditionalWrite {
    pub id: String,
    pub expected_etag: Option<String>,
    pub data: Payload,
    pub delete: bool,
    pub modified_by: Option<String>,
    pub sync_status: SyncStatus,
}

/// Storage accessor capability registered per entity type.
///
/// `apply_write` must execute the etag check and the write as one atomic
/// unit; two concurrent writers against the same pre-image etag must never
/// both succeed.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entity type this accessor serves
    fn entity_type(&self) -> &str;

    async fn get_by_id(&self, scope: &CallerScope, id: &str) -> Result<Option<VersionedRecord>>;

    /// Rows with `last_modified_at > since`, tombstones included,
    /// ordered by (last_modified_at, id)
    async fn list_changed_since(
        &self,
        scope: &CallerScope,
        since: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VersionedRecord>>;

    /// Conditional compare-and-swap write. Mints a fresh etag, increments
    /// row_version and stamps last_modified_at/by. Fails with
    /// `SyncError::Conflict` when the pre-image etag no longer matches
    /// (or, for creates, when the row already exists).
    async fn apply_write(
        &self,
        scope: &CallerScope,
        write: ConditionalWrite,
    ) -> Result<VersionedRecord>;

    /// Flag a row as conflicted without minting a new version.
    async fn mark_conflict(
        &self,
        scope: &CallerScope,
        id: &str,
        conflict_data: serde_json::Value,
    ) -> Result<()>;

    /// Physically remove tombstones older than the cutoff. Cross-tenant;
    /// only the reaper calls this.
    async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// SQLite-backed entity store. All registered types share the
/// `_fieldops_entities` table, keyed by (entity_type, tenant_id, id).
pub struct SqliteEntityStore {
    pool: SqlitePool,
    entity_type: String,
}

const RECORD_COLUMNS: &str = "entity_type, tenant_id, id, data, etag, row_version, \
     last_modified_at, last_modified_by, is_deleted, conflict_data, sync_status";

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool, entity_type: impl Into<String>) -> Self {
        Self {
            pool,
            entity_type: entity_type.into(),
        }
    }

    /// Initialize the entity table. Idempotent; called once at engine startup.
    pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _fieldops_entities (
                entity_type TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                etag TEXT NOT NULL,
                row_version INTEGER NOT NULL,
                last_modified_at DATETIME NOT NULL,
                last_modified_by TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                conflict_data TEXT,
                sync_status TEXT NOT NULL DEFAULT 'synced',
                PRIMARY KEY (entity_type, tenant_id, id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_fieldops_entities_changed
            ON _fieldops_entities(entity_type, tenant_id, last_modified_at, id)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn record_from_row(row: &SqliteRow) -> VersionedRecord {
        let data_str: String = row.get("data");
        let data = serde_json::from_str::<serde_json::Value>(&data_str)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        let conflict_str: Option<String> = row.get("conflict_data");
        let conflict_data = conflict_str.and_then(|s| serde_json::from_str(&s).ok());

        let status_str: String = row.get("sync_status");

        VersionedRecord {
            id: row.get("id"),
            entity_type: row.get("entity_type"),
            tenant_id: row.get("tenant_id"),
            data,
            etag: row.get("etag"),
            row_version: row.get("row_version"),
            last_modified_at: row.get("last_modified_at"),
            last_modified_by: row.get("last_modified_by"),
            is_deleted: row.get("is_deleted"),
            conflict_data,
            sync_status: SyncStatus::parse(&status_str),
        }
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    async fn get_by_id(&self, scope: &CallerScope, id: &str) -> Result<Option<VersionedRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM _fieldops_entities \
             WHERE entity_type = ? AND tenant_id = ? AND id = ?"
        );

        let row = sqlx::query(&sql)
            .bind(&self.entity_type)
            .bind(&scope.tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::record_from_row))
    }

    async fn list_changed_since(
        &self,
        scope: &CallerScope,
        since: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<VersionedRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM _fieldops_entities \
             WHERE entity_type = ? AND tenant_id = ? AND last_modified_at > ? \
             ORDER BY last_modified_at ASC, id ASC \
             LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(&self.entity_type)
            .bind(&scope.tenant_id)
            .bind(since)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn apply_write(
        &self,
        scope: &CallerScope,
        write: ConditionalWrite,
    ) -> Result<VersionedRecord> {
        let etag = Uuid::new_v4().to_string();
        let now = Utc::now();
        let data_json =
            serde_json::to_string(&write.data).map_err(|e| SyncError::validation(e.to_string()))?;

        // Both branches are single statements: the etag check and the write
        // commit or fail as one atomic unit.
        let row = match &write.expected_etag {
            None => {
                let sql = format!(
                    "INSERT INTO _fieldops_entities \
                     (entity_type, tenant_id, id, data, etag, row_version, \
                      last_modified_at, last_modified_by, is_deleted, conflict_data, sync_status) \
                     VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, NULL, ?) \
                     ON CONFLICT(entity_type, tenant_id, id) DO NOTHING \
                     RETURNING {RECORD_COLUMNS}"
                );

                sqlx::query(&sql)
                    .bind(&self.entity_type)
                    .bind(&scope.tenant_id)
                    .bind(&write.id)
                    .bind(&data_json)
                    .bind(&etag)
                    .bind(now)
                    .bind(&write.modified_by)
                    .bind(write.delete)
                    .bind(write.sync_status.as_str())
                    .fetch_optional(&self.pool)
                    .await?
            }
            Some(expected) => {
                let sql = format!(
                    "UPDATE _fieldops_entities \
                     SET data = ?, etag = ?, row_version = row_version + 1, \
                         last_modified_at = ?, last_modified_by = ?, is_deleted = ?, \
                         conflict_data = NULL, sync_status = ? \
                     WHERE entity_type = ? AND tenant_id = ? AND id = ? AND etag = ? \
                     RETURNING {RECORD_COLUMNS}"
                );

                sqlx::query(&sql)
                    .bind(&data_json)
                    .bind(&etag)
                    .bind(now)
                    .bind(&write.modified_by)
                    .bind(write.delete)
                    .bind(write.sync_status.as_str())
                    .bind(&self.entity_type)
                    .bind(&scope.tenant_id)
                    .bind(&write.id)
                    .bind(expected)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        match row {
            Some(row) => Ok(Self::record_from_row(&row)),
            None => Err(SyncError::conflict(&self.entity_type, &write.id)),
        }
    }

    async fn mark_conflict(
        &self,
        scope: &CallerScope,
        id: &str,
        conflict_data: serde_json::Value,
    ) -> Result<()> {
        let conflict_json = serde_json::to_string(&conflict_data)
            .map_err(|e| SyncError::validation(e.to_string()))?;

        sqlx::query(
            "UPDATE _fieldops_entities \
             SET sync_status = 'conflict', conflict_data = ? \
             WHERE entity_type = ? AND tenant_id = ? AND id = ?",
        )
        .bind(&conflict_json)
        .bind(&self.entity_type)
        .bind(&scope.tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM _fieldops_entities \
             WHERE entity_type = ? AND is_deleted = 1 AND last_modified_at < ?",
        )
        .bind(&self.entity_type)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
