// File: fieldops-sync/src/reaper.rs
// Purpose: Scheduled single-flight purge of aged tombstones

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::versions::VersionLog;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub tombstones_purged: u64,
    pub versions_trimmed: u64,
    /// Another pass was already in flight; this one did nothing
    pub skipped: bool,
}

/// Physically deletes soft-deleted rows older than the retention window, and
/// trims the version log on the same window. Runs on its own schedule,
/// independent of request handling; never two passes concurrently.
pub struct TombstoneReaper {
    registry: Arc<EntityRegistry>,
    versions: VersionLog,
    retention: chrono::Duration,
    interval: Duration,
    gate: Mutex<()>,
}

impl TombstoneReaper {
    pub fn new(
        registry: Arc<EntityRegistry>,
        versions: VersionLog,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            versions,
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::days(30)),
            interval,
            gate: Mutex::new(()),
        }
    }

    /// Spawn the recurring background task. Failures are logged and deferred
    /// to the next tick.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the immediate first tick would reap at startup
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(summary) if !summary.skipped => {
                        tracing::debug!(
                            purged = summary.tombstones_purged,
                            trimmed = summary.versions_trimmed,
                            "reap pass complete"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "reap pass failed, deferring to next run");
                    }
                }
            }
        })
    }

    /// One reap pass. Single-flight: an overlapping call returns
    /// `skipped` instead of queueing behind the running pass.
    pub async fn run_once(&self) -> Result<ReapSummary> {
        let Ok(_guard) = self.gate.try_lock() else {
            return Ok(ReapSummary {
                skipped: true,
                ..ReapSummary::default()
            });
        };

        let cutoff = Utc::now() - self.retention;
        let mut summary = ReapSummary::default();

        for entity_type in self.registry.types() {
            let entry = self.registry.lookup(entity_type)?;
            // per-type failure is non-fatal; remaining types still reap
            match entry.store.purge_deleted_before(cutoff).await {
                Ok(purged) => summary.tombstones_purged += purged,
                Err(err) => {
                    tracing::warn!(
                        entity_type,
                        error = %err,
                        "tombstone purge failed for type"
                    );
                }
            }
        }

        summary.versions_trimmed = self.versions.cleanup_older_than(cutoff).await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use crate::registry::EntitySchema;
    use crate::scope::CallerScope;
    use crate::store::{ConditionalWrite, EntityStore, SqliteEntityStore};
    use serde_json::json;

    async fn fixture(retention: Duration) -> (Arc<TombstoneReaper>, Arc<dyn EntityStore>) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteEntityStore::init_tables(&pool).await.unwrap();
        VersionLog::init_tables(&pool).await.unwrap();

        let store: Arc<dyn EntityStore> =
            Arc::new(SqliteEntityStore::new(pool.clone(), "gates"));
        let mut registry = EntityRegistry::new();
        registry.register("gates", store.clone(), EntitySchema::new().scalar("state"));

        let reaper = Arc::new(TombstoneReaper::new(
            Arc::new(registry),
            VersionLog::new(pool),
            retention,
            Duration::from_secs(3600),
        ));

        (reaper, store)
    }

    async fn tombstone(store: &Arc<dyn EntityStore>, scope: &CallerScope, id: &str) {
        let created = store
            .apply_write(
                scope,
                ConditionalWrite {
                    id: id.into(),
                    expected_etag: None,
                    data: json!({"state": "open"}).as_object().cloned().unwrap(),
                    delete: false,
                    modified_by: None,
                    sync_status: SyncStatus::Synced,
                },
            )
            .await
            .unwrap();
        store
            .apply_write(
                scope,
                ConditionalWrite {
                    id: id.into(),
                    expected_etag: Some(created.etag),
                    data: json!({"state": "open"}).as_object().cloned().unwrap(),
                    delete: true,
                    modified_by: None,
                    sync_status: SyncStatus::Synced,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn aged_tombstones_are_purged() {
        let (reaper, store) = fixture(Duration::ZERO).await;
        let scope = CallerScope::new("org-1", "tester");
        tombstone(&store, &scope, "g-1").await;

        // zero retention: everything older than "now" goes
        tokio::time::sleep(Duration::from_millis(5)).await;
        let summary = reaper.run_once().await.unwrap();
        assert_eq!(summary.tombstones_purged, 1);
        assert!(store.get_by_id(&scope, "g-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_tombstones_survive_the_retention_window() {
        let (reaper, store) = fixture(Duration::from_secs(3600)).await;
        let scope = CallerScope::new("org-1", "tester");
        tombstone(&store, &scope, "g-1").await;

        let summary = reaper.run_once().await.unwrap();
        assert_eq!(summary.tombstones_purged, 0);
        assert!(store.get_by_id(&scope, "g-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_pass_is_skipped_not_queued() {
        let (reaper, _) = fixture(Duration::from_secs(3600)).await;

        let guard = reaper.gate.lock().await;
        let summary = reaper.run_once().await.unwrap();
        assert!(summary.skipped);
        drop(guard);

        let summary = reaper.run_once().await.unwrap();
        assert!(!summary.skipped);
    }
}
