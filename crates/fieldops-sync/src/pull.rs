// File: fieldops-sync/src/pull.rs
// Purpose: Incremental change feed service

use chrono::Utc;
use std::sync::Arc;

use crate::conflicts::ConflictLog;
use crate::error::{Result, SyncError};
use crate::models::{PullDelta, SyncPullRequest, SyncPullResponse};
use crate::registry::EntityRegistry;
use crate::scope::CallerScope;

/// Serves incremental change feeds. Stateless per request; the only shared
/// state is the backing store.
#[derive(Clone)]
pub struct PullService {
    registry: Arc<EntityRegistry>,
    conflicts: ConflictLog,
    max_batch_size: i64,
}

impl PullService {
    pub fn new(registry: Arc<EntityRegistry>, conflicts: ConflictLog, max_batch_size: i64) -> Self {
        Self {
            registry,
            conflicts,
            max_batch_size,
        }
    }

    /// Fetch all rows changed since the client's checkpoint, tombstones
    /// included, merged across the requested types and ordered by
    /// (last_modified_at, id). Tombstones purged before the client ever saw
    /// them are gone from the feed; such a client must full-resync.
    pub async fn pull(
        &self,
        scope: &CallerScope,
        request: &SyncPullRequest,
    ) -> Result<SyncPullResponse> {
        self.validate(request)?;

        let batch_size = request.batch_size as usize;
        let mut rows = Vec::new();

        for entity_type in &request.entity_types {
            let entry = self.registry.lookup(entity_type)?;
            // one extra row per type to detect truncation after the merge
            let mut batch = entry
                .store
                .list_changed_since(scope, request.last_sync_timestamp, request.batch_size + 1, 0)
                .await?;
            rows.append(&mut batch);
        }

        rows.sort_by(|a, b| {
            a.last_modified_at
                .cmp(&b.last_modified_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let has_more = rows.len() > batch_size;
        rows.truncate(batch_size);

        let deltas: Vec<PullDelta> = rows.iter().map(PullDelta::from_record).collect();

        // On truncation the checkpoint stops at the last emitted row so the
        // next pull resumes without skipping anything.
        let server_timestamp = if has_more {
            deltas
                .last()
                .map(|d| d.last_modified_at)
                .unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        let conflicts = self
            .conflicts
            .open_for_client(scope, &request.client_id, &request.entity_types)
            .await?;

        if !conflicts.is_empty() {
            tracing::debug!(
                client_id = %request.client_id,
                count = conflicts.len(),
                "pull carries open conflicts"
            );
        }

        Ok(SyncPullResponse {
            deltas,
            server_timestamp,
            has_more,
            conflicts,
        })
    }

    fn validate(&self, request: &SyncPullRequest) -> Result<()> {
        if request.client_id.trim().is_empty() {
            return Err(SyncError::validation("client_id must not be empty"));
        }
        if request.entity_types.is_empty() {
            return Err(SyncError::validation("entity_types must not be empty"));
        }
        if request.batch_size < 1 || request.batch_size > self.max_batch_size {
            return Err(SyncError::validation(format!(
                "batch_size must be between 1 and {}",
                self.max_batch_size
            )));
        }
        Ok(())
    }
}
