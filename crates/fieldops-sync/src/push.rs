// File: fieldops-sync/src/push.rs
// Purpose: Accept client delta batches; apply, resolve or record conflicts

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::conflicts::ConflictLog;
use crate::detector::ConflictDetector;
use crate::error::{Result, SyncError};
use crate::models::{
    AcceptedDelta, ConflictPolicy, ConflictRecord, ConflictResolution, RejectReason,
    RejectedDelta, ResolutionOutcome, SyncDelta, SyncOperation, SyncPushRequest, SyncPushResponse,
    SyncStatus, VersionedRecord,
};
use crate::registry::EntityRegistry;
use crate::resolver::{ConflictResolver, Resolved, Winner};
use crate::scope::CallerScope;
use crate::store::ConditionalWrite;
use crate::versions::VersionLog;

/// Outcome of processing one conflicted delta.
enum ConflictOutcome {
    /// Auto-resolution applied; the entity carries a fresh etag
    Accepted(AcceptedDelta),
    /// Auto-resolution kept the server record; the client learns it lost
    ServerKept(ConflictRecord),
    /// Record persisted, awaiting explicit resolution
    Open(ConflictRecord),
    Rejected(RejectedDelta),
}

/// Accepts client batches. Batch application is per-delta atomic: partial
/// success is expected and reported, never rolled back.
#[derive(Clone)]
pub struct PushService {
    registry: Arc<EntityRegistry>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    conflicts: ConflictLog,
    versions: VersionLog,
    audit: Arc<dyn AuditSink>,
}

impl PushService {
    pub fn new(
        registry: Arc<EntityRegistry>,
        conflicts: ConflictLog,
        versions: VersionLog,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            detector: ConflictDetector::new(registry.clone()),
            resolver: ConflictResolver::new(),
            registry,
            conflicts,
            versions,
            audit,
        }
    }

    pub async fn push(
        &self,
        scope: &CallerScope,
        request: &SyncPushRequest,
    ) -> Result<SyncPushResponse> {
        if request.client_id.trim().is_empty() {
            return Err(SyncError::validation("client_id must not be empty"));
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut conflicts = Vec::new();

        let mut admissible = Vec::new();
        for delta in &request.deltas {
            match self.admit(scope, request, delta).await? {
                None => admissible.push(delta.clone()),
                Some(rejection) => rejected.push(rejection),
            }
        }

        let detection = self.detector.classify(scope, admissible).await?;
        rejected.extend(detection.rejected);

        for delta in detection.clean {
            match self.apply_clean(scope, &delta).await? {
                CleanOutcome::Accepted(entry) => accepted.push(entry),
                // a concurrent writer slipped in between detect and apply;
                // the loser learns in this same response
                CleanOutcome::Conflicted(record) => {
                    self.settle_conflict(
                        scope,
                        &delta,
                        record,
                        request.conflict_policy,
                        &mut accepted,
                        &mut rejected,
                        &mut conflicts,
                    )
                    .await?;
                }
                CleanOutcome::Vanished(rejection) => rejected.push(rejection),
            }
        }

        for detected in detection.conflicted {
            self.settle_conflict(
                scope,
                &detected.delta,
                detected.record,
                request.conflict_policy,
                &mut accepted,
                &mut rejected,
                &mut conflicts,
            )
            .await?;
        }

        Ok(SyncPushResponse {
            accepted_deltas: accepted,
            rejected_deltas: rejected,
            conflicts,
            server_timestamp: Utc::now(),
        })
    }

    /// Boundary checks before a delta may reach the detector.
    async fn admit(
        &self,
        scope: &CallerScope,
        request: &SyncPushRequest,
        delta: &SyncDelta,
    ) -> Result<Option<RejectedDelta>> {
        let reject = |reason, details: String| {
            Some(RejectedDelta {
                entity_type: delta.entity_type.clone(),
                entity_id: delta.entity_id.clone(),
                etag: delta.etag.clone(),
                reason,
                details,
            })
        };

        if delta.client_id != request.client_id {
            return Ok(reject(
                RejectReason::Validation,
                "delta client_id does not match the request".to_string(),
            ));
        }
        if delta.entity_id.trim().is_empty() {
            return Ok(reject(
                RejectReason::Validation,
                "entity_id must not be empty".to_string(),
            ));
        }

        let entry = match self.registry.lookup(&delta.entity_type) {
            Ok(entry) => entry,
            Err(err) => return Ok(reject(RejectReason::UnknownEntityType, err.to_string())),
        };

        if let Err(err) = entry.schema.validate(&delta.data) {
            return Ok(reject(RejectReason::Validation, err.to_string()));
        }

        // a client with an open conflict must resolve before pushing again
        if self
            .conflicts
            .has_open(scope, &delta.entity_type, &delta.entity_id, &delta.client_id)
            .await?
        {
            return Ok(reject(
                RejectReason::UnresolvedConflict,
                "resolve the open conflict on this entity first".to_string(),
            ));
        }

        Ok(None)
    }

    async fn apply_clean(&self, scope: &CallerScope, delta: &SyncDelta) -> Result<CleanOutcome> {
        let entry = self.registry.lookup(&delta.entity_type)?;

        let write = ConditionalWrite {
            id: delta.entity_id.clone(),
            expected_etag: delta.etag.clone(),
            data: delta.data.clone(),
            delete: delta.operation == SyncOperation::Delete,
            modified_by: Some(delta.client_id.clone()),
            sync_status: SyncStatus::Synced,
        };

        match entry.store.apply_write(scope, write).await {
            Ok(row) => {
                self.record_version(scope, delta.operation, &row, &delta.client_id)
                    .await?;
                self.audit.record(AuditEvent::DeltaApplied {
                    entity_type: row.entity_type.clone(),
                    entity_id: row.id.clone(),
                    operation: delta.operation,
                    client_id: delta.client_id.clone(),
                    etag: row.etag.clone(),
                    row_version: row.row_version,
                });
                Ok(CleanOutcome::Accepted(AcceptedDelta {
                    entity_type: row.entity_type,
                    entity_id: row.id,
                    etag: row.etag,
                    row_version: row.row_version,
                }))
            }
            Err(SyncError::Conflict { .. }) => {
                match entry.store.get_by_id(scope, &delta.entity_id).await? {
                    Some(row) => Ok(CleanOutcome::Conflicted(conflict_record(delta, &row))),
                    None => Ok(CleanOutcome::Vanished(RejectedDelta {
                        entity_type: delta.entity_type.clone(),
                        entity_id: delta.entity_id.clone(),
                        etag: delta.etag.clone(),
                        reason: RejectReason::NotFound,
                        details: "row disappeared while the batch was applying".to_string(),
                    })),
                }
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle_conflict(
        &self,
        scope: &CallerScope,
        delta: &SyncDelta,
        record: ConflictRecord,
        policy: ConflictPolicy,
        accepted: &mut Vec<AcceptedDelta>,
        rejected: &mut Vec<RejectedDelta>,
        conflicts: &mut Vec<ConflictRecord>,
    ) -> Result<()> {
        match self.resolve_conflict(scope, delta, record, policy).await? {
            ConflictOutcome::Accepted(entry) => accepted.push(entry),
            ConflictOutcome::ServerKept(record) => conflicts.push(record),
            ConflictOutcome::Open(record) => conflicts.push(record),
            ConflictOutcome::Rejected(rejection) => rejected.push(rejection),
        }
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        scope: &CallerScope,
        delta: &SyncDelta,
        record: ConflictRecord,
        policy: ConflictPolicy,
    ) -> Result<ConflictOutcome> {
        let entry = self.registry.lookup(&record.entity_type)?;

        let base = match (&policy, &record.client_etag) {
            (ConflictPolicy::OperationalTransform, Some(etag)) => {
                self.versions
                    .find_by_etag(scope, &record.entity_type, &record.entity_id, etag)
                    .await?
            }
            _ => None,
        };

        let resolved =
            self.resolver
                .resolve(&record, policy, &entry.schema, base.as_ref())?;

        match resolved {
            Resolved::Manual => {
                self.open_conflict(scope, record.clone()).await?;
                Ok(ConflictOutcome::Open(record))
            }
            Resolved::Auto(resolution) => {
                if resolution.winner == Winner::Server {
                    // server record stands; nothing to write
                    self.audit.record(AuditEvent::ConflictResolved {
                        entity_type: record.entity_type.clone(),
                        entity_id: record.entity_id.clone(),
                        client_id: record.client_id.clone(),
                        applied_policy: resolution.applied_policy,
                        etag: record.server_etag.clone(),
                    });
                    return Ok(ConflictOutcome::ServerKept(record));
                }

                let delete =
                    resolution.winner == Winner::Client && delta.operation == SyncOperation::Delete;

                let write = ConditionalWrite {
                    id: record.entity_id.clone(),
                    expected_etag: Some(record.server_etag.clone()),
                    data: resolution.data.clone(),
                    delete,
                    modified_by: Some(record.client_id.clone()),
                    sync_status: SyncStatus::Synced,
                };

                match entry.store.apply_write(scope, write).await {
                    Ok(row) => {
                        self.record_version(scope, delta.operation, &row, &record.client_id)
                            .await?;
                        self.audit.record(AuditEvent::ConflictResolved {
                            entity_type: row.entity_type.clone(),
                            entity_id: row.id.clone(),
                            client_id: record.client_id.clone(),
                            applied_policy: resolution.applied_policy,
                            etag: row.etag.clone(),
                        });
                        Ok(ConflictOutcome::Accepted(AcceptedDelta {
                            entity_type: row.entity_type,
                            entity_id: row.id,
                            etag: row.etag,
                            row_version: row.row_version,
                        }))
                    }
                    Err(SyncError::Conflict { .. }) => {
                        // yet another writer advanced the row; leave the
                        // refreshed record open instead of looping
                        match entry.store.get_by_id(scope, &record.entity_id).await? {
                            Some(row) => {
                                let refreshed = conflict_record(delta, &row);
                                self.open_conflict(scope, refreshed.clone()).await?;
                                Ok(ConflictOutcome::Open(refreshed))
                            }
                            None => Ok(ConflictOutcome::Rejected(RejectedDelta {
                                entity_type: record.entity_type.clone(),
                                entity_id: record.entity_id.clone(),
                                etag: record.client_etag.clone(),
                                reason: RejectReason::NotFound,
                                details: "row disappeared during conflict resolution".to_string(),
                            })),
                        }
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn open_conflict(&self, scope: &CallerScope, record: ConflictRecord) -> Result<()> {
        self.conflicts.record(scope, &record).await?;

        let entry = self.registry.lookup(&record.entity_type)?;
        entry
            .store
            .mark_conflict(
                scope,
                &record.entity_id,
                json!({
                    "client_id": record.client_id,
                    "client_etag": record.client_etag,
                    "client_data": record.client_data,
                    "client_timestamp": record.client_timestamp,
                }),
            )
            .await?;

        tracing::warn!(
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            client_id = %record.client_id,
            "conflict recorded, awaiting resolution"
        );
        Ok(())
    }

    /// Explicit resolution of a previously reported conflict.
    pub async fn resolve(
        &self,
        scope: &CallerScope,
        resolution: &ConflictResolution,
    ) -> Result<ResolutionOutcome> {
        let entry = self.registry.lookup(&resolution.entity_type)?;
        entry.schema.validate(&resolution.resolved_data)?;

        let open = self
            .conflicts
            .get(scope, &resolution.entity_type, &resolution.entity_id)
            .await?
            .ok_or_else(|| {
                SyncError::not_found(format!(
                    "no open conflict on {}/{}",
                    resolution.entity_type, resolution.entity_id
                ))
            })?;

        let current = entry
            .store
            .get_by_id(scope, &resolution.entity_id)
            .await?
            .ok_or_else(|| {
                SyncError::not_found(format!(
                    "no {} row with id {}",
                    resolution.entity_type, resolution.entity_id
                ))
            })?;

        // the presented etag must still be current: no intervening write
        // since the conflict was raised
        if current.etag != resolution.server_etag {
            return Err(SyncError::StaleResolution {
                presented: resolution.server_etag.clone(),
            });
        }

        let write = ConditionalWrite {
            id: resolution.entity_id.clone(),
            expected_etag: Some(resolution.server_etag.clone()),
            data: resolution.resolved_data.clone(),
            delete: false,
            modified_by: Some(scope.actor.clone()),
            sync_status: SyncStatus::Synced,
        };

        let row = match entry.store.apply_write(scope, write).await {
            Ok(row) => row,
            // lost a race with another writer between the check and the CAS
            Err(SyncError::Conflict { .. }) => {
                return Err(SyncError::StaleResolution {
                    presented: resolution.server_etag.clone(),
                })
            }
            Err(err) => return Err(err),
        };

        self.conflicts
            .clear(scope, &resolution.entity_type, &resolution.entity_id)
            .await?;
        self.record_version(scope, SyncOperation::Update, &row, &open.client_id)
            .await?;

        self.audit.record(AuditEvent::ConflictResolved {
            entity_type: row.entity_type.clone(),
            entity_id: row.id.clone(),
            client_id: open.client_id,
            applied_policy: ConflictPolicy::Manual,
            etag: row.etag.clone(),
        });
        if let Some(strategy) = &resolution.merge_strategy {
            tracing::debug!(merge_strategy = %strategy, "manual resolution applied");
        }

        Ok(ResolutionOutcome {
            entity_type: row.entity_type,
            entity_id: row.id,
            etag: row.etag,
            row_version: row.row_version,
        })
    }

    async fn record_version(
        &self,
        scope: &CallerScope,
        operation: SyncOperation,
        row: &VersionedRecord,
        client_id: &str,
    ) -> Result<()> {
        self.versions
            .record(
                scope,
                &row.entity_type,
                &row.id,
                operation,
                &row.etag,
                &row.data,
                Some(client_id),
            )
            .await
    }
}

enum CleanOutcome {
    Accepted(AcceptedDelta),
    Conflicted(ConflictRecord),
    Vanished(RejectedDelta),
}

fn conflict_record(delta: &SyncDelta, row: &VersionedRecord) -> ConflictRecord {
    ConflictRecord {
        entity_type: delta.entity_type.clone(),
        entity_id: delta.entity_id.clone(),
        client_id: delta.client_id.clone(),
        client_etag: delta.etag.clone(),
        server_etag: row.etag.clone(),
        client_data: delta.data.clone(),
        server_data: row.data.clone(),
        client_timestamp: delta.timestamp,
        server_timestamp: row.last_modified_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAudit;
    use crate::registry::EntitySchema;
    use crate::store::{EntityStore, SqliteEntityStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn fixture() -> (PushService, CallerScope) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteEntityStore::init_tables(&pool).await.unwrap();
        ConflictLog::init_tables(&pool).await.unwrap();
        VersionLog::init_tables(&pool).await.unwrap();

        let store: Arc<dyn EntityStore> =
            Arc::new(SqliteEntityStore::new(pool.clone(), "gates"));
        let mut registry = EntityRegistry::new();
        registry.register(
            "gates",
            store,
            EntitySchema::new().scalar("state").mergeable_text("notes"),
        );

        let service = PushService::new(
            Arc::new(registry),
            ConflictLog::new(pool.clone()),
            VersionLog::new(pool),
            Arc::new(NoopAudit),
        );

        (service, CallerScope::new("org-1", "tester"))
    }

    fn delta(
        entity_id: &str,
        operation: SyncOperation,
        etag: Option<&str>,
        data: serde_json::Value,
    ) -> SyncDelta {
        SyncDelta {
            entity_type: "gates".into(),
            entity_id: entity_id.into(),
            operation,
            data: data.as_object().cloned().unwrap(),
            etag: etag.map(str::to_string),
            timestamp: Utc::now(),
            client_id: "tablet-7".into(),
        }
    }

    fn request(deltas: Vec<SyncDelta>, policy: ConflictPolicy) -> SyncPushRequest {
        SyncPushRequest {
            client_id: "tablet-7".into(),
            deltas,
            conflict_policy: policy,
        }
    }

    #[tokio::test]
    async fn create_then_update_round_trips() {
        let (service, scope) = fixture().await;

        let response = service
            .push(
                &scope,
                &request(
                    vec![delta("g-1", SyncOperation::Create, None, json!({"state": "open"}))],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        assert_eq!(response.accepted_deltas.len(), 1);
        let etag = response.accepted_deltas[0].etag.clone();

        let response = service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Update,
                        Some(&etag),
                        json!({"state": "closed"}),
                    )],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        assert_eq!(response.accepted_deltas.len(), 1);
        assert_eq!(response.accepted_deltas[0].row_version, 2);
        assert_ne!(response.accepted_deltas[0].etag, etag);
    }

    #[tokio::test]
    async fn replaying_an_applied_delta_is_a_conflict_not_a_double_apply() {
        let (service, scope) = fixture().await;

        let created = service
            .push(
                &scope,
                &request(
                    vec![delta("g-1", SyncOperation::Create, None, json!({"state": "open"}))],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        let etag = created.accepted_deltas[0].etag.clone();

        let update = delta(
            "g-1",
            SyncOperation::Update,
            Some(&etag),
            json!({"state": "closed"}),
        );
        let first = service
            .push(&scope, &request(vec![update.clone()], ConflictPolicy::Manual))
            .await
            .unwrap();
        assert_eq!(first.accepted_deltas[0].row_version, 2);

        // the retry of an already-applied delta fails the CAS and opens a
        // conflict; row_version does not advance
        let replay = service
            .push(&scope, &request(vec![update], ConflictPolicy::Manual))
            .await
            .unwrap();
        assert!(replay.accepted_deltas.is_empty());
        assert_eq!(replay.conflicts.len(), 1);
        assert_eq!(replay.conflicts[0].client_etag.as_deref(), Some(etag.as_str()));
    }

    #[tokio::test]
    async fn schema_violations_are_rejected_at_the_boundary() {
        let (service, scope) = fixture().await;

        let response = service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Create,
                        None,
                        json!({"voltage": 7}),
                    )],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();

        assert_eq!(response.rejected_deltas.len(), 1);
        assert_eq!(response.rejected_deltas[0].reason, RejectReason::Validation);
    }

    #[tokio::test]
    async fn batch_failures_never_abort_siblings() {
        let (service, scope) = fixture().await;

        let response = service
            .push(
                &scope,
                &request(
                    vec![
                        delta("g-1", SyncOperation::Update, Some("stale"), json!({"state": "x"})),
                        delta("g-2", SyncOperation::Create, None, json!({"state": "open"})),
                    ],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();

        // the first delta is rejected (missing row), the second still lands
        assert_eq!(response.rejected_deltas.len(), 1);
        assert_eq!(response.accepted_deltas.len(), 1);
        assert_eq!(response.accepted_deltas[0].entity_id, "g-2");
    }

    #[tokio::test]
    async fn manual_policy_gates_further_pushes_until_resolved() {
        let (service, scope) = fixture().await;

        let created = service
            .push(
                &scope,
                &request(
                    vec![delta("g-1", SyncOperation::Create, None, json!({"state": "open"}))],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        let etag = created.accepted_deltas[0].etag.clone();

        // conflicting push with a bogus base etag
        let lost = service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Update,
                        Some("stale"),
                        json!({"state": "closed"}),
                    )],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        assert_eq!(lost.conflicts.len(), 1);

        // any further push by this client on the entity is refused
        let gated = service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Update,
                        Some(&etag),
                        json!({"state": "ajar"}),
                    )],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        assert_eq!(gated.rejected_deltas.len(), 1);
        assert_eq!(
            gated.rejected_deltas[0].reason,
            RejectReason::UnresolvedConflict
        );

        // resolving with the current etag closes the record
        let outcome = service
            .resolve(
                &scope,
                &ConflictResolution {
                    entity_type: "gates".into(),
                    entity_id: "g-1".into(),
                    server_etag: etag,
                    resolved_data: json!({"state": "closed"}).as_object().cloned().unwrap(),
                    merge_strategy: Some("took the field copy".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.row_version, 2);

        // and the gate lifts
        let after = service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Update,
                        Some(&outcome.etag),
                        json!({"state": "open"}),
                    )],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        assert_eq!(after.accepted_deltas.len(), 1);
    }

    #[tokio::test]
    async fn stale_manual_resolution_is_refused() {
        let (service, scope) = fixture().await;

        let created = service
            .push(
                &scope,
                &request(
                    vec![delta("g-1", SyncOperation::Create, None, json!({"state": "open"}))],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();
        let old_etag = created.accepted_deltas[0].etag.clone();

        service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Update,
                        Some("stale"),
                        json!({"state": "closed"}),
                    )],
                    ConflictPolicy::Manual,
                ),
            )
            .await
            .unwrap();

        // another writer advances the entity before the resolution arrives
        let advanced = service
            .push(
                &scope,
                &SyncPushRequest {
                    client_id: "tablet-8".into(),
                    deltas: vec![SyncDelta {
                        client_id: "tablet-8".into(),
                        ..delta(
                            "g-1",
                            SyncOperation::Update,
                            Some(&old_etag),
                            json!({"state": "locked"}),
                        )
                    }],
                    conflict_policy: ConflictPolicy::Manual,
                },
            )
            .await
            .unwrap();
        assert_eq!(advanced.accepted_deltas.len(), 1);

        let err = service
            .resolve(
                &scope,
                &ConflictResolution {
                    entity_type: "gates".into(),
                    entity_id: "g-1".into(),
                    server_etag: old_etag,
                    resolved_data: json!({"state": "open"}).as_object().cloned().unwrap(),
                    merge_strategy: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleResolution { .. }));
    }

    #[tokio::test]
    async fn last_write_wins_applies_the_newer_client_record() {
        let (service, scope) = fixture().await;

        let created = service
            .push(
                &scope,
                &request(
                    vec![delta("g-1", SyncOperation::Create, None, json!({"state": "open"}))],
                    ConflictPolicy::LastWriteWins,
                ),
            )
            .await
            .unwrap();
        let etag = created.accepted_deltas[0].etag.clone();

        // stale base, but the client edit is newer than the server row
        let mut newer = delta(
            "g-1",
            SyncOperation::Update,
            Some("stale"),
            json!({"state": "closed"}),
        );
        newer.timestamp = Utc::now() + chrono::Duration::seconds(30);

        let response = service
            .push(&scope, &request(vec![newer], ConflictPolicy::LastWriteWins))
            .await
            .unwrap();

        // auto-resolved in the client's favor: accepted with a fresh etag,
        // no open conflict left behind
        assert_eq!(response.accepted_deltas.len(), 1);
        assert_ne!(response.accepted_deltas[0].etag, etag);
        assert!(response.conflicts.is_empty());

        let gated = service
            .push(
                &scope,
                &request(
                    vec![delta(
                        "g-1",
                        SyncOperation::Update,
                        Some(&response.accepted_deltas[0].etag),
                        json!({"state": "ajar"}),
                    )],
                    ConflictPolicy::LastWriteWins,
                ),
            )
            .await
            .unwrap();
        assert_eq!(gated.accepted_deltas.len(), 1);
    }

    #[tokio::test]
    async fn last_write_wins_keeps_the_newer_server_record() {
        let (service, scope) = fixture().await;

        service
            .push(
                &scope,
                &request(
                    vec![delta("g-1", SyncOperation::Create, None, json!({"state": "open"}))],
                    ConflictPolicy::LastWriteWins,
                ),
            )
            .await
            .unwrap();

        // stale base and an older client edit
        let mut older = delta(
            "g-1",
            SyncOperation::Update,
            Some("stale"),
            json!({"state": "closed"}),
        );
        older.timestamp = Utc::now() - chrono::Duration::hours(1);

        let response = service
            .push(&scope, &request(vec![older], ConflictPolicy::LastWriteWins))
            .await
            .unwrap();

        // the server side won: reported as a conflict, nothing applied,
        // nothing left open
        assert!(response.accepted_deltas.is_empty());
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(
            response.conflicts[0].server_data,
            json!({"state": "open"}).as_object().cloned().unwrap()
        );
    }
}
