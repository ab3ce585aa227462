// File: fieldops-sync/src/detector.rs
// Purpose: Classify incoming deltas as clean, conflicted or rejected

use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    ConflictRecord, RejectReason, RejectedDelta, SyncDelta, SyncOperation, VersionedRecord,
};
use crate::registry::EntityRegistry;
use crate::scope::CallerScope;

/// A delta whose base etag lost against the current server row.
#[derive(Debug, Clone)]
pub struct DetectedConflict {
    pub delta: SyncDelta,
    pub record: ConflictRecord,
}

/// Partitioned detector output; input order is preserved within each
/// partition.
#[derive(Debug, Default)]
pub struct Detection {
    pub clean: Vec<SyncDelta>,
    pub conflicted: Vec<DetectedConflict>,
    pub rejected: Vec<RejectedDelta>,
}

/// Classifies push batches against current store state. Classification is
/// advisory: the CAS at apply time remains the authority, so a writer that
/// sneaks in between detection and apply still surfaces as a conflict in the
/// same response.
#[derive(Clone)]
pub struct ConflictDetector {
    registry: Arc<EntityRegistry>,
}

impl ConflictDetector {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    pub async fn classify(&self, scope: &CallerScope, deltas: Vec<SyncDelta>) -> Result<Detection> {
        let mut detection = Detection::default();

        for delta in deltas {
            let entry = match self.registry.lookup(&delta.entity_type) {
                Ok(entry) => entry,
                Err(err) => {
                    detection.rejected.push(reject(
                        &delta,
                        RejectReason::UnknownEntityType,
                        err.to_string(),
                    ));
                    continue;
                }
            };

            match delta.operation {
                SyncOperation::Create => {
                    if delta.etag.is_some() {
                        detection.rejected.push(reject(
                            &delta,
                            RejectReason::Validation,
                            "create deltas never carry an etag".to_string(),
                        ));
                        continue;
                    }

                    match entry.store.get_by_id(scope, &delta.entity_id).await? {
                        None => detection.clean.push(delta),
                        // create/create: the existing row is the server side
                        Some(row) => {
                            let record = conflict_record(&delta, &row);
                            detection.conflicted.push(DetectedConflict { delta, record });
                        }
                    }
                }
                SyncOperation::Update | SyncOperation::Delete => {
                    if delta.etag.is_none() {
                        detection.rejected.push(reject(
                            &delta,
                            RejectReason::Validation,
                            format!("{} deltas require an etag", delta.operation),
                        ));
                        continue;
                    }

                    match entry.store.get_by_id(scope, &delta.entity_id).await? {
                        None => detection.rejected.push(reject(
                            &delta,
                            RejectReason::NotFound,
                            format!(
                                "no {} row with id {}",
                                delta.entity_type, delta.entity_id
                            ),
                        )),
                        Some(row) if Some(&row.etag) != delta.etag.as_ref() => {
                            let record = conflict_record(&delta, &row);
                            detection.conflicted.push(DetectedConflict { delta, record });
                        }
                        Some(_) => detection.clean.push(delta),
                    }
                }
            }
        }

        Ok(detection)
    }
}

fn reject(delta: &SyncDelta, reason: RejectReason, details: String) -> RejectedDelta {
    RejectedDelta {
        entity_type: delta.entity_type.clone(),
        entity_id: delta.entity_id.clone(),
        etag: delta.etag.clone(),
        reason,
        details,
    }
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
