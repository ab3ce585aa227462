// File: fieldops-sync/src/audit.rs
// Purpose: Fire-and-forget audit collaborator

use crate::models::{ConflictPolicy, SyncOperation};

/// Events the engine reports: every accepted delta and every resolved
/// conflict.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    DeltaApplied {
        entity_type: String,
        entity_id: String,
        operation: SyncOperation,
        client_id: String,
        etag: String,
        row_version: i64,
    },
    ConflictResolved {
        entity_type: String,
        entity_id: String,
        client_id: String,
        applied_policy: ConflictPolicy,
        etag: String,
    },
}

/// Audit sink collaborator. Implementations must not block: the engine calls
/// `record` inline on the request path and does not await or check the
/// outcome.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::DeltaApplied {
                entity_type,
                entity_id,
                operation,
                client_id,
                etag,
                row_version,
            } => {
                tracing::info!(
                    %entity_type,
                    %entity_id,
                    %operation,
                    %client_id,
                    %etag,
                    row_version,
                    "delta applied"
                );
            }
            AuditEvent::ConflictResolved {
                entity_type,
                entity_id,
                client_id,
                applied_policy,
                etag,
            } => {
                tracing::info!(
                    %entity_type,
                    %entity_id,
                    %client_id,
                    policy = ?applied_policy,
                    %etag,
                    "conflict resolved"
                );
            }
        }
    }
}

/// Discards every event; used in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&self, _event: AuditEvent) {}
}
