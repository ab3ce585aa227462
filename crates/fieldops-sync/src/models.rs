// File: fieldops-sync/src/models.rs
// Purpose: Shared data model for deltas, versioned records and conflicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity payloads travel as JSON objects (field name to value).
pub type Payload = Map<String, Value>;

/// Operation carried by a client delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOperation::Create => write!(f, "create"),
            SyncOperation::Update => write!(f, "update"),
            SyncOperation::Delete => write!(f, "delete"),
        }
    }
}

/// Per-row sync lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => SyncStatus::Pending,
            "conflict" => SyncStatus::Conflict,
            _ => SyncStatus::Synced,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proposed change to a single entity, submitted by a client.
/// Ephemeral: consumed by one detector/resolver pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDelta {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    /// Full proposed payload (not a sparse patch)
    #[serde(default)]
    pub data: Payload,
    /// Pre-image etag; absent for create
    #[serde(default)]
    pub etag: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
}

/// Stored shape of every syncable entity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: String,
    pub entity_type: String,
    pub tenant_id: String,
    pub data: Payload,
    /// Opaque version token; changes on every successful write, never reused
    pub etag: String,
    /// Monotonic write counter
    pub row_version: i64,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    /// Tombstone flag; soft-deleted rows stay visible until reaped
    pub is_deleted: bool,
    #[serde(default)]
    pub conflict_data: Option<Value>,
    pub sync_status: SyncStatus,
}

/// A concurrent-edit conflict awaiting (or subject to) resolution.
/// Persists until resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub entity_type: String,
    pub entity_id: String,
    /// Client whose push lost; pull embeds open records for this client
    pub client_id: String,
    /// The client's base etag; absent for create/create conflicts
    pub client_etag: Option<String>,
    pub server_etag: String,
    pub client_data: Payload,
    pub server_data: Payload,
    pub client_timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
}

/// Conflict resolution policy selected by the pushing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Later timestamp wins wholesale; ties resolve to the server side
    #[default]
    LastWriteWins,
    /// Client record wins wholesale
    ClientWins,
    /// Server record wins wholesale
    ServerWins,
    /// No automatic resolution; record persists until explicitly resolved
    Manual,
    /// Merge mergeable fields operation-wise, three-way merge the rest
    OperationalTransform,
}

/// Incremental feed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPullRequest {
    pub client_id: String,
    pub last_sync_timestamp: DateTime<Utc>,
    pub entity_types: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    100
}

/// One server-side change in a pull feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullDelta {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub data: Payload,
    pub etag: String,
    pub row_version: i64,
    pub last_modified_at: DateTime<Utc>,
}

impl PullDelta {
    pub fn from_record(record: &VersionedRecord) -> Self {
        let operation = if record.is_deleted {
            SyncOperation::Delete
        } else if record.row_version == 1 {
            SyncOperation::Create
        } else {
            SyncOperation::Update
        };

        Self {
            entity_type: record.entity_type.clone(),
            entity_id: record.id.clone(),
            operation,
            data: record.data.clone(),
            etag: record.etag.clone(),
            row_version: record.row_version,
            last_modified_at: record.last_modified_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPullResponse {
    /// Ordered by (last_modified_at, id)
    pub deltas: Vec<PullDelta>,
    /// New checkpoint; on truncation, the last emitted row's timestamp
    pub server_timestamp: DateTime<Utc>,
    pub has_more: bool,
    /// Open conflicts for the requesting client on the requested types
    pub conflicts: Vec<ConflictRecord>,
}

/// Client batch of proposed changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPushRequest {
    pub client_id: String,
    pub deltas: Vec<SyncDelta>,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedDelta {
    pub entity_type: String,
    pub entity_id: String,
    /// Fresh etag minted by the accepted write
    pub etag: String,
    pub row_version: i64,
}

/// Reason code attached to a rejected delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Validation,
    NotFound,
    UnknownEntityType,
    /// The client has an unresolved conflict open on this entity
    UnresolvedConflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedDelta {
    pub entity_type: String,
    pub entity_id: String,
    pub etag: Option<String>,
    pub reason: RejectReason,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPushResponse {
    pub accepted_deltas: Vec<AcceptedDelta>,
    pub rejected_deltas: Vec<RejectedDelta>,
    pub conflicts: Vec<ConflictRecord>,
    pub server_timestamp: DateTime<Utc>,
}

/// Explicit resolution of a previously reported conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub entity_type: String,
    pub entity_id: String,
    /// Must still equal the entity's current etag
    pub server_etag: String,
    pub resolved_data: Payload,
    /// Free-form label describing how the client merged; recorded for audit
    #[serde(default)]
    pub merge_strategy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub entity_type: String,
    pub entity_id: String,
    pub etag: String,
    pub row_version: i64,
}
