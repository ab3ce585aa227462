// File: fieldops-sync/src/lib.rs
// Purpose: Main entry point for the fieldops-sync library

//! # fieldops-sync
//!
//! Delta-based offline synchronization for field-operations data.
//!
//! Disconnected field clients accumulate local edits and later reconcile
//! them with the central store: pushes apply through atomic compare-and-swap
//! writes, concurrent-edit conflicts are detected and resolved (including
//! operational-transform merges of flagged text and list fields), deletions
//! propagate as tombstones, and transient network failures retry with
//! bounded backoff.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fieldops_sync::{EntitySchema, EntityTypeConfig, SyncConfig, SyncEngine};
//!
//! // 1. Describe the entity types that sync
//! let config = SyncConfig::new(vec![
//!     EntityTypeConfig {
//!         name: "gates".into(),
//!         schema: EntitySchema::new().scalar("state").mergeable_text("notes"),
//!     },
//!     EntityTypeConfig {
//!         name: "work_orders".into(),
//!         schema: EntitySchema::new()
//!             .scalar("status")
//!             .mergeable_list("checklist"),
//!     },
//! ]);
//!
//! // 2. Initialize the engine
//! let engine = SyncEngine::new(pool, config).await?;
//! engine.spawn_reaper();
//!
//! // 3. Add routes to your Axum app
//! let app = Router::new().merge(engine.routes());
//! ```

pub mod api;
pub mod audit;
pub mod conflicts;
pub mod detector;
pub mod engine;
pub mod error;
pub mod models;
pub mod ot;
pub mod pull;
pub mod push;
pub mod reaper;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod scope;
pub mod store;
pub mod versions;

// Re-export main types
pub use audit::{AuditEvent, AuditSink, NoopAudit, TracingAudit};
pub use conflicts::ConflictLog;
pub use detector::{ConflictDetector, Detection};
pub use engine::{EntityTypeConfig, SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use models::{
    AcceptedDelta, ConflictPolicy, ConflictRecord, ConflictResolution, Payload, PullDelta,
    RejectReason, RejectedDelta, ResolutionOutcome, SyncDelta, SyncOperation, SyncPullRequest,
    SyncPullResponse, SyncPushRequest, SyncPushResponse, SyncStatus, VersionedRecord,
};
pub use pull::PullService;
pub use push::PushService;
pub use reaper::{ReapSummary, TombstoneReaper};
pub use registry::{EntityRegistry, EntitySchema, FieldKind};
pub use resolver::{ConflictResolver, Resolution, Resolved, Winner};
pub use retry::{retry, RetryPolicy};
pub use scope::CallerScope;
pub use store::{ConditionalWrite, EntityStore, SqliteEntityStore};
pub use versions::VersionLog;

/// Version of the sync protocol
pub const SYNC_PROTOCOL_VERSION: &str = "1.0.0";
