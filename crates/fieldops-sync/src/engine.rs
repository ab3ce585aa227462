// File: fieldops-sync/src/engine.rs
// Purpose: Sync engine assembly and configuration

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::api::{self, ApiState};
use crate::audit::{AuditSink, TracingAudit};
use crate::conflicts::ConflictLog;
use crate::pull::PullService;
use crate::push::PushService;
use crate::reaper::TombstoneReaper;
use crate::registry::{EntityRegistry, EntitySchema};
use crate::store::SqliteEntityStore;
use crate::versions::VersionLog;

/// One entity type to sync, with its payload schema.
pub struct EntityTypeConfig {
    pub name: String,
    pub schema: EntitySchema,
}

/// Configuration for the sync engine.
pub struct SyncConfig {
    /// Entity types to register with the bundled SQLite store
    pub entities: Vec<EntityTypeConfig>,

    /// Upper bound a pull request may ask for in one page
    pub max_batch_size: i64,

    /// How long tombstones (and version-log rows) are retained before the
    /// reaper physically purges them
    pub tombstone_retention: Duration,

    /// Cadence of the background reaper task
    pub reaper_interval: Duration,
}

impl SyncConfig {
    pub fn new(entities: Vec<EntityTypeConfig>) -> Self {
        Self {
            entities,
            max_batch_size: 500,
            tombstone_retention: Duration::from_secs(30 * 24 * 3600),
            reaper_interval: Duration::from_secs(3600),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Main sync engine: wires the registry, services and background reaper
/// around one database pool.
pub struct SyncEngine {
    registry: Arc<EntityRegistry>,
    state: Arc<ApiState>,
    versions: VersionLog,
    tombstone_retention: Duration,
    reaper_interval: Duration,
}

impl SyncEngine {
    /// Create an engine whose entity types are all served by the bundled
    /// SQLite store.
    pub async fn new(pool: SqlitePool, config: SyncConfig) -> anyhow::Result<Self> {
        let mut registry = EntityRegistry::new();
        for entity in &config.entities {
            registry.register(
                entity.name.clone(),
                Arc::new(SqliteEntityStore::new(pool.clone(), entity.name.clone())),
                entity.schema.clone(),
            );
        }

        Self::with_registry(pool, registry, config).await
    }

    /// Create an engine over a caller-built registry (custom `EntityStore`
    /// implementations included). The pool still backs the conflict and
    /// version logs.
    pub async fn with_registry(
        pool: SqlitePool,
        registry: EntityRegistry,
        config: SyncConfig,
    ) -> anyhow::Result<Self> {
        SqliteEntityStore::init_tables(&pool).await?;
        ConflictLog::init_tables(&pool).await?;
        VersionLog::init_tables(&pool).await?;

        let registry = Arc::new(registry);
        let conflicts = ConflictLog::new(pool.clone());
        let versions = VersionLog::new(pool);
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAudit);

        let state = Arc::new(ApiState {
            pull: PullService::new(registry.clone(), conflicts.clone(), config.max_batch_size),
            push: PushService::new(
                registry.clone(),
                conflicts,
                versions.clone(),
                audit,
            ),
        });

        tracing::info!(
            entity_types = registry.len(),
            "sync engine ready"
        );

        Ok(Self {
            registry,
            state,
            versions,
            tombstone_retention: config.tombstone_retention,
            reaper_interval: config.reaper_interval,
        })
    }

    /// Axum routes for the sync API.
    pub fn routes(&self) -> Router {
        api::routes(self.state.clone())
    }

    /// The pull service, for embedding without HTTP.
    pub fn pull(&self) -> &PullService {
        &self.state.pull
    }

    /// The push service, for embedding without HTTP.
    pub fn push(&self) -> &PushService {
        &self.state.push
    }

    /// Build the tombstone reaper for this engine.
    pub fn reaper(&self) -> Arc<TombstoneReaper> {
        Arc::new(TombstoneReaper::new(
            self.registry.clone(),
            self.versions.clone(),
            self.tombstone_retention,
            self.reaper_interval,
        ))
    }

    /// Spawn the background reaper task.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        self.reaper().spawn()
    }
}
