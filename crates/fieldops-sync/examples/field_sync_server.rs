// File: examples/field_sync_server.rs
// Purpose: Minimal sync server over an in-memory store

use fieldops_sync::{EntitySchema, EntityTypeConfig, SyncConfig, SyncEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    let config = SyncConfig::new(vec![
        EntityTypeConfig {
            name: "gates".into(),
            schema: EntitySchema::new()
                .scalar("name")
                .scalar("state")
                .mergeable_text("notes"),
        },
        EntityTypeConfig {
            name: "inspections".into(),
            schema: EntitySchema::new()
                .scalar("result")
                .mergeable_text("notes")
                .mergeable_list("findings"),
        },
        EntityTypeConfig {
            name: "work_orders".into(),
            schema: EntitySchema::new()
                .scalar("status")
                .scalar("assignee")
                .mergeable_list("checklist"),
        },
    ]);

    let engine = SyncEngine::new(pool, config).await?;
    engine.spawn_reaper();

    let app = axum::Router::new().merge(engine.routes());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("sync server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
