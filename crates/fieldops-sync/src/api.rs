// File: fieldops-sync/src/api.rs
// Purpose: HTTP API endpoints for sync operations

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{
    ConflictResolution, ResolutionOutcome, SyncPullRequest, SyncPullResponse, SyncPushRequest,
    SyncPushResponse,
};
use crate::pull::PullService;
use crate::push::PushService;
use crate::scope::CallerScope;

/// Shared handler state.
pub struct ApiState {
    pub pull: PullService,
    pub push: PushService,
}

/// Error envelope carried by non-2xx responses. Business outcomes map to
/// 4xx; callers branch on `reason`.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict { .. } | SyncError::StaleResolution { .. } => StatusCode::CONFLICT,
            SyncError::Transient(_) | SyncError::RetryExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "sync request failed");
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "reason": self.0.reason_code(),
        }));
        (status, body).into_response()
    }
}

/// Per-item outcome in a batch response; an item's failure never aborts its
/// siblings.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome<T> {
    Ok { response: T },
    Error { reason: String, error: String },
}

impl<T> BatchOutcome<T> {
    fn from_result(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(response) => BatchOutcome::Ok { response },
            Err(err) => BatchOutcome::Error {
                reason: err.reason_code().to_string(),
                error: err.to_string(),
            },
        }
    }
}

/// Sync API routes.
pub fn routes(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/sync/pull", post(pull_handler))
        .route("/api/sync/push", post(push_handler))
        .route("/api/sync/resolve", post(resolve_handler))
        .route("/api/sync/pull/batch", post(pull_batch_handler))
        .route("/api/sync/push/batch", post(push_batch_handler))
        .route("/api/sync/resolve/batch", post(resolve_batch_handler))
        .with_state(state)
}

/// POST /api/sync/pull
async fn pull_handler(
    State(state): State<Arc<ApiState>>,
    scope: CallerScope,
    Json(request): Json<SyncPullRequest>,
) -> Result<Json<SyncPullResponse>, ApiError> {
    let response = state.pull.pull(&scope, &request).await?;
    Ok(Json(response))
}

/// POST /api/sync/push
async fn push_handler(
    State(state): State<Arc<ApiState>>,
    scope: CallerScope,
    Json(request): Json<SyncPushRequest>,
) -> Result<Json<SyncPushResponse>, ApiError> {
    let response = state.push.push(&scope, &request).await?;
    Ok(Json(response))
}

/// POST /api/sync/resolve
async fn resolve_handler(
    State(state): State<Arc<ApiState>>,
    scope: CallerScope,
    Json(request): Json<ConflictResolution>,
) -> Result<Json<ResolutionOutcome>, ApiError> {
    let outcome = state.push.resolve(&scope, &request).await?;
    Ok(Json(outcome))
}

/// POST /api/sync/pull/batch
async fn pull_batch_handler(
    State(state): State<Arc<ApiState>>,
    scope: CallerScope,
    Json(requests): Json<Vec<SyncPullRequest>>,
) -> Json<Vec<BatchOutcome<SyncPullResponse>>> {
    let mut outcomes = Vec::with_capacity(requests.len());
    for request in &requests {
        outcomes.push(BatchOutcome::from_result(
            state.pull.pull(&scope, request).await,
        ));
    }
    Json(outcomes)
}

/// POST /api/sync/push/batch
async fn push_batch_handler(
    State(state): State<Arc<ApiState>>,
    scope: CallerScope,
    Json(requests): Json<Vec<SyncPushRequest>>,
) -> Json<Vec<BatchOutcome<SyncPushResponse>>> {
    let mut outcomes = Vec::with_capacity(requests.len());
    for request in &requests {
        outcomes.push(BatchOutcome::from_result(
            state.push.push(&scope, request).await,
        ));
    }
    Json(outcomes)
}

/// POST /api/sync/resolve/batch
async fn resolve_batch_handler(
    State(state): State<Arc<ApiState>>,
    scope: CallerScope,
    Json(requests): Json<Vec<ConflictResolution>>,
) -> Json<Vec<BatchOutcome<ResolutionOutcome>>> {
    let mut outcomes = Vec::with_capacity(requests.len());
    for request in &requests {
        outcomes.push(BatchOutcome::from_result(
            state.push.resolve(&scope, request).await,
        ));
    }
    Json(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EntityTypeConfig, SyncConfig, SyncEngine};
    use crate::registry::EntitySchema;
    use crate::scope::TENANT_HEADER;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let config = SyncConfig::new(vec![EntityTypeConfig {
            name: "gates".into(),
            schema: EntitySchema::new().scalar("state"),
        }]);

        let engine = SyncEngine::new(pool, config).await.unwrap();
        engine.routes()
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(TENANT_HEADER, "org-1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn push_then_pull_over_http() {
        let app = test_app().await;

        let push = serde_json::json!({
            "client_id": "tablet-7",
            "conflict_policy": "last_write_wins",
            "deltas": [{
                "entity_type": "gates",
                "entity_id": "g-1",
                "operation": "create",
                "data": {"state": "open"},
                "timestamp": "2026-03-10T12:00:00Z",
                "client_id": "tablet-7"
            }]
        });

        let response = app
            .clone()
            .oneshot(json_request("/api/sync/push", push))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: SyncPushResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.accepted_deltas.len(), 1);

        let pull = serde_json::json!({
            "client_id": "tablet-7",
            "last_sync_timestamp": "2026-03-10T00:00:00Z",
            "entity_types": ["gates"],
            "batch_size": 50
        });

        let response = app
            .oneshot(json_request("/api/sync/pull", pull))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: SyncPullResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.deltas.len(), 1);
        assert_eq!(parsed.deltas[0].entity_id, "g-1");
    }

    #[tokio::test]
    async fn missing_tenant_header_is_a_bad_request() {
        let app = test_app().await;

        let pull = serde_json::json!({
            "client_id": "tablet-7",
            "last_sync_timestamp": "2026-03-10T00:00:00Z",
            "entity_types": ["gates"],
            "batch_size": 50
        });

        let request = Request::builder()
            .method("POST")
            .uri("/api/sync/pull")
            .header("content-type", "application/json")
            .body(Body::from(pull.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn batch_pull_continues_past_item_failures() {
        let app = test_app().await;

        let batch = serde_json::json!([
            {
                "client_id": "tablet-7",
                "last_sync_timestamp": "2026-03-10T00:00:00Z",
                "entity_types": ["turnstiles"],
                "batch_size": 50
            },
            {
                "client_id": "tablet-7",
                "last_sync_timestamp": "2026-03-10T00:00:00Z",
                "entity_types": ["gates"],
                "batch_size": 50
            }
        ]);

        let response = app
            .oneshot(json_request("/api/sync/pull/batch", batch))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let items = parsed.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["status"], "error");
        assert_eq!(items[0]["reason"], "not_found");
        assert_eq!(items[1]["status"], "ok");
    }
}
