// File: fieldops-sync/src/scope.rs
// Purpose: Caller identity and tenant scope threaded through every store call

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tenant header set by the authenticating proxy in front of the engine.
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Actor header identifying the authenticated user or device.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Identity and tenant scope of the caller. All entities are tenant-scoped;
/// the scope is resolved once at the boundary and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerScope {
    pub tenant_id: String,
    pub actor: String,
}

impl CallerScope {
    pub fn new(tenant_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor: actor.into(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerScope
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let tenant_id = header(TENANT_HEADER).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("missing {TENANT_HEADER} header"),
                    "reason": "validation",
                })),
            )
        })?;

        let actor = header(ACTOR_HEADER).unwrap_or_else(|| "anonymous".to_string());

        Ok(CallerScope { tenant_id, actor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[tokio::test]
    async fn scope_extracted_from_headers() {
        let request = Request::builder()
            .uri("/api/sync/pull")
            .header(TENANT_HEADER, "org-1")
            .header(ACTOR_HEADER, "inspector-9")
            .body(Body::empty())
            .unwrap();

        let (mut parts, _) = request.into_parts();
        let scope = CallerScope::from_request_parts(&mut parts, &())
            .await
            .expect("extract scope");

        assert_eq!(scope, CallerScope::new("org-1", "inspector-9"));
    }

    #[tokio::test]
    async fn missing_tenant_header_is_rejected() {
        let request = Request::builder()
            .uri("/api/sync/pull")
            .body(Body::empty())
            .unwrap();

        let (mut parts, _) = request.into_parts();
        let err = CallerScope::from_request_parts(&mut parts, &())
            .await
            .expect_err("tenant header is required");

        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn actor_defaults_when_absent() {
        let request = Request::builder()
            .uri("/api/sync/pull")
            .header(TENANT_HEADER, "org-1")
            .body(Body::empty())
            .unwrap();

        let (mut parts, _) = request.into_parts();
        let scope = CallerScope::from_request_parts(&mut parts, &())
            .await
            .expect("extract scope");

        assert_eq!(scope.actor, "anonymous");
    }
}
