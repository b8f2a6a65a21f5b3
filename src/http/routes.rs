//! Router assembly.

use axum::{middleware, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

use super::admin::admin_router;
use super::middleware::governance_middleware;
use crate::governance::Governor;

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Wrap `api` and the health endpoint in the governance layer, and mount the
/// admin routes beside them when an admin token is configured.
pub fn router(governor: Arc<Governor>, api: Router, admin_token: Option<String>) -> Router {
    let governed = api
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(governor.clone(), governance_middleware));

    match admin_token {
        Some(token) => governed.merge(admin_router(governor, token)),
        None => governed,
    }
}
