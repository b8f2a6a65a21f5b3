//! Administrative endpoints: maintenance toggle and governance status.
//!
//! These routes sit outside the governance layer so operators can always
//! reach them, and are guarded by a bearer token instead.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::governance::Governor;

#[derive(Clone)]
struct AdminState {
    governor: Arc<Governor>,
    token: Arc<str>,
}

/// Body of `PUT /admin/maintenance`.
///
/// Omitted lists are left unchanged; an empty list clears.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub allowed_addresses: Option<Vec<String>>,
    #[serde(default)]
    pub bypass_tokens: Option<Vec<String>>,
}

/// Maintenance state as reported; tokens themselves are never echoed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceStatus {
    pub enabled: bool,
    pub allowed_addresses: usize,
    pub bypass_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyStatus {
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub endpoints: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteClassStatus {
    pub name: String,
    pub path_prefix: String,
    pub limit: String,
    pub by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingStatus {
    pub enabled: bool,
    pub tracked_keys: usize,
    pub default_limit: String,
    pub routes: Vec<RouteClassStatus>,
}

/// Body of `GET /admin/governance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceStatus {
    pub maintenance: MaintenanceStatus,
    pub concurrency: ConcurrencyStatus,
    pub rate_limiting: RateLimitingStatus,
    pub timestamp: String,
}

fn maintenance_status(governor: &Governor) -> MaintenanceStatus {
    let state = governor.maintenance().state();
    MaintenanceStatus {
        enabled: state.enabled,
        allowed_addresses: state.allowed_addresses.len(),
        bypass_tokens: state.bypass_tokens.len(),
    }
}

async fn set_maintenance(
    State(state): State<AdminState>,
    Json(update): Json<MaintenanceUpdate>,
) -> Json<MaintenanceStatus> {
    state.governor.maintenance().set_mode(
        update.enabled,
        update.allowed_addresses,
        update.bypass_tokens,
    );
    Json(maintenance_status(&state.governor))
}

async fn governance_status(State(state): State<AdminState>) -> Json<GovernanceStatus> {
    let governor = &state.governor;
    let concurrency = governor.concurrency();
    let rules = governor.rules();

    Json(GovernanceStatus {
        maintenance: maintenance_status(governor),
        concurrency: ConcurrencyStatus {
            max_concurrent: concurrency.max_concurrent(),
            in_flight: concurrency.total_in_flight(),
            endpoints: concurrency.snapshot(),
        },
        rate_limiting: RateLimitingStatus {
            enabled: governor.rate_limiting_enabled(),
            tracked_keys: governor.rate_limiter().counter_count(),
            default_limit: rules.default_rule().limit.to_string(),
            routes: rules
                .routes()
                .iter()
                .map(|r| RouteClassStatus {
                    name: r.name.clone(),
                    path_prefix: r.path_prefix.clone(),
                    limit: r.limit.to_string(),
                    by: r.by.to_string(),
                })
                .collect(),
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn require_admin_token(State(state): State<AdminState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented != Some(state.token.as_ref()) {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "A valid admin token is required"
            })),
        )
            .into_response();
    }

    info!(method = %request.method(), path = %request.uri().path(), "Admin request");
    next.run(request).await
}

/// Admin routes, guarded by `token`.
pub fn admin_router(governor: Arc<Governor>, token: String) -> Router {
    let state = AdminState {
        governor,
        token: Arc::from(token),
    };

    Router::new()
        .route("/admin/maintenance", put(set_maintenance))
        .route("/admin/governance", get(governance_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_token))
        .with_state(state)
}
