//! Axum middleware running requests through the [`Governor`].

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::governance::{Denial, Governor, Identity, RequestDescriptor, BYPASS_HEADER};

impl Denial {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Denial::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Denial::TooBusy | Denial::MaintenanceMode => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.body())).into_response();
        if let Some(secs) = self.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Extract what the governance layer needs from an HTTP request.
pub fn describe(request: &Request) -> RequestDescriptor {
    let extensions = request.extensions();

    RequestDescriptor {
        source_address: extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
        identity: extensions.get::<Identity>().cloned(),
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        bypass_token: request
            .headers()
            .get(BYPASS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Admit the request or answer with the denial.
///
/// The request's in-flight slot is held until the inner service has produced
/// its response, including when the inner future unwinds.
pub async fn governance_middleware(
    State(governor): State<Arc<Governor>>,
    request: Request,
    next: Next,
) -> Response {
    let descriptor = describe(&request);

    let admission = match governor.admit(&descriptor) {
        Ok(admission) => admission,
        Err(denial) => {
            match &denial {
                Denial::MaintenanceMode => info!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    "Request refused during maintenance"
                ),
                _ => warn!(
                    method = %descriptor.method,
                    path = %descriptor.path,
                    address = descriptor.source_address.as_deref().unwrap_or("unknown"),
                    reason = denial.code(),
                    "Request refused"
                ),
            }
            return denial.into_response();
        }
    };

    let response = next.run(request).await;
    drop(admission);
    response
}
