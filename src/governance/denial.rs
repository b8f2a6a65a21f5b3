//! Reasons a request can be turned away.

use serde::Serialize;
use thiserror::Error;

/// A governance decision to refuse a request.
///
/// Every variant is recoverable from the caller's side; none of them is a
/// fault of the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// Too many requests for a key within the current window
    #[error("Too many requests. Limit {limit} per {window_seconds} seconds.")]
    RateLimitExceeded {
        limit: u64,
        window_seconds: u64,
        retry_after_secs: u64,
    },

    /// The global in-flight ceiling is reached
    #[error("Server at capacity")]
    TooBusy,

    /// Maintenance mode is on and the caller holds no bypass
    #[error("Service is undergoing maintenance")]
    MaintenanceMode,
}

/// Wire shape of a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenialBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
}

impl Denial {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Denial::TooBusy => "too_busy",
            Denial::MaintenanceMode => "maintenance_mode",
        }
    }

    /// Seconds the caller should wait before retrying, when known.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Denial::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            Denial::TooBusy | Denial::MaintenanceMode => None,
        }
    }

    pub fn body(&self) -> DenialBody {
        let (limit, window_seconds) = match self {
            Denial::RateLimitExceeded {
                limit,
                window_seconds,
                ..
            } => (Some(*limit), Some(*window_seconds)),
            Denial::TooBusy | Denial::MaintenanceMode => (None, None),
        };

        DenialBody {
            error: self.code(),
            message: self.to_string(),
            limit,
            window_seconds,
        }
    }
}
