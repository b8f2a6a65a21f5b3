//! Maintenance mode gate.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use super::denial::Denial;

/// Header carrying a maintenance bypass token (`X-Bypass-Maintenance`).
pub const BYPASS_HEADER: &str = "x-bypass-maintenance";

/// Maintenance flag and the callers allowed through while it is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceState {
    /// Whether maintenance mode is on
    #[serde(default)]
    pub enabled: bool,
    /// Source addresses let through during maintenance
    #[serde(default)]
    pub allowed_addresses: HashSet<String>,
    /// Tokens that let a request through during maintenance
    #[serde(default)]
    pub bypass_tokens: HashSet<String>,
}

/// Turns away requests while maintenance mode is on, unless the caller is on
/// the allow-list or presents a bypass token.
#[derive(Debug, Default)]
pub struct MaintenanceGate {
    state: RwLock<MaintenanceState>,
}

impl MaintenanceGate {
    pub fn new(state: MaintenanceState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Decide whether a request from `source_address` carrying
    /// `bypass_token` may proceed.
    ///
    /// A missing token never matches, even if an empty token is configured.
    pub fn check(&self, source_address: Option<&str>, bypass_token: Option<&str>) -> Result<(), Denial> {
        let state = self.state.read();
        if !state.enabled {
            return Ok(());
        }

        let address_allowed = source_address.is_some_and(|addr| state.allowed_addresses.contains(addr));
        let token_allowed = bypass_token.is_some_and(|token| state.bypass_tokens.contains(token));

        if address_allowed || token_allowed {
            debug!(
                address = source_address.unwrap_or("unknown"),
                by_token = token_allowed,
                "Maintenance bypass granted"
            );
            return Ok(());
        }

        Err(Denial::MaintenanceMode)
    }

    /// Switch maintenance mode.
    ///
    /// `enabled` is always applied. The address and token lists are replaced
    /// only when given; `None` leaves the current list as it is.
    pub fn set_mode(
        &self,
        enabled: bool,
        allowed_addresses: Option<Vec<String>>,
        bypass_tokens: Option<Vec<String>>,
    ) {
        let mut state = self.state.write();
        state.enabled = enabled;
        if let Some(addresses) = allowed_addresses {
            state.allowed_addresses = addresses.into_iter().collect();
        }
        if let Some(tokens) = bypass_tokens {
            state.bypass_tokens = tokens.into_iter().collect();
        }

        info!(
            enabled = state.enabled,
            allowed_addresses = state.allowed_addresses.len(),
            bypass_tokens = state.bypass_tokens.len(),
            "Maintenance mode updated"
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.state.read().enabled
    }

    /// Copy of the current state.
    pub fn state(&self) -> MaintenanceState {
        self.state.read().clone()
    }
}
