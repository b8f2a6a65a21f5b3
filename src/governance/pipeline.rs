//! The governance pipeline: maintenance, then concurrency, then rate limit.

use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::concurrency::{ConcurrencyLimiter, ConcurrencyPermit};
use super::denial::Denial;
use super::key::{derive_key, RequestDescriptor};
use super::limiter::RateLimiter;
use super::maintenance::MaintenanceGate;
use super::rules::RouteRules;
use crate::config::GovernanceConfig;
use crate::error::Result;

/// Owns the governance state of one process and decides on each request.
///
/// Construct one at startup and share it by `Arc` with the request path.
pub struct Governor {
    maintenance: MaintenanceGate,
    concurrency: Arc<ConcurrencyLimiter>,
    rate_limiter: Arc<RateLimiter>,
    rules: RouteRules,
    rate_limiting_enabled: bool,
}

/// Proof that a request was let through.
///
/// Holds the request's in-flight slot; drop it once the handler is done.
#[derive(Debug)]
pub struct Admission {
    _permit: ConcurrencyPermit,
    rule: Option<String>,
}

impl Admission {
    /// Route class the request was counted under, if rate limiting is on.
    pub fn rule(&self) -> Option<&str> {
        self.rule.as_deref()
    }
}

impl Governor {
    pub fn new(config: &GovernanceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a governor whose rate limiter reads time from `clock`.
    pub fn with_clock(config: &GovernanceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let rl = &config.rate_limiting;
        let rules = RouteRules::new(rl.default.limit, rl.default.by, rl.routes.clone())?;

        Ok(Self {
            maintenance: MaintenanceGate::new(config.maintenance.clone()),
            concurrency: Arc::new(ConcurrencyLimiter::new(config.concurrency.max_concurrent)),
            rate_limiter: Arc::new(RateLimiter::with_clock(clock)),
            rules,
            rate_limiting_enabled: rl.enabled,
        })
    }

    /// Run a request through every stage, stopping at the first denial.
    ///
    /// A rate limit denial gives back the in-flight slot taken just before it.
    pub fn admit(&self, request: &RequestDescriptor) -> std::result::Result<Admission, Denial> {
        let endpoint = request.endpoint_id();
        trace!(endpoint = %endpoint, "Evaluating request");

        self.maintenance
            .check(request.source_address.as_deref(), request.bypass_token.as_deref())?;

        let permit = self.concurrency.try_acquire(&endpoint)?;

        let rule = if self.rate_limiting_enabled {
            let rule = self.rules.resolve(&request.method, &request.path);
            let key = format!("{}|{}", rule.name, derive_key(rule.by, request));
            self.rate_limiter
                .check(&key, rule.limit.max_requests, rule.limit.window_seconds)?;
            Some(rule.name.clone())
        } else {
            None
        };

        debug!(endpoint = %endpoint, rule = ?rule, "Request admitted");
        Ok(Admission {
            _permit: permit,
            rule,
        })
    }

    pub fn maintenance(&self) -> &MaintenanceGate {
        &self.maintenance
    }

    pub fn concurrency(&self) -> &Arc<ConcurrencyLimiter> {
        &self.concurrency
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn rules(&self) -> &RouteRules {
        &self.rules
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limiting_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::clock::ManualClock;
    use crate::governance::key::Identity;
    use crate::governance::rules::RateLimitRule;
    use std::time::Duration;

    fn config(max_concurrent: usize) -> GovernanceConfig {
        let mut config = GovernanceConfig::default();
        config.concurrency.max_concurrent = max_concurrent;
        config.rate_limiting.routes[0].limit = RateLimitRule::new(2, 10).unwrap();
        config
    }

    fn login(addr: &str) -> RequestDescriptor {
        RequestDescriptor::new("POST", "/api/auth/login").with_source_address(addr)
    }

    #[test]
    fn test_admission_reports_rule() {
        let governor = Governor::new(&config(50)).unwrap();

        let admission = governor.admit(&login("10.0.0.1")).unwrap();
        assert_eq!(admission.rule(), Some("auth"));
        assert_eq!(governor.concurrency().total_in_flight(), 1);

        drop(admission);
        assert_eq!(governor.concurrency().total_in_flight(), 0);
    }

    #[test]
    fn test_rate_limit_denial_releases_slot() {
        let clock = Arc::new(ManualClock::new());
        let governor = Governor::with_clock(&config(50), clock.clone()).unwrap();

        governor.admit(&login("10.0.0.1")).unwrap();
        governor.admit(&login("10.0.0.1")).unwrap();
        let denial = governor.admit(&login("10.0.0.1")).unwrap_err();

        assert_eq!(denial.code(), "rate_limit_exceeded");
        assert_eq!(governor.concurrency().total_in_flight(), 0);
        assert!(governor.admit(&login("10.0.0.2")).is_ok());

        clock.advance(Duration::from_secs(11));
        assert!(governor.admit(&login("10.0.0.1")).is_ok());
    }

    #[test]
    fn test_route_classes_count_separately() {
        let governor = Governor::new(&config(50)).unwrap();

        governor.admit(&login("10.0.0.1")).unwrap();
        governor.admit(&login("10.0.0.1")).unwrap();

        let health = RequestDescriptor::new("GET", "/health").with_source_address("10.0.0.1");
        let admission = governor.admit(&health).unwrap();
        assert_eq!(admission.rule(), Some("default"));
        assert_eq!(governor.rate_limiter().counter_value("default|10.0.0.1"), Some(1));
        assert_eq!(governor.rate_limiter().counter_value("auth|10.0.0.1"), Some(2));
    }

    #[test]
    fn test_user_class_keys_by_identity() {
        let governor = Governor::new(&config(50)).unwrap();

        let request = RequestDescriptor::new("GET", "/api/clients")
            .with_source_address("10.0.0.1")
            .with_identity(Identity::new("17"));
        governor.admit(&request).unwrap();

        let anonymous = RequestDescriptor::new("GET", "/api/clients");
        governor.admit(&anonymous).unwrap();

        assert_eq!(governor.rate_limiter().counter_value("api|17"), Some(1));
        assert_eq!(governor.rate_limiter().counter_value("api|GET:/api/clients"), Some(1));
    }

    #[test]
    fn test_busy_before_rate_limit() {
        let governor = Governor::new(&config(1)).unwrap();

        let _held = governor.admit(&login("10.0.0.1")).unwrap();
        let denial = governor.admit(&login("10.0.0.2")).unwrap_err();

        assert_eq!(denial, Denial::TooBusy);
        assert_eq!(governor.rate_limiter().counter_value("auth|10.0.0.2"), None);
    }

    #[test]
    fn test_maintenance_takes_precedence() {
        let governor = Governor::new(&config(1)).unwrap();
        governor
            .maintenance()
            .set_mode(true, Some(vec!["10.0.0.1".into()]), Some(vec!["ops".into()]));

        let _held = governor.admit(&login("10.0.0.1")).unwrap();

        // Would be refused as too busy, but maintenance answers first.
        let denial = governor.admit(&login("203.0.113.5")).unwrap_err();
        assert_eq!(denial, Denial::MaintenanceMode);
        assert_eq!(governor.rate_limiter().counter_value("auth|203.0.113.5"), None);

        let with_token = login("203.0.113.5").with_bypass_token("ops");
        assert_eq!(governor.admit(&with_token).unwrap_err(), Denial::TooBusy);
    }

    #[test]
    fn test_rate_limiting_disabled() {
        let mut config = config(50);
        config.rate_limiting.enabled = false;
        let governor = Governor::new(&config).unwrap();

        for _ in 0..10 {
            let admission = governor.admit(&login("10.0.0.1")).unwrap();
            assert_eq!(admission.rule(), None);
        }
        assert_eq!(governor.rate_limiter().counter_count(), 0);
    }
}
