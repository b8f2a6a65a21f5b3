//! Configuration management for Carewarden.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `CAREWARDEN__*` environment variables
//! (e.g. `CAREWARDEN__GOVERNANCE__MAINTENANCE__ENABLED=true`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{CarewardenError, Result};
use crate::governance::{KeyStrategy, MaintenanceState, RateLimitRule, RouteRule, DEFAULT_MAX_CONCURRENT};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CAREWARDEN";

/// Main configuration for the Carewarden service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarewardenConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Administrative surface
    #[serde(default)]
    pub admin: AdminConfig,

    /// Request governance
    #[serde(default)]
    pub governance: GovernanceConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `carewarden=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Administrative surface configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for `/admin/*`; the admin routes are not mounted without one
    #[serde(default)]
    pub token: Option<String>,
}

/// Request governance configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Initial maintenance state
    #[serde(default)]
    pub maintenance: MaintenanceState,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Rate limiting can be switched off entirely, e.g. in development
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often stale window counters are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Limit applied to requests matching no route class
    #[serde(default)]
    pub default: DefaultLimitConfig,

    /// Route classes
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRule>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: default_sweep_interval(),
            default: DefaultLimitConfig::default(),
            routes: default_routes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    300
}

/// The fallback limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLimitConfig {
    #[serde(default = "default_limit")]
    pub limit: RateLimitRule,

    #[serde(default = "default_by")]
    pub by: KeyStrategy,
}

impl Default for DefaultLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            by: default_by(),
        }
    }
}

fn default_limit() -> RateLimitRule {
    RateLimitRule {
        max_requests: 200,
        window_seconds: 86400,
    }
}

fn default_by() -> KeyStrategy {
    KeyStrategy::Ip
}

fn default_routes() -> Vec<RouteRule> {
    vec![
        RouteRule {
            name: "auth".to_string(),
            path_prefix: "/api/auth".to_string(),
            methods: Vec::new(),
            limit: RateLimitRule {
                max_requests: 50,
                window_seconds: 3600,
            },
            by: KeyStrategy::Ip,
        },
        RouteRule {
            name: "api".to_string(),
            path_prefix: "/api".to_string(),
            methods: Vec::new(),
            limit: RateLimitRule {
                max_requests: 1000,
                window_seconds: 3600,
            },
            by: KeyStrategy::User,
        },
    ]
}

/// Concurrency limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Ceiling on requests executing at once, across all endpoints
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

impl CarewardenConfig {
    /// Load configuration from an optional YAML file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("governance.maintenance.allowed_addresses")
                .with_list_parse_key("governance.maintenance.bypass_tokens"),
        );

        let config: CarewardenConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path alone.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CarewardenConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CarewardenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.governance.concurrency.max_concurrent == 0 {
            return Err(CarewardenError::Config(
                "governance.concurrency.max_concurrent must be positive".into(),
            ));
        }
        if self.governance.rate_limiting.sweep_interval_secs == 0 {
            return Err(CarewardenError::Config(
                "governance.rate_limiting.sweep_interval_secs must be positive".into(),
            ));
        }
        if matches!(&self.admin.token, Some(token) if token.is_empty()) {
            return Err(CarewardenError::Config("admin.token must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CarewardenConfig::default();

        assert_eq!(config.server.http_addr, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.admin.token.is_none());

        let rl = &config.governance.rate_limiting;
        assert!(rl.enabled);
        assert_eq!(rl.default.limit.to_string(), "200 per day");
        assert_eq!(rl.routes.len(), 2);
        assert_eq!(rl.routes[0].limit.to_string(), "50 per hour");
        assert_eq!(rl.routes[1].by, KeyStrategy::User);

        assert_eq!(config.governance.concurrency.max_concurrent, 50);
        assert!(!config.governance.maintenance.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
server:
  http_addr: 0.0.0.0:8080
logging:
  level: carewarden=debug
  format: json
admin:
  token: s3cret
governance:
  rate_limiting:
    enabled: false
    default:
      limit: 100 per hour
      by: endpoint
    routes:
      - name: login
        path_prefix: /api/auth/login
        methods: [POST]
        limit: 5 per minute
  concurrency:
    max_concurrent: 8
  maintenance:
    enabled: true
    allowed_addresses: [10.0.0.1]
    bypass_tokens: [ops-token]
"#;
        let config = CarewardenConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.admin.token.as_deref(), Some("s3cret"));

        let rl = &config.governance.rate_limiting;
        assert!(!rl.enabled);
        assert_eq!(rl.sweep_interval_secs, 300);
        assert_eq!(rl.default.by, KeyStrategy::Endpoint);
        assert_eq!(rl.routes.len(), 1);
        assert_eq!(rl.routes[0].limit.window_seconds, 60);
        assert_eq!(rl.routes[0].by, KeyStrategy::Ip);

        assert_eq!(config.governance.concurrency.max_concurrent, 8);
        assert!(config.governance.maintenance.enabled);
        assert!(config.governance.maintenance.bypass_tokens.contains("ops-token"));
    }

    #[test]
    fn test_invalid_limit_rejected() {
        let yaml = r#"
governance:
  rate_limiting:
    default:
      limit: lots per hour
"#;
        assert!(CarewardenConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let yaml = r#"
governance:
  concurrency:
    max_concurrent: 0
"#;
        assert!(CarewardenConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = CarewardenConfig::load(None).unwrap();
        assert_eq!(config.governance.rate_limiting.routes.len(), 2);
    }
}
