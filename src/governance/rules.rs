//! Rate limit rules and per-route limit classes.
//!
//! Limits are written the way operators write them in deployment config,
//! e.g. `"50 per hour"` or `"10/minute"`. Each route class pairs a limit with a
//! path prefix and the key strategy it is tracked by; requests that match no
//! class fall under the default rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::key::KeyStrategy;
use crate::error::{CarewardenError, Result};

/// Name of the rule applied when no route class matches.
pub const DEFAULT_RULE_NAME: &str = "default";

/// Time unit for rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn seconds(&self) -> u64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3600,
            TimeUnit::Day => 86400,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = CarewardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(TimeUnit::Second),
            "m" | "min" | "minute" | "minutes" => Ok(TimeUnit::Minute),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hour),
            "d" | "day" | "days" => Ok(TimeUnit::Day),
            other => Err(CarewardenError::Rule(format!("unknown time unit '{}'", other))),
        }
    }
}

/// A request ceiling over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateLimitRule {
    /// Requests allowed per window
    pub max_requests: u64,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub fn new(max_requests: u64, window_seconds: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(CarewardenError::Rule("request ceiling must be positive".into()));
        }
        if window_seconds == 0 {
            return Err(CarewardenError::Rule("window must be at least one second".into()));
        }
        Ok(Self {
            max_requests,
            window_seconds,
        })
    }

    pub fn per(max_requests: u64, unit: TimeUnit) -> Result<Self> {
        Self::new(max_requests, unit.seconds())
    }
}

impl FromStr for RateLimitRule {
    type Err = CarewardenError;

    /// Parse `"N per [M] unit"` or `"N/[M]unit"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CarewardenError::Rule(format!("cannot parse '{}'", s));

        let lowered = s.trim().to_ascii_lowercase();
        let (count, period) = lowered
            .split_once(" per ")
            .or_else(|| lowered.split_once('/'))
            .ok_or_else(invalid)?;

        let max_requests: u64 = count.trim().parse().map_err(|_| invalid())?;

        let period = period.trim();
        let digits = period.chars().take_while(|c| c.is_ascii_digit()).count();
        let multiplier = if digits == 0 {
            1
        } else {
            period[..digits].parse::<u64>().map_err(|_| invalid())?
        };
        let unit: TimeUnit = period[digits..].parse()?;

        let window_seconds = multiplier.checked_mul(unit.seconds()).ok_or_else(invalid)?;
        Self::new(max_requests, window_seconds)
    }
}

impl TryFrom<String> for RateLimitRule {
    type Error = CarewardenError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RateLimitRule> for String {
    fn from(rule: RateLimitRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = [TimeUnit::Day, TimeUnit::Hour, TimeUnit::Minute, TimeUnit::Second]
            .into_iter()
            .find(|u| self.window_seconds % u.seconds() == 0)
            .unwrap_or(TimeUnit::Second);
        let multiple = self.window_seconds / unit.seconds();

        if multiple == 1 {
            write!(f, "{} per {}", self.max_requests, unit.name())
        } else {
            write!(f, "{} per {} {}s", self.max_requests, multiple, unit.name())
        }
    }
}

/// A class of routes sharing one limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Class name; also namespaces the counters of this class
    pub name: String,
    /// Routes whose path starts with this prefix belong to the class
    pub path_prefix: String,
    /// Methods the class applies to; empty means all
    #[serde(default)]
    pub methods: Vec<String>,
    /// The limit itself
    pub limit: RateLimitRule,
    /// What the limit is tracked against
    #[serde(default = "default_strategy")]
    pub by: KeyStrategy,
}

fn default_strategy() -> KeyStrategy {
    KeyStrategy::Ip
}

impl RouteRule {
    fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok = self.methods.is_empty()
            || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method));
        method_ok && prefix_matches(&self.path_prefix, path)
    }
}

/// Segment-aware prefix match: `/api` covers `/api` and `/api/x`, not `/apix`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// The set of route classes plus the fallback rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRules {
    default: RouteRule,
    routes: Vec<RouteRule>,
}

impl RouteRules {
    /// Build a rule set, rejecting duplicate class names and bad prefixes.
    pub fn new(default_limit: RateLimitRule, default_by: KeyStrategy, routes: Vec<RouteRule>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        seen.insert(DEFAULT_RULE_NAME.to_string());

        for route in &routes {
            if !seen.insert(route.name.clone()) {
                return Err(CarewardenError::Rule(format!(
                    "duplicate route class '{}'",
                    route.name
                )));
            }
            if !route.path_prefix.starts_with('/') {
                return Err(CarewardenError::Rule(format!(
                    "path prefix '{}' of class '{}' must start with '/'",
                    route.path_prefix, route.name
                )));
            }
        }

        Ok(Self {
            default: RouteRule {
                name: DEFAULT_RULE_NAME.to_string(),
                path_prefix: "/".to_string(),
                methods: Vec::new(),
                limit: default_limit,
                by: default_by,
            },
            routes,
        })
    }

    /// Find the most specific class for a request.
    ///
    /// The longest matching prefix wins; ties go to the class listed first.
    pub fn resolve(&self, method: &str, path: &str) -> &RouteRule {
        let mut best: Option<&RouteRule> = None;

        for route in &self.routes {
            if !route.matches(method, path) {
                continue;
            }
            match best {
                Some(current) if current.path_prefix.len() >= route.path_prefix.len() => {}
                _ => best = Some(route),
            }
        }

        best.unwrap_or(&self.default)
    }

    pub fn default_rule(&self) -> &RouteRule {
        &self.default
    }

    pub fn routes(&self) -> &[RouteRule] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(s: &str) -> RateLimitRule {
        s.parse().unwrap()
    }

    fn rules() -> RouteRules {
        let yaml = r#"
- name: auth
  path_prefix: /api/auth
  limit: 50 per hour
- name: api
  path_prefix: /api
  limit: 1000 per hour
  by: user
- name: uploads
  path_prefix: /api/uploads
  methods: [POST, put]
  limit: 10/minute
"#;
        let routes: Vec<RouteRule> = serde_yaml::from_str(yaml).unwrap();
        RouteRules::new(rule("200 per day"), KeyStrategy::Ip, routes).unwrap()
    }

    #[test]
    fn test_parse_per_unit() {
        assert_eq!(rule("200 per day"), RateLimitRule::new(200, 86400).unwrap());
        assert_eq!(rule("50 per hour"), RateLimitRule::new(50, 3600).unwrap());
        assert_eq!(rule("5 PER Second"), RateLimitRule::new(5, 1).unwrap());
    }

    #[test]
    fn test_parse_multiples_and_slash() {
        assert_eq!(rule("5 per 30 seconds"), RateLimitRule::new(5, 30).unwrap());
        assert_eq!(rule("10/minute"), RateLimitRule::new(10, 60).unwrap());
        assert_eq!(rule("100/15min"), RateLimitRule::new(100, 900).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("fifty per hour".parse::<RateLimitRule>().is_err());
        assert!("50 per fortnight".parse::<RateLimitRule>().is_err());
        assert!("50 hourly".parse::<RateLimitRule>().is_err());
        assert!("0 per hour".parse::<RateLimitRule>().is_err());
        assert!("5 per 0 seconds".parse::<RateLimitRule>().is_err());
    }

    #[test]
    fn test_display_picks_largest_unit() {
        assert_eq!(rule("200 per day").to_string(), "200 per day");
        assert_eq!(rule("100/15min").to_string(), "100 per 15 minutes");
        assert_eq!(rule("5 per 90 seconds").to_string(), "5 per 90 seconds");
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let rules = rules();

        let auth = rules.resolve("POST", "/api/auth/login");
        assert_eq!(auth.name, "auth");
        assert_eq!(auth.limit.max_requests, 50);
        assert_eq!(auth.by, KeyStrategy::Ip);

        let api = rules.resolve("GET", "/api/clients/7");
        assert_eq!(api.name, "api");
        assert_eq!(api.by, KeyStrategy::User);
    }

    #[test]
    fn test_resolve_respects_methods() {
        let rules = rules();

        assert_eq!(rules.resolve("POST", "/api/uploads/scan").name, "uploads");
        assert_eq!(rules.resolve("PUT", "/api/uploads").name, "uploads");
        assert_eq!(rules.resolve("GET", "/api/uploads/scan").name, "api");
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let rules = rules();

        assert_eq!(rules.resolve("GET", "/health").name, DEFAULT_RULE_NAME);
        assert_eq!(rules.resolve("GET", "/apiary").name, DEFAULT_RULE_NAME);
        assert_eq!(rules.default_rule().limit.window_seconds, 86400);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let route = RouteRule {
            name: "api".into(),
            path_prefix: "/api".into(),
            methods: Vec::new(),
            limit: rule("10 per minute"),
            by: KeyStrategy::Ip,
        };
        let result = RouteRules::new(rule("1 per second"), KeyStrategy::Ip, vec![route.clone(), route]);
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_prefix_rejected() {
        let route = RouteRule {
            name: "api".into(),
            path_prefix: "api".into(),
            methods: Vec::new(),
            limit: rule("10 per minute"),
            by: KeyStrategy::Ip,
        };
        assert!(RouteRules::new(rule("1 per second"), KeyStrategy::Ip, vec![route]).is_err());
    }
}
