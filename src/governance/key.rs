//! Request descriptors and rate limit key derivation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key used when the source address of a request cannot be determined.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Authenticated identity attached to a request by the auth layer.
///
/// The governance layer never authenticates anything itself; it only reads
/// this value from the request extensions when keying limits by user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Unique identifier of the authenticated principal
    pub id: String,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// What a rate limit is tracked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// Source address of the request
    Ip,
    /// Authenticated identity, falling back to the endpoint
    User,
    /// Method and path of the request
    Endpoint,
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(KeyStrategy::Ip),
            "user" => Ok(KeyStrategy::User),
            "endpoint" => Ok(KeyStrategy::Endpoint),
            other => Err(format!("unknown key strategy '{}'", other)),
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyStrategy::Ip => "ip",
            KeyStrategy::User => "user",
            KeyStrategy::Endpoint => "endpoint",
        };
        f.write_str(name)
    }
}

/// The parts of an inbound request the governance layer looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Source address, if the transport exposed one
    pub source_address: Option<String>,
    /// Authenticated identity, if any
    pub identity: Option<Identity>,
    /// Request method, e.g. `GET`
    pub method: String,
    /// Request path without query string
    pub path: String,
    /// Value of the `X-Bypass-Maintenance` header
    pub bypass_token: Option<String>,
}

impl RequestDescriptor {
    /// Create a descriptor for a method and path with no other context.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source_address: None,
            identity: None,
            method: method.into(),
            path: path.into(),
            bypass_token: None,
        }
    }

    pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_bypass_token(mut self, token: impl Into<String>) -> Self {
        self.bypass_token = Some(token.into());
        self
    }

    /// The `"{METHOD}:{PATH}"` identifier of the endpoint this request targets.
    pub fn endpoint_id(&self) -> String {
        endpoint_id(&self.method, &self.path)
    }
}

/// Build the `"{METHOD}:{PATH}"` identifier for an endpoint.
pub fn endpoint_id(method: &str, path: &str) -> String {
    format!("{}:{}", method, path)
}

/// Derive the rate limit key for a request. Never returns an empty string.
pub fn derive_key(strategy: KeyStrategy, request: &RequestDescriptor) -> String {
    match strategy {
        KeyStrategy::Ip => match request.source_address.as_deref() {
            Some(addr) if !addr.is_empty() => addr.to_string(),
            _ => UNKNOWN_ADDRESS.to_string(),
        },
        KeyStrategy::User => match &request.identity {
            Some(identity) => identity.id.clone(),
            None => request.endpoint_id(),
        },
        KeyStrategy::Endpoint => request.endpoint_id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestDescriptor {
        RequestDescriptor::new("POST", "/api/clients")
    }

    #[test]
    fn test_ip_key_uses_source_address() {
        let req = request().with_source_address("10.0.0.7");
        assert_eq!(derive_key(KeyStrategy::Ip, &req), "10.0.0.7");
    }

    #[test]
    fn test_ip_key_without_address_is_unknown() {
        assert_eq!(derive_key(KeyStrategy::Ip, &request()), "unknown");

        let req = request().with_source_address("");
        assert_eq!(derive_key(KeyStrategy::Ip, &req), "unknown");
    }

    #[test]
    fn test_user_key_uses_identity() {
        let req = request()
            .with_source_address("10.0.0.7")
            .with_identity(Identity::new("42"));
        assert_eq!(derive_key(KeyStrategy::User, &req), "42");
    }

    #[test]
    fn test_user_key_falls_back_to_endpoint() {
        let req = request().with_source_address("10.0.0.7");
        assert_eq!(derive_key(KeyStrategy::User, &req), "POST:/api/clients");
    }

    #[test]
    fn test_endpoint_key() {
        assert_eq!(derive_key(KeyStrategy::Endpoint, &request()), "POST:/api/clients");
        assert_eq!(endpoint_id("GET", "/api/visits"), "GET:/api/visits");
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("ip".parse::<KeyStrategy>().unwrap(), KeyStrategy::Ip);
        assert_eq!(" User ".parse::<KeyStrategy>().unwrap(), KeyStrategy::User);
        assert_eq!("endpoint".parse::<KeyStrategy>().unwrap(), KeyStrategy::Endpoint);
        assert!("session".parse::<KeyStrategy>().is_err());
        assert_eq!(KeyStrategy::User.to_string(), "user");
    }
}
