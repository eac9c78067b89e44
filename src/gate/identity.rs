//! Caller identity classification.

use std::net::IpAddr;

use axum::http::{HeaderMap, HeaderName};

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::IdentityKey;

/// Value used when no address can be determined for a caller.
const UNKNOWN_ADDRESS: &str = "unknown";

/// Limit tier a caller falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Callers identified only by network address
    Anonymous,
    /// Callers presenting a token
    Credentialed,
}

/// The result of classifying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key: IdentityKey,
    pub tier: Tier,
}

/// Policy mapping an inbound request to an identity and tier.
pub trait IdentityPolicy: Send + Sync {
    /// Classify a request from its headers and the peer address, if known.
    fn classify(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Identity;
}

/// Default policy: prefer a token header, fall back to the caller's address.
///
/// The address is the first entry of the forwarded-for header when present,
/// otherwise the peer address of the connection.
#[derive(Debug, Clone)]
pub struct HeaderIdentityPolicy {
    token_header: HeaderName,
    forwarded_header: HeaderName,
}

impl HeaderIdentityPolicy {
    /// Create a policy reading the given header names.
    pub fn new(token_header: &str, forwarded_header: &str) -> Result<Self> {
        Ok(Self {
            token_header: parse_header_name(token_header)?,
            forwarded_header: parse_header_name(forwarded_header)?,
        })
    }

    fn token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(&self.token_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn forwarded_address<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(&self.forwarded_header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl Default for HeaderIdentityPolicy {
    fn default() -> Self {
        Self {
            token_header: HeaderName::from_static("api_key"),
            forwarded_header: HeaderName::from_static("x-forwarded-for"),
        }
    }
}

impl IdentityPolicy for HeaderIdentityPolicy {
    fn classify(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Identity {
        if let Some(token) = self.token(headers) {
            return Identity {
                key: IdentityKey::token(token),
                tier: Tier::Credentialed,
            };
        }

        let address = match self.forwarded_address(headers) {
            Some(forwarded) => forwarded.to_string(),
            None => peer.map_or_else(|| UNKNOWN_ADDRESS.to_string(), |ip| ip.to_string()),
        };

        Identity {
            key: IdentityKey::ip(address),
            tier: Tier::Anonymous,
        }
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::try_from(name)
        .map_err(|e| GatekeeperError::Config(format!("invalid header name {:?}: {}", name, e)))
}
