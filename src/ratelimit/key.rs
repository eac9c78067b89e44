//! Identity key generation and handling.

use std::fmt;

/// The class of caller identity a key was derived from.
///
/// Each class has its own namespace prefix so that, for example, a token
/// whose value happens to look like an IP address never shares a counter
/// with that address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityClass {
    /// A caller-supplied credential
    Token,
    /// A network address
    Ip,
}

impl IdentityClass {
    /// Namespace prefix used in the counter key.
    pub fn prefix(&self) -> &'static str {
        match self {
            IdentityClass::Token => "token",
            IdentityClass::Ip => "ip",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "token" => Some(IdentityClass::Token),
            "ip" => Some(IdentityClass::Ip),
            _ => None,
        }
    }
}

/// A key that uniquely identifies a rate-limited subject in the shared store.
///
/// Rendered as `"<class>:<value>"`, e.g. `token:abc123` or `ip:10.0.0.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    /// Which identity class the value belongs to
    pub class: IdentityClass,
    /// The raw identity value (token or address)
    pub value: String,
}

impl IdentityKey {
    /// Create a new identity key.
    pub fn new(class: IdentityClass, value: impl Into<String>) -> Self {
        Self {
            class,
            value: value.into(),
        }
    }

    /// Key for a caller-supplied token.
    pub fn token(value: impl Into<String>) -> Self {
        Self::new(IdentityClass::Token, value)
    }

    /// Key for a network address.
    pub fn ip(value: impl Into<String>) -> Self {
        Self::new(IdentityClass::Ip, value)
    }

    /// Convert the identity key to the string used in the counter store.
    pub fn to_store_key(&self) -> String {
        format!("{}:{}", self.class.prefix(), self.value)
    }

    /// Parse a store key back into an identity key.
    ///
    /// Only the first `:` separates the class, so IPv6 addresses and tokens
    /// containing colons round-trip intact.
    pub fn parse(key: &str) -> Option<Self> {
        let (prefix, value) = key.split_once(':')?;
        let class = IdentityClass::from_prefix(prefix)?;
        Some(Self::new(class, value))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
