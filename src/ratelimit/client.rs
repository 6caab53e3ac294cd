//! Client identifier extraction and handling.

use std::fmt;
use std::net::SocketAddr;

/// Header carrying the originating client address behind proxies.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Bucket key shared by all clients whose address could not be resolved.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// A key that identifies the client a request is accounted to.
///
/// The value is opaque: it is neither validated nor normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap an arbitrary key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The shared bucket for unresolved clients.
    pub fn unknown() -> Self {
        Self(UNKNOWN_CLIENT.to_string())
    }

    /// Resolve the client from a forwarded-for header value and the peer address.
    ///
    /// A present, non-empty header wins and yields its first comma-separated
    /// entry exactly as written. Otherwise the peer IP is used. Returns `None`
    /// when neither is available.
    pub fn resolve(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> Option<Self> {
        if let Some(first) = forwarded_for
            .filter(|value| !value.is_empty())
            .and_then(|value| value.split(',').next())
        {
            return Some(Self::new(first));
        }

        peer.map(|addr| Self(addr.ip().to_string()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
