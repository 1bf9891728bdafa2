pub mod cache;
pub mod chain;
mod dns;
pub mod hostfile;
pub mod nameserver;
pub mod system;
pub mod timeout;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::ResolveError;
use async_trait::async_trait;
use std::{fmt, net::IpAddr, sync::Arc};

pub use cache::CacheResolver;
pub use chain::ChainResolver;
pub use hostfile::HostFileResolver;
pub use nameserver::NameserverResolver;
pub use system::SystemResolver;
pub use timeout::Timeout;

pub type LookupResult = Result<Vec<String>, ResolveError>;

/// A resolver turns hostnames into addresses and addresses back into
/// hostnames. It may read a local hosts file, ask a remote nameserver, defer
/// to the platform, or wrap other resolvers; callers only see the answer.
///
/// The usual stack is a cache in front of an ordered chain of backends:
///
///  +--------+  lookups  +-------+  misses  +-------+    +-----------+
///  |        |---------->|       |--------->|       |--->| hostfile  |
///  | Caller |           | Cache |          | Chain |--->| nameserver|
///  |        |<----------|       |<---------|       |--->| system    |
///  +--------+  answers  +-------+  answers +-------+    +-----------+
///
/// Cancelling a lookup is done by dropping its future.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Forward lookup: hostname to IP addresses.
    async fn resolve(&self, hostname: &str) -> LookupResult;

    /// Reverse lookup: textual IP address to hostnames.
    async fn reverse(&self, ip: &str) -> LookupResult;

    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;

    /// Releases backend resources. Called once at shutdown.
    fn close(&self) -> Result<(), ResolveError>;
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    #[inline]
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.as_ref().resolve(hostname).await
    }

    #[inline]
    async fn reverse(&self, ip: &str) -> LookupResult {
        self.as_ref().reverse(ip).await
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.as_ref().close()
    }
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Box<R> {
    #[inline]
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.as_ref().resolve(hostname).await
    }

    #[inline]
    async fn reverse(&self, ip: &str) -> LookupResult {
        self.as_ref().reverse(ip).await
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.as_ref().close()
    }
}

/// Which way a lookup goes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Log field name for the query target.
    pub fn target_key(self) -> &'static str {
        match self {
            Direction::Forward => "hostname",
            Direction::Reverse => "ip",
        }
    }

    pub async fn lookup<R: Resolver + ?Sized>(self, resolver: &R, target: &str) -> LookupResult {
        match self {
            Direction::Forward => resolver.resolve(target).await,
            Direction::Reverse => resolver.reverse(target).await,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("resolve"),
            Direction::Reverse => f.write_str("reverse"),
        }
    }
}

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Validates a hostname candidate, returning it without surrounding
/// whitespace or the trailing root dot.
///
/// IP literals are rejected: there is nothing to forward-resolve.
pub fn parse_hostname(input: &str) -> Result<String, ResolveError> {
    let trimmed = input.trim();
    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN || name.parse::<IpAddr>().is_ok() {
        return Err(ResolveError::InvalidHostname);
    }

    let labels_ok = name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    });

    if labels_ok {
        Ok(name.to_owned())
    } else {
        Err(ResolveError::InvalidHostname)
    }
}

/// Validates an IP literal, returning its canonical text form.
pub fn parse_ip(input: &str) -> Result<String, ResolveError> {
    input
        .trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ResolveError::InvalidIp)
}
