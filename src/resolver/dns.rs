//! Lookups against a hickory-dns resolver, shared by the nameserver and
//! system backends. Only the way the underlying resolver is configured
//! differs between the two.

use crate::{error::ResolveError, resolver::LookupResult};
use hickory_resolver::{
    proto::{op::ResponseCode, ProtoErrorKind},
    TokioResolver,
};
use parking_lot::RwLock;
use std::net::IpAddr;
use tracing::{debug, trace};

pub(super) struct DnsBackend {
    name: &'static str,
    resolver: RwLock<Option<TokioResolver>>,
}

impl DnsBackend {
    pub(super) fn new(name: &'static str, resolver: TokioResolver) -> Self {
        Self {
            name,
            resolver: RwLock::new(Some(resolver)),
        }
    }

    // Cloning the handle is cheap and keeps the lock out of the await
    fn handle(&self) -> Result<TokioResolver, ResolveError> {
        self.resolver
            .read()
            .clone()
            .ok_or(ResolveError::Closed {
                resolver: self.name,
            })
    }

    pub(super) async fn resolve(&self, hostname: &str) -> LookupResult {
        let resolver = self.handle()?;

        let lookup = resolver
            .lookup_ip(hostname)
            .await
            .map_err(|err| classify(self.name, err))?;

        let addresses: Vec<String> = lookup.iter().map(|ip| ip.to_string()).collect();
        trace!(resolver = self.name, hostname, ?addresses, "Forward lookup answered");

        if addresses.is_empty() {
            Err(ResolveError::NoResolution)
        } else {
            Ok(addresses)
        }
    }

    pub(super) async fn reverse(&self, ip: &str) -> LookupResult {
        let addr: IpAddr = ip.parse().map_err(|_| ResolveError::InvalidIp)?;
        let resolver = self.handle()?;

        let lookup = resolver
            .reverse_lookup(addr)
            .await
            .map_err(|err| classify(self.name, err))?;

        let hostnames: Vec<String> = lookup
            .iter()
            .map(|ptr| ptr.0.to_utf8().trim_end_matches('.').to_owned())
            .collect();
        trace!(resolver = self.name, ip, ?hostnames, "Reverse lookup answered");

        if hostnames.is_empty() {
            Err(ResolveError::NoResolution)
        } else {
            Ok(hostnames)
        }
    }

    /// Drops the resolver and its connection pool. Later lookups fail.
    pub(super) fn close(&self) {
        if self.resolver.write().take().is_some() {
            debug!(resolver = self.name, "Closed resolver");
        }
    }
}

/// Maps a hickory failure onto the lookup taxonomy.
///
/// An empty answer (NOERROR or NXDOMAIN) means the name has no records. A
/// server that answers but refuses to help (SERVFAIL, REFUSED, NOTIMP,
/// FORMERR) is a permanent failure. Everything else, timeouts and
/// transport errors included, stays retryable.
fn classify(resolver: &'static str, err: hickory_resolver::ResolveError) -> ResolveError {
    let response_code = err.proto().and_then(|proto| match proto.kind() {
        ProtoErrorKind::NoRecordsFound { response_code, .. } => Some(*response_code),
        _ => None,
    });

    match response_code {
        Some(ResponseCode::NoError | ResponseCode::NXDomain) => ResolveError::NoResolution,
        Some(
            code @ (ResponseCode::ServFail
            | ResponseCode::Refused
            | ResponseCode::NotImp
            | ResponseCode::FormErr),
        ) => ResolveError::PermanentFailure {
            resolver,
            reason: format!("{code:?}"),
        },
        _ => ResolveError::Nameserver(err),
    }
}
