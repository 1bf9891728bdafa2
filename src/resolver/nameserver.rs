use crate::{
    error::{BuildError, ResolveError},
    resolver::{dns::DnsBackend, LookupResult, Resolver},
};
use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfig, ResolveHosts, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::xfer::Protocol,
    Resolver as HickoryResolver,
};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use tracing::info;

const DEFAULT_DNS_PORT: u16 = 53;

/// Resolver that queries an explicit list of nameservers.
///
/// Retries are left to the chain, so each call makes a single attempt, and
/// hickory's own cache and hosts-file lookup are disabled.
pub struct NameserverResolver {
    backend: DnsBackend,
}

impl NameserverResolver {
    pub fn new<S: AsRef<str>>(nameservers: &[S], timeout: Duration) -> Result<Self, BuildError> {
        let mut config = ResolverConfig::new();
        for nameserver in nameservers {
            let addr = parse_nameserver(nameserver.as_ref())?;
            config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
            config.add_name_server(NameServerConfig::new(addr, Protocol::Tcp));
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = ResolveHosts::Never;

        let resolver =
            HickoryResolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        info!(
            nameservers = ?nameservers.iter().map(|s| s.as_ref()).collect::<Vec<&str>>(),
            ?timeout,
            "Created nameserver resolver"
        );

        Ok(Self {
            backend: DnsBackend::new("nameserver", resolver),
        })
    }
}

/// Accepts `ip`, `ip:port` and `[ipv6]:port`; the port defaults to 53.
fn parse_nameserver(address: &str) -> Result<SocketAddr, BuildError> {
    let address = address.trim();
    address
        .parse::<SocketAddr>()
        .or_else(|_| {
            address
                .parse::<IpAddr>()
                .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
        })
        .map_err(|_| BuildError::NameserverAddress(address.to_owned()))
}

#[async_trait]
impl Resolver for NameserverResolver {
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.backend.resolve(hostname).await
    }

    async fn reverse(&self, ip: &str) -> LookupResult {
        self.backend.reverse(ip).await
    }

    fn name(&self) -> &'static str {
        "nameserver"
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.backend.close();
        Ok(())
    }
}
