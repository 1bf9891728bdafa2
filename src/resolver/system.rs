use crate::{
    error::ResolveError,
    resolver::{dns::DnsBackend, LookupResult, Resolver},
};
use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolveHosts, ResolverConfig},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Resolver that follows the platform's DNS configuration
/// (`/etc/resolv.conf` on Unix) and honours the system hosts file.
pub struct SystemResolver {
    backend: DnsBackend,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        let mut builder = match TokioResolver::builder_tokio() {
            Ok(builder) => {
                debug!("Using system DNS configuration");
                builder
            }
            Err(err) => {
                warn!(error = %err, "Failed to read system DNS config, using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
            }
        };

        let opts = builder.options_mut();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = ResolveHosts::Always;

        Self {
            backend: DnsBackend::new("system", builder.build()),
        }
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.backend.resolve(hostname).await
    }

    async fn reverse(&self, ip: &str) -> LookupResult {
        self.backend.reverse(ip).await
    }

    fn name(&self) -> &'static str {
        "system"
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.backend.close();
        Ok(())
    }
}
