//! Attribute-driven DNS enrichment.
//!
//! For each enabled direction the processor picks the first valid candidate
//! attribute, resolves it through the resolver stack and writes the first
//! answer to the configured destination attribute.

use crate::{
    config::{AttributeContext, ConfigError, LookupConfig, ProcessorConfig},
    error::{BuildError, ErrorList, ResolveError},
    resolver::{
        parse_hostname, parse_ip, CacheResolver, ChainResolver, Direction, HostFileResolver,
        NameserverResolver, Resolver, SystemResolver, Timeout,
    },
    telemetry::{AttributeStore, ResourceRecords},
};
use futures::{stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

// Records of one batch resolved at the same time
const MAX_CONCURRENT_LOOKUPS: usize = 64;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create resolver chain: {0}")]
    Build(#[from] BuildError),
}

/// One traversal of a batch: the attribute maps of `context`, each run
/// through `directions` in order.
#[derive(Clone, Debug, PartialEq)]
struct ProcessPass {
    context: AttributeContext,
    directions: Vec<Direction>,
}

pub struct DnsLookupProcessor {
    config: ProcessorConfig,
    resolver: Arc<dyn Resolver>,
    passes: Vec<ProcessPass>,
}

impl DnsLookupProcessor {
    /// Validates `config` and builds the resolver stack it describes.
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorError> {
        config.validate()?;
        let passes = create_process_passes(&config)?;
        let resolver = create_resolver_chain(&config)?;
        Ok(Self::assemble(config, resolver, passes))
    }

    /// Uses `resolver` in place of the stack `config` would build.
    pub fn with_resolver(
        config: ProcessorConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let passes = create_process_passes(&config)?;
        Ok(Self::assemble(config, resolver, passes))
    }

    fn assemble(config: ProcessorConfig, resolver: Arc<dyn Resolver>, passes: Vec<ProcessPass>) -> Self {
        Self {
            config,
            resolver,
            passes,
        }
    }

    /// Enriches every resource and record of `batch` in place.
    ///
    /// All attribute maps are attempted; failures are collected rather than
    /// stopping the batch.
    pub async fn process_batch(&self, batch: &mut [ResourceRecords]) -> Result<(), ErrorList> {
        let mut errors = ErrorList::new();

        for pass in &self.passes {
            let targets: Vec<_> = match pass.context {
                AttributeContext::Resource => batch.iter_mut().map(|rr| &mut rr.resource).collect(),
                AttributeContext::Record => batch
                    .iter_mut()
                    .flat_map(|rr| rr.records.iter_mut())
                    .collect(),
            };

            let results: Vec<_> = stream::iter(targets)
                .map(|attrs| self.run_pass(pass, attrs))
                .buffer_unordered(MAX_CONCURRENT_LOOKUPS)
                .collect()
                .await;

            for result in results {
                if let Err(err) = result {
                    errors.push(err);
                }
            }
        }

        errors.into_list_result()
    }

    /// Runs every lookup configured for `context` against one attribute map.
    pub async fn process<S>(&self, context: AttributeContext, attrs: &mut S) -> Result<(), ResolveError>
    where
        S: AttributeStore + ?Sized,
    {
        let mut errors = ErrorList::new();
        for pass in self.passes.iter().filter(|p| p.context == context) {
            if let Err(err) = self.run_pass(pass, attrs).await {
                errors.push(err);
            }
        }
        errors.into_result()
    }

    async fn run_pass<S>(&self, pass: &ProcessPass, attrs: &mut S) -> Result<(), ResolveError>
    where
        S: AttributeStore + ?Sized,
    {
        let mut errors = ErrorList::new();
        for &direction in &pass.directions {
            if let Err(err) = self.lookup(direction, attrs).await {
                errors.push(err);
            }
        }
        errors.into_result()
    }

    async fn lookup<S>(&self, direction: Direction, attrs: &mut S) -> Result<(), ResolveError>
    where
        S: AttributeStore + ?Sized,
    {
        let (lookup, validate): (&LookupConfig, fn(&str) -> Result<String, ResolveError>) =
            match direction {
                Direction::Forward => (&self.config.resolve, parse_hostname),
                Direction::Reverse => (&self.config.reverse, parse_ip),
            };

        let target = match target_from_attributes(&lookup.attributes, &*attrs, validate) {
            Ok(Some(target)) => target,
            Ok(None) => return Ok(()),
            Err(err) => {
                debug!(%direction, error = %err, "No valid lookup target in attributes");
                return Ok(());
            }
        };

        match direction.lookup(self.resolver.as_ref(), &target).await {
            Ok(values) => {
                if let Some(first) = values.into_iter().next().filter(|v| !v.is_empty()) {
                    debug!(
                        %direction,
                        target = %target,
                        resolved = %first,
                        attribute = %lookup.resolved_attribute,
                        "Resolved"
                    );
                    attrs.put_str(&lookup.resolved_attribute, first);
                }
                Ok(())
            }
            Err(err) if err.is_benign() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Closes the resolver stack.
    pub fn shutdown(&self) -> Result<(), ResolveError> {
        self.resolver.close()
    }
}

/// Builds `cache -> chain(hostfile -> nameserver -> system)`, leaving out
/// whatever is not configured. Without any cache capacity the chain is used
/// directly.
pub fn create_resolver_chain(config: &ProcessorConfig) -> Result<Arc<dyn Resolver>, BuildError> {
    let timeout = config.timeout();
    let mut resolvers: Vec<Box<dyn Resolver>> = Vec::new();

    if !config.hostfiles.is_empty() {
        resolvers.push(Box::new(HostFileResolver::new(&config.hostfiles)?));
    }

    if !config.nameservers.is_empty() {
        let nameserver = NameserverResolver::new(&config.nameservers, timeout)?;
        resolvers.push(Box::new(Timeout::new(nameserver, timeout)));
    }

    if config.enable_system_resolver {
        resolvers.push(Box::new(Timeout::new(SystemResolver::new(timeout), timeout)));
    }

    if resolvers.is_empty() {
        return Err(BuildError::NoResolvers);
    }

    let order: Vec<&'static str> = resolvers.iter().map(|r| r.name()).collect();
    let chain = ChainResolver::new(config.max_retries(), resolvers);

    let (hit_capacity, miss_capacity) = (config.hit_cache_capacity(), config.miss_cache_capacity());
    info!(
        resolvers = ?order,
        max_retries = config.max_retries(),
        hit_capacity,
        miss_capacity,
        "Created resolver chain"
    );

    if hit_capacity > 0 || miss_capacity > 0 {
        Ok(Arc::new(CacheResolver::new(
            chain,
            hit_capacity,
            config.hit_cache_ttl(),
            miss_capacity,
            config.miss_cache_ttl(),
        )))
    } else {
        Ok(Arc::new(chain))
    }
}

fn create_process_passes(config: &ProcessorConfig) -> Result<Vec<ProcessPass>, ConfigError> {
    let mut passes: Vec<ProcessPass> = Vec::new();

    for (direction, lookup) in [
        (Direction::Forward, &config.resolve),
        (Direction::Reverse, &config.reverse),
    ] {
        if !lookup.enabled {
            continue;
        }
        let context = lookup
            .attribute_context()
            .map_err(|source| ConfigError::Lookup { direction, source })?;

        // Both directions on the same attribute maps share one pass
        match passes.iter_mut().find(|p| p.context == context) {
            Some(pass) => pass.directions.push(direction),
            None => passes.push(ProcessPass {
                context,
                directions: vec![direction],
            }),
        }
    }

    Ok(passes)
}

/// Returns the first attribute value that passes `validate`.
///
/// Missing attributes are ignored. If candidates were present but none was
/// valid, the last validation error is returned; if none was present at all,
/// `Ok(None)`.
fn target_from_attributes<S>(
    attributes: &[String],
    attrs: &S,
    validate: fn(&str) -> Result<String, ResolveError>,
) -> Result<Option<String>, ResolveError>
where
    S: AttributeStore + ?Sized,
{
    let mut last_err = None;

    for name in attributes {
        let Some(value) = attrs.get(name) else {
            continue;
        };
        // Non-string values validate as the empty string, which never passes
        match validate(value.as_str().unwrap_or_default()) {
            Ok(target) => return Ok(Some(target)),
            Err(err) => last_err = Some(err),
        }
    }

    last_err.map_or(Ok(None), Err)
}
