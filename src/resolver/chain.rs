use crate::{
    error::{ErrorList, ResolveError},
    resolver::*,
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Resolver that asks a fixed sequence of resolvers in order and returns the
/// first answer.
///
/// A resolver failing with a retryable error is asked again, up to
/// `max_retries` more times, before the chain moves on. `NoResolution` is a
/// final answer and stops the chain with an empty result.
pub struct ChainResolver {
    resolvers: Vec<Box<dyn Resolver>>,
    max_retries: usize,
}

impl ChainResolver {
    pub fn new(max_retries: usize, resolvers: Vec<Box<dyn Resolver>>) -> Self {
        Self {
            resolvers,
            max_retries,
        }
    }

    async fn resolve_in_sequence(&self, direction: Direction, target: &str) -> LookupResult {
        let key = direction.target_key();
        let mut last_err = None;

        for resolver in &self.resolvers {
            match self.attempt(resolver.as_ref(), direction, target).await {
                Ok(result) => {
                    debug!(
                        resolver = resolver.name(),
                        %direction,
                        target,
                        ?result,
                        "DNS lookup from {}",
                        resolver.name()
                    );
                    return Ok(result);
                }
                Err(ResolveError::NoResolution) => {
                    debug!(resolver = resolver.name(), %direction, target, "No resolution");
                    return Ok(Vec::new());
                }
                Err(err) => {
                    debug!(resolver = resolver.name(), %direction, target, error = %err, "Resolver failed, trying next");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            // Only reachable when the host files are the last line of the chain
            Some(ResolveError::NotInHostFiles) => {
                debug!(key, target, "No matching entry in hostfiles");
                Ok(Vec::new())
            }
            Some(err) => Err(err),
            None => Err(ResolveError::NoResolution),
        }
    }

    async fn attempt(
        &self,
        resolver: &dyn Resolver,
        direction: Direction,
        target: &str,
    ) -> LookupResult {
        let mut retries_left = self.max_retries;
        loop {
            match direction.lookup(resolver, target).await {
                Err(err) if err.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    debug!(
                        resolver = resolver.name(),
                        target,
                        error = %err,
                        retries_left,
                        "Retrying lookup"
                    );
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl Resolver for ChainResolver {
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.resolve_in_sequence(Direction::Forward, hostname).await
    }

    async fn reverse(&self, ip: &str) -> LookupResult {
        self.resolve_in_sequence(Direction::Reverse, ip).await
    }

    fn name(&self) -> &'static str {
        "chain"
    }

    /// Closes every member, even after a failure, and reports all failures.
    fn close(&self) -> Result<(), ResolveError> {
        let mut errors = ErrorList::new();
        for resolver in &self.resolvers {
            if let Err(err) = resolver.close() {
                warn!(resolver = resolver.name(), error = %err, "Failed to close resolver");
                errors.push(err);
            }
        }
        errors.into_result()
    }
}
