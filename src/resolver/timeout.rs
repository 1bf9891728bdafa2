use crate::{error::ResolveError, resolver::*};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Resolver that abandons lookups taking longer than `timeout`, reporting a
/// retryable [`ResolveError::Timeout`].
pub struct Timeout<R> {
    inner: R,
    timeout: Duration,
}

impl<R> Timeout<R> {
    pub fn new(resolver: R, timeout: Duration) -> Self {
        Self {
            inner: resolver,
            timeout,
        }
    }
}

impl<R: Resolver> Timeout<R> {
    async fn bounded(&self, direction: Direction, target: &str) -> LookupResult {
        match tokio::time::timeout(self.timeout, direction.lookup(&self.inner, target)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!(
                    resolver = self.inner.name(),
                    target,
                    timeout = ?self.timeout,
                    "Lookup deadline elapsed"
                );
                Err(ResolveError::Timeout {
                    resolver: self.inner.name(),
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<R: Resolver> Resolver for Timeout<R> {
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.bounded(Direction::Forward, hostname).await
    }

    async fn reverse(&self, ip: &str) -> LookupResult {
        self.bounded(Direction::Reverse, ip).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::testing::{ok, StubResolver};

    struct NeverResolve;

    #[async_trait]
    impl Resolver for NeverResolve {
        async fn resolve(&self, _hostname: &str) -> LookupResult {
            loop {
                tokio::time::sleep(Duration::MAX).await;
            }
        }

        async fn reverse(&self, ip: &str) -> LookupResult {
            self.resolve(ip).await
        }

        fn name(&self) -> &'static str {
            "never"
        }

        fn close(&self) -> Result<(), ResolveError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookups_time_out() {
        let resolver = Timeout::new(NeverResolve, Duration::from_millis(500));

        let err = resolver.resolve("example.com").await.unwrap_err();

        assert!(err.is_retryable());
        match err {
            ResolveError::Timeout { resolver, after } => {
                assert_eq!(resolver, "never");
                assert_eq!(after, Duration::from_millis(500));
            }
            other => panic!("Expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fast_lookups_pass_through() {
        let resolver = Timeout::new(
            StubResolver::new("stub", ok(&["example.com"])),
            Duration::from_secs(1),
        );

        assert_eq!(resolver.reverse("10.0.0.1").await.unwrap(), vec!["example.com"]);
        assert_eq!(resolver.name(), "stub");
    }
}
