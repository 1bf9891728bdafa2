//! Scripted resolver used by the decorator and processor tests.

use crate::{
    error::ResolveError,
    resolver::{LookupResult, Resolver},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Outcome the stub produces; a closure so errors can be minted per call.
pub(crate) type Outcome = Arc<dyn Fn() -> LookupResult + Send + Sync>;

pub(crate) fn ok(values: &[&str]) -> Outcome {
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    Arc::new(move || Ok(values.clone()))
}

pub(crate) fn err(make: fn() -> ResolveError) -> Outcome {
    Arc::new(move || Err(make()))
}

pub(crate) fn transient() -> ResolveError {
    ResolveError::Other("connection refused".to_string())
}

pub(crate) fn permanent() -> ResolveError {
    ResolveError::PermanentFailure {
        resolver: "stub",
        reason: "REFUSED".to_string(),
    }
}

/// Replays queued outcomes in order, repeating the last one once the
/// queue is down to a single entry.
pub(crate) struct StubResolver {
    name: &'static str,
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
    closes: AtomicUsize,
    close_error: Option<fn() -> ResolveError>,
}

impl StubResolver {
    pub(crate) fn new(name: &'static str, outcome: Outcome) -> Self {
        Self::scripted(name, vec![outcome])
    }

    pub(crate) fn scripted(name: &'static str, outcomes: Vec<Outcome>) -> Self {
        assert!(!outcomes.is_empty());
        Self {
            name,
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            close_error: None,
        }
    }

    pub(crate) fn failing_close(mut self, make: fn() -> ResolveError) -> Self {
        self.close_error = Some(make);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn next(&self) -> LookupResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut outcomes = self.outcomes.lock();
            if outcomes.len() > 1 {
                outcomes.pop_front()
            } else {
                outcomes.front().cloned()
            }
        };
        outcome.map_or_else(|| Err(transient()), |make| make())
    }
}

#[async_trait]
impl Resolver for StubResolver {
    async fn resolve(&self, _hostname: &str) -> LookupResult {
        self.next()
    }

    async fn reverse(&self, _ip: &str) -> LookupResult {
        self.next()
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match self.close_error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}
