use itertools::Itertools;
use std::{fmt, io, time::Duration};
use thiserror::Error;

/// Failure of a single forward or reverse lookup.
///
/// `NoResolution` and `NotInHostFiles` are benign outcomes rather than
/// operational failures; callers decide how to surface them.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no resolution found")]
    NoResolution,

    #[error("not found in host files")]
    NotInHostFiles,

    #[error("invalid hostname format")]
    InvalidHostname,

    #[error("invalid IP address format")]
    InvalidIp,

    /// The backend refused the query, e.g. SERVFAIL or REFUSED. Never retried.
    #[error("permanent failure in {resolver} resolution: {reason}")]
    PermanentFailure {
        resolver: &'static str,
        reason: String,
    },

    #[error("{resolver} lookup timed out after {after:?}")]
    Timeout {
        resolver: &'static str,
        after: Duration,
    },

    #[error("{resolver} resolver is closed")]
    Closed { resolver: &'static str },

    #[error("nameserver lookup failed: {0}")]
    Nameserver(#[from] hickory_resolver::ResolveError),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Multiple(ErrorList),
}

impl ResolveError {
    /// Whether another attempt against the same backend could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolveError::Timeout { .. }
                | ResolveError::Nameserver(_)
                | ResolveError::Other(_)
        )
    }

    /// `NoResolution`, or `NotInHostFiles` surfacing from a host-file-only stack.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ResolveError::NoResolution | ResolveError::NotInHostFiles
        )
    }
}

/// A list of independent failures, kept in the order they occurred.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<ResolveError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: ResolveError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Collapses the list: empty is success, a single error is returned as
    /// itself, anything more becomes [`ResolveError::Multiple`].
    pub fn into_result(mut self) -> Result<(), ResolveError> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(ResolveError::Multiple(self)),
        }
    }

    /// Like [`into_result`](Self::into_result) but keeps the list intact.
    pub fn into_list_result(self) -> Result<(), ErrorList> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<ResolveError>> for ErrorList {
    fn from(errors: Vec<ResolveError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ErrorList {
    type Item = ResolveError;
    type IntoIter = std::vec::IntoIter<ResolveError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("\n"))
    }
}

impl std::error::Error for ErrorList {}

/// Failure to assemble the resolver stack from a validated configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to create hostfile resolver: {0}")]
    HostFile(#[source] io::Error),

    #[error("failed to create nameserver resolver: invalid nameserver address {0:?}")]
    NameserverAddress(String),

    #[error(
        "no DNS resolver configuration available: either hostfile, nameserver, or system resolver must be enabled"
    )]
    NoResolvers,
}
