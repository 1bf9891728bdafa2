//! Enriches telemetry attributes with DNS lookups.
//!
//! Hostnames found in configured attributes are resolved to addresses
//! (forward) and addresses to hostnames (reverse). Lookups go through a
//! cache in front of an ordered chain of backends: host files, explicit
//! nameservers and the system resolver.

pub mod config;
pub mod error;
pub mod processor;
pub mod resolver;
pub mod telemetry;

pub use config::{AttributeContext, ConfigError, LookupConfig, LookupConfigError, ProcessorConfig};
pub use error::{BuildError, ErrorList, ResolveError};
pub use processor::{create_resolver_chain, DnsLookupProcessor, ProcessorError};
pub use resolver::{Direction, Resolver};
pub use telemetry::{AttributeStore, Attributes, ResourceRecords, Value};
