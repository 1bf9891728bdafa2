use crate::{
    error::{BuildError, ResolveError},
    resolver::{LookupResult, Resolver},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    net::IpAddr,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Resolver answering from `hosts`-format files read once at construction.
///
/// A miss is reported as [`ResolveError::NotInHostFiles`] so the chain can
/// tell "no entry here" apart from "no such name".
pub struct HostFileResolver {
    table: RwLock<Option<HostTable>>,
}

impl HostFileResolver {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self, BuildError> {
        let mut table = HostTable::default();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(BuildError::HostFile)?;
            table.parse(&content);
            debug!(path = %path.display(), "Loaded hosts file");
        }

        info!(
            files = ?paths.iter().map(|p| p.as_ref().to_path_buf()).collect::<Vec<PathBuf>>(),
            names = table.by_name.len(),
            addresses = table.by_addr.len(),
            "Created hostfile resolver"
        );

        Ok(Self {
            table: RwLock::new(Some(table)),
        })
    }

    /// Builds a resolver directly from `hosts`-format content.
    pub fn from_content(content: &str) -> Self {
        let mut table = HostTable::default();
        table.parse(content);
        Self {
            table: RwLock::new(Some(table)),
        }
    }

    fn with_table(&self, f: impl FnOnce(&HostTable) -> Option<Vec<String>>) -> LookupResult {
        let guard = self.table.read();
        let table = guard.as_ref().ok_or(ResolveError::Closed {
            resolver: "hostfile",
        })?;
        f(table).ok_or(ResolveError::NotInHostFiles)
    }
}

#[async_trait]
impl Resolver for HostFileResolver {
    async fn resolve(&self, hostname: &str) -> LookupResult {
        let key = normalize_name(hostname);
        self.with_table(|table| {
            table
                .by_name
                .get(&key)
                .map(|ips| ips.iter().map(IpAddr::to_string).collect())
        })
    }

    async fn reverse(&self, ip: &str) -> LookupResult {
        let addr: IpAddr = ip.trim().parse().map_err(|_| ResolveError::InvalidIp)?;
        self.with_table(|table| table.by_addr.get(&addr).cloned())
    }

    fn name(&self) -> &'static str {
        "hostfile"
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.table.write().take();
        Ok(())
    }
}

/// Forward and reverse views over every parsed line.
#[derive(Debug, Default)]
struct HostTable {
    by_name: HashMap<String, Vec<IpAddr>>,
    by_addr: HashMap<IpAddr, Vec<String>>,
}

impl HostTable {
    /// Each meaningful line is `<IP> <hostname> [aliases...]`. Comments start
    /// with `#`, anywhere on the line. Lines with an unparsable address are
    /// skipped. A name on several lines collects every address, in order.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(ip_str) = parts.next() else {
                continue;
            };
            let Ok(ip) = ip_str.parse::<IpAddr>() else {
                debug!(line = %line, "Skipping hosts line with invalid IP");
                continue;
            };

            for hostname in parts {
                let ips = self.by_name.entry(normalize_name(hostname)).or_default();
                if !ips.contains(&ip) {
                    ips.push(ip);
                }

                let names = self.by_addr.entry(ip).or_default();
                let hostname = hostname.trim_end_matches('.');
                if !names.iter().any(|n| n.eq_ignore_ascii_case(hostname)) {
                    names.push(hostname.to_owned());
                }
            }
        }
    }
}

fn normalize_name(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}
