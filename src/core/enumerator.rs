use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::warn;

use super::connection::ConnectionRecord;
use super::error::SourceError;
use super::filters::ConnectionFilter;
use super::process::ProcessSource;
use super::resolver::HostnameResolver;

/// Turns a process's raw socket table into annotated [`ConnectionRecord`]s.
pub struct ConnectionEnumerator {
    source: Arc<dyn ProcessSource>,
    resolver: Arc<HostnameResolver>,
    resolve_dns: bool,
    live_only: bool,
}

impl ConnectionEnumerator {
    pub fn new(source: Arc<dyn ProcessSource>, resolver: Arc<HostnameResolver>) -> Self {
        Self {
            source,
            resolver,
            resolve_dns: true,
            live_only: true,
        }
    }

    pub fn with_dns(mut self, resolve_dns: bool) -> Self {
        self.resolve_dns = resolve_dns;
        self
    }

    pub fn with_live_only(mut self, live_only: bool) -> Self {
        self.live_only = live_only;
        self
    }

    pub fn filter(&self) -> ConnectionFilter {
        let local_addresses = self.source.local_addresses().unwrap_or_else(|e| {
            warn!("Unable to list local interface addresses: {}", e);
            HashSet::new()
        });
        ConnectionFilter::new()
            .with_live_only(self.live_only)
            .with_local_addresses(local_addresses)
    }

    /// Remote connections of `pid` that pass the filter.
    ///
    /// An empty vector means the process is alive but has no matching
    /// sockets; a vanished process is reported as
    /// [`SourceError::ProcessNotFound`].
    pub fn enumerate(&self, pid: u32) -> Result<Vec<ConnectionRecord>, SourceError> {
        let sockets = self.source.connections(pid)?;
        let filter = self.filter();

        let kept: Vec<_> = sockets
            .into_iter()
            .filter(|socket| filter.matches_connection(socket))
            .filter_map(|socket| socket.remote.map(|(addr, port)| (socket, addr, port)))
            .collect();

        let hostnames: HashMap<_, _> = if self.resolve_dns && !kept.is_empty() {
            self.resolver.resolve_batch(kept.iter().map(|(_, addr, _)| *addr))
        } else {
            HashMap::new()
        };

        Ok(kept
            .iter()
            .map(|(socket, addr, port)| ConnectionRecord::new(socket, *addr, *port, hostnames.get(addr).cloned()))
            .collect())
    }
}
