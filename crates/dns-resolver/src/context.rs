use std::net::{IpAddr, SocketAddr};

use crate::cache::SharedCache;
use crate::metrics::Metrics;
use crate::ResolverOptions;

/// State for one top-level lookup.
pub struct Context<'a, T> {
    // global context
    pub transport: &'a T,
    pub cache: &'a SharedCache,
    pub root: IpAddr,
    port: u16,
    // request state
    queries_remaining: usize,
    metrics: Metrics,
}

impl<'a, T> Context<'a, T> {
    pub fn new(
        transport: &'a T,
        cache: &'a SharedCache,
        root: IpAddr,
        options: &ResolverOptions,
    ) -> Self {
        Self {
            transport,
            cache,
            root,
            port: options.port,
            queries_remaining: options.max_queries,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    pub fn done(self) -> Metrics {
        self.metrics
    }

    /// The address to send a query for this nameserver to.
    pub fn nameserver_address(&self, ip: IpAddr) -> SocketAddr {
        SocketAddr::new(ip, self.port)
    }

    /// Use up one query from the budget.  Returns `false`, and uses
    /// nothing, if the budget is already spent.
    pub fn take_query(&mut self) -> bool {
        if self.queries_remaining == 0 {
            false
        } else {
            self.queries_remaining -= 1;
            true
        }
    }
}
