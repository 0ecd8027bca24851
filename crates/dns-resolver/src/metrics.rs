use std::fmt;

use dns_types::protocol::types::*;

/// Metrics from a resolution attempt.  The resolver builds this
/// structure as it goes, and hands it back with the answers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct Metrics {
    /// Cache misses
    pub cache_misses: u64,
    /// Cache hits
    pub cache_hits: u64,
    /// Queries which some nameserver answered with at least one
    /// record.
    pub nameserver_hits: u64,
    /// Queries which timed out, failed, or got nothing usable back.
    pub nameserver_misses: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hit_or_miss(&mut self, cached_rrs: &[ResourceRecord]) {
        if cached_rrs.is_empty() {
            self.cache_misses += 1;
        } else {
            self.cache_hits += 1;
        }
    }

    pub fn nameserver_hit(&mut self) {
        self.nameserver_hits += 1;
    }

    pub fn nameserver_miss(&mut self) {
        self.nameserver_misses += 1;
    }

    /// Total number of queries sent.
    pub fn queries(&self) -> u64 {
        self.nameserver_hits + self.nameserver_misses
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cache hits {}, cache misses {}, nameserver hits {}, nameserver misses {}",
            self.cache_hits, self.cache_misses, self.nameserver_hits, self.nameserver_misses
        )
    }
}
