#![warn(clippy::pedantic)]
// Don't care enough to fix
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::wildcard_imports)]

pub mod cache;
pub mod context;
pub mod iterative;
pub mod metrics;
pub mod transport;

use std::net::IpAddr;
use tracing::Instrument;

use dns_types::protocol::types::*;

use self::cache::SharedCache;
use self::context::Context;
use self::iterative::resolve_iterative;
use self::metrics::Metrics;
use self::transport::Transport;

/// Maximum indirection level.  Each CNAME followed goes one level
/// deeper, so a chain of CNAMEs longer than this cannot be resolved.
pub const MAX_INDIRECTION_LEVEL: usize = 10;

/// Tunables for a lookup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResolverOptions {
    /// Port nameservers are queried on.
    pub port: u16,

    /// Maximum number of queries one lookup may send, across all
    /// delegations, CNAMEs, and nameserver lookups.
    pub max_queries: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            port: 53,
            max_queries: 64,
        }
    }
}

/// Resolve a question iteratively, starting from the `root`
/// nameserver.  Every record seen is added to the cache.
///
/// An empty result means there is no answer, or it could not be found.
pub async fn resolve<T: Transport>(
    transport: &T,
    cache: &SharedCache,
    root: IpAddr,
    options: &ResolverOptions,
    question: &Question,
) -> (Metrics, Vec<ResourceRecord>) {
    let mut context = Context::new(transport, cache, root, options);

    let rrs = resolve_iterative(&mut context, question, 0)
        .instrument(tracing::error_span!("resolve", %question, %root))
        .await;

    (context.done(), rrs)
}
