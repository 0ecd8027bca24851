use async_recursion::async_recursion;
use std::net::IpAddr;
use tracing::Instrument;

use dns_types::protocol::types::*;

use crate::context::Context;
use crate::transport::{ServerResponse, Transport};
use crate::MAX_INDIRECTION_LEVEL;

/// Iterative DNS resolution.
///
/// Answers come from the cache if it can give them.  Otherwise the
/// question is put to the root nameserver and the delegations it
/// returns are followed downwards, caching every record seen on the
/// way, until some nameserver gives an answer or there is nowhere
/// left to go.  If the answer turns out to be a CNAME, its target is
/// resolved in turn, up to `MAX_INDIRECTION_LEVEL` times.
///
/// Failures are never returned: a question which cannot be answered
/// has no records.
#[async_recursion(?Send)]
pub async fn resolve_iterative<T: Transport>(
    context: &mut Context<'_, T>,
    question: &Question,
    indirection_level: usize,
) -> Vec<ResourceRecord> {
    if indirection_level > MAX_INDIRECTION_LEVEL {
        tracing::warn!(%question, "hit indirection limit");
        return Vec::new();
    }

    let cached = cached_answer(context, question, indirection_level);
    context.metrics().cache_hit_or_miss(&cached);
    if !cached.is_empty() {
        tracing::trace!(%question, count = %cached.len(), "cache hit");
        return cached;
    }

    let root = context.root;
    retrieve_results_from_server(context, question, root).await;

    if question.rtype != RecordType::CNAME {
        let cnames = context
            .cache
            .get(&Question::new(question.name.clone(), RecordType::CNAME));
        if let Some(target) = cnames.iter().find_map(ResourceRecord::text) {
            tracing::trace!(%question, %target, "chasing CNAME");
            let cname_question = Question::new(target, RecordType::A);
            return resolve_iterative(context, &cname_question, indirection_level + 1)
                .instrument(tracing::error_span!("resolve", question = %cname_question, %indirection_level))
                .await
                .iter()
                .map(|rr| rr.with_name(&question.name))
                .collect();
        }
    }

    context.cache.get(question)
}

/// Answer a question from the cache alone, following cached CNAMEs.
/// Address records found are re-owned under the name asked about.
///
/// A question for CNAME records is answered with exactly the cached
/// CNAME records.  For any other type the answer is the cached `A`
/// and `AAAA` records of the name or of whatever it is an alias for.
fn cached_answer<T>(
    context: &Context<'_, T>,
    question: &Question,
    indirection_level: usize,
) -> Vec<ResourceRecord> {
    if question.rtype == RecordType::CNAME {
        return context.cache.get(question);
    }

    let mut answers = Vec::new();
    collect_cached_addresses(
        context,
        &question.name,
        &question.name,
        indirection_level,
        &mut answers,
    );
    answers
}

/// Helper for `cached_answer`.
fn collect_cached_addresses<T>(
    context: &Context<'_, T>,
    owner: &str,
    name: &str,
    indirection_level: usize,
    answers: &mut Vec<ResourceRecord>,
) {
    for rtype in [RecordType::A, RecordType::AAAA] {
        for rr in context.cache.get(&Question::new(name, rtype)) {
            let rr = rr.with_name(owner);
            if !answers.contains(&rr) {
                answers.push(rr);
            }
        }
    }

    for cname in context.cache.get(&Question::new(name, RecordType::CNAME)) {
        if let Some(target) = cname.text() {
            if indirection_level >= MAX_INDIRECTION_LEVEL {
                tracing::warn!(%name, %target, "hit indirection limit in cache");
                continue;
            }
            collect_cached_addresses(context, owner, target, indirection_level + 1, answers);
        }
    }
}

/// Ask a nameserver the question, cache everything it says, and
/// follow any delegation.
#[async_recursion(?Send)]
async fn retrieve_results_from_server<T: Transport>(
    context: &mut Context<'_, T>,
    question: &Question,
    server: IpAddr,
) {
    if !context.take_query() {
        tracing::warn!(%question, %server, "query budget exhausted");
        return;
    }

    let address = context.nameserver_address(server);
    let rrs = query_nameserver(context.transport, question, address)
        .instrument(tracing::error_span!("query_nameserver", %address))
        .await;

    match rrs {
        Some(rrs) if !rrs.is_empty() => {
            context.metrics().nameserver_hit();
            context.cache.insert_all(&rrs);
            query_next_level(context, question, &rrs)
                .instrument(tracing::error_span!("query_next_level", %question))
                .await;
        }
        _ => context.metrics().nameserver_miss(),
    }
}

/// Send a single query and decode the reply.  Returns `None` if the
/// query failed, or if the reply could not be decoded or is not a
/// reply to this query.
async fn query_nameserver<T: Transport>(
    transport: &T,
    question: &Question,
    address: std::net::SocketAddr,
) -> Option<Vec<ResourceRecord>> {
    let ServerResponse { id, octets } = match transport.query(question, address).await {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(%error, "query failed");
            return None;
        }
    };

    let response = match Response::from_octets(&octets) {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(%error, "could not decode response");
            return None;
        }
    };

    let rrs = response.records();
    if response.header.id != id && !rrs.is_empty() {
        tracing::warn!(sent = %id, received = %response.header.id, "transaction ID mismatch - discarding");
        return None;
    }

    tracing::trace!(authoritative = %response.header.is_authoritative, count = %rrs.len(), "got response");
    Some(rrs)
}

/// Decide where to go next, given every record a nameserver returned:
///
/// - if any of them is an address, a CNAME, or a record of the type
///   asked for, owned by the name asked about, stop: it is cached
///   already
///
/// - otherwise, query the first glue `A` record's address
///
/// - otherwise, resolve the first `NS` record's nameserver, which
///   may be answered from the cache, and query its address
#[async_recursion(?Send)]
async fn query_next_level<T: Transport>(
    context: &mut Context<'_, T>,
    question: &Question,
    rrs: &[ResourceRecord],
) {
    if rrs
        .iter()
        .any(|rr| rr.name == question.name && (rr.rtype.is_answer() || rr.rtype == question.rtype))
    {
        tracing::trace!("got answer");
        return;
    }

    if let Some(glue) = rrs
        .iter()
        .filter(|rr| rr.rtype == RecordType::A)
        .find_map(ResourceRecord::address)
    {
        tracing::trace!(%glue, "following glue");
        retrieve_results_from_server(context, question, glue).await;
        return;
    }

    let Some(nameserver) = rrs
        .iter()
        .filter(|rr| rr.rtype == RecordType::NS)
        .find_map(ResourceRecord::text)
    else {
        tracing::trace!("no nameservers - dead end");
        return;
    };

    let ns_question = Question::new(nameserver, RecordType::A);
    tracing::trace!(%nameserver, "resolving nameserver");
    let addresses = resolve_iterative(context, &ns_question, 0)
        .instrument(tracing::error_span!("resolve", question = %ns_question))
        .await;

    if let Some(address) = first_address(&addresses) {
        tracing::trace!(%nameserver, %address, "following nameserver");
        retrieve_results_from_server(context, question, address).await;
    } else {
        tracing::trace!(%nameserver, "no address for nameserver - dead end");
    }
}

/// The first IPv4 address, or failing that the first IPv6 address.
fn first_address(rrs: &[ResourceRecord]) -> Option<IpAddr> {
    let mut addresses = rrs.iter().filter_map(ResourceRecord::address);
    let first = addresses.next()?;
    if first.is_ipv4() {
        Some(first)
    } else {
        addresses.find(IpAddr::is_ipv4).or(Some(first))
    }
}
