use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dns_types::protocol::types::*;

/// A convenience wrapper around a `Cache` which lets it be shared
/// between threads.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.
#[derive(Debug, Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

impl SharedCache {
    /// Make a new, empty, shared cache.
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::new())),
        }
    }

    /// Get the records held for exactly this name and type.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn get(&self, question: &Question) -> Vec<ResourceRecord> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get(question)
    }

    /// Insert an entry into the cache.  Returns `false` if an identical
    /// record was already present.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn insert(&self, record: &ResourceRecord) -> bool {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .insert(record)
    }

    /// Insert multiple entries into the cache.
    ///
    /// This is more efficient than calling `insert` multiple times, as it locks
    /// the cache just once.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn insert_all(&self, records: &[ResourceRecord]) {
        let mut cache = self.cache.lock().expect(MUTEX_POISON_MESSAGE);
        for record in records {
            cache.insert(record);
        }
    }

    /// Call `visitor` with every key and its records, in key order.
    ///
    /// The cache is locked for the duration, so the visitor must not
    /// use this `SharedCache`.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn for_each<F: FnMut(&Question, &[ResourceRecord])>(&self, visitor: F) {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .for_each(visitor);
    }

    /// Total number of records held.
    ///
    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn len(&self) -> usize {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).len()
    }

    /// # Panics
    ///
    /// If the mutex has been poisoned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Caching for `ResourceRecord`s, keyed by owner name and type.
///
/// Records are kept for as long as the cache lives: TTLs are stored
/// but never counted down, and nothing is evicted.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    entries: BTreeMap<Question, Vec<ResourceRecord>>,
    len: usize,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question: &Question) -> Vec<ResourceRecord> {
        self.entries.get(question).cloned().unwrap_or_default()
    }

    /// Insert a record under its own name and type, unless an
    /// identical record is already there.
    pub fn insert(&mut self, record: &ResourceRecord) -> bool {
        let records = self.entries.entry(record.question()).or_default();
        if records.contains(record) {
            false
        } else {
            records.push(record.clone());
            self.len += 1;
            true
        }
    }

    pub fn for_each<F: FnMut(&Question, &[ResourceRecord])>(&self, mut visitor: F) {
        for (question, records) in &self.entries {
            visitor(question, records);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use dns_types::protocol::types::test_util::*;

    use super::*;

    #[test]
    fn cache_put_can_get() {
        let mut cache = Cache::new();
        let rr = a_record("www.example.com", Ipv4Addr::new(1, 1, 1, 1));
        cache.insert(&rr);

        assert_eq!(
            vec![rr],
            cache.get(&Question::new("www.example.com", RecordType::A))
        );
    }

    #[test]
    fn cache_put_deduplicates() {
        let mut cache = Cache::new();
        let rr = a_record("www.example.com", Ipv4Addr::new(1, 1, 1, 1));

        assert!(cache.insert(&rr));
        assert!(!cache.insert(&rr));
        assert_eq!(
            1,
            cache
                .get(&Question::new("www.example.com", RecordType::A))
                .len()
        );
        assert_eq!(1, cache.len());
    }

    #[test]
    fn cache_keeps_records_differing_only_in_ttl() {
        let mut cache = Cache::new();
        let rr = a_record("www.example.com", Ipv4Addr::new(1, 1, 1, 1));
        let mut rr2 = rr.clone();
        rr2.ttl = 5;

        cache.insert(&rr);
        cache.insert(&rr2);

        assert_eq!(
            vec![rr, rr2],
            cache.get(&Question::new("www.example.com", RecordType::A))
        );
    }

    #[test]
    fn cache_lookup_is_exact() {
        let mut cache = Cache::new();
        cache.insert(&a_record("www.example.com", Ipv4Addr::new(1, 1, 1, 1)));

        assert!(cache
            .get(&Question::new("www.example.com", RecordType::AAAA))
            .is_empty());
        assert!(cache
            .get(&Question::new("example.com", RecordType::A))
            .is_empty());
        assert!(cache
            .get(&Question::new("WWW.example.com", RecordType::A))
            .is_empty());
    }

    #[test]
    fn cache_for_each_visits_every_key() {
        let mut cache = Cache::new();
        cache.insert(&a_record("b.example.com", Ipv4Addr::new(1, 1, 1, 1)));
        cache.insert(&a_record("a.example.com", Ipv4Addr::new(1, 1, 1, 1)));
        cache.insert(&a_record("a.example.com", Ipv4Addr::new(2, 2, 2, 2)));
        cache.insert(&cname_record("a.example.com", "b.example.com"));

        let mut seen = Vec::new();
        cache.for_each(|question, records| seen.push((question.clone(), records.len())));

        assert_eq!(
            vec![
                (Question::new("a.example.com", RecordType::A), 2),
                (Question::new("a.example.com", RecordType::CNAME), 1),
                (Question::new("b.example.com", RecordType::A), 1),
            ],
            seen
        );
    }

    #[test]
    fn shared_cache_is_shared() {
        let cache = SharedCache::new();
        let other = cache.clone();
        other.insert_all(&[
            ns_record("example.com", "ns1.example.com"),
            ns_record("example.com", "ns1.example.com"),
        ]);

        assert_eq!(1, cache.len());
        assert!(!cache.is_empty());
    }
}
