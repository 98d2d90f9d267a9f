//! A name-indexed certificate cache with bounded entry lifetimes.
//!
//! An entry lives until `min(certificate.not_after, insertion + max
//! lifetime)` and is purged lazily on access. An optional capacity
//! bound evicts the least recently inserted entry first.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::time::Duration;

use tracing::debug;

use crate::certificate::Certificate;
use crate::clock;
use crate::name::Name;

struct CacheEntry {
    certificate: Certificate,
    expires_at_ms: u64,
    sequence: u64,
}

pub(crate) struct CertificateCache {
    max_lifetime_ms: u64,
    capacity: Option<usize>,
    by_name: BTreeMap<Name, CacheEntry>,
    /// Insertion order, kept only for capped caches. Replaced entries
    /// leave a stale pair behind; eviction skips those by sequence.
    insertions: VecDeque<(u64, Name)>,
    next_sequence: u64,
    now_offset_ms: i64,
}

impl CertificateCache {
    pub(crate) fn new(max_lifetime: Duration) -> Self {
        Self::build(max_lifetime, None)
    }

    pub(crate) fn with_capacity(max_lifetime: Duration, capacity: usize) -> Self {
        Self::build(max_lifetime, Some(capacity))
    }

    fn build(max_lifetime: Duration, capacity: Option<usize>) -> Self {
        Self {
            max_lifetime_ms: u64::try_from(max_lifetime.as_millis()).unwrap_or(u64::MAX),
            capacity,
            by_name: BTreeMap::new(),
            insertions: VecDeque::new(),
            next_sequence: 0,
            now_offset_ms: 0,
        }
    }

    /// Caches `certificate` under its full name, replacing any previous
    /// entry. Certificates already past their validity period are not
    /// inserted.
    pub(crate) fn insert(&mut self, certificate: Certificate) {
        self.purge_expired();
        let now = self.now_ms();
        let lifetime_end = now.saturating_add(self.max_lifetime_ms);
        let expires_at_ms = certificate
            .validity_period()
            .map_or(lifetime_end, |period| period.not_after_ms().min(lifetime_end));
        if expires_at_ms <= now {
            debug!(name = %certificate.name(), "not caching expired certificate");
            return;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let name = certificate.name().clone();
        if self.capacity.is_some() {
            self.insertions.push_back((sequence, name.clone()));
        }
        self.by_name.insert(
            name,
            CacheEntry {
                certificate,
                expires_at_ms,
                sequence,
            },
        );
        while self.capacity.is_some_and(|cap| self.by_name.len() > cap) {
            let Some((sequence, name)) = self.insertions.pop_front() else {
                break;
            };
            if self
                .by_name
                .get(&name)
                .is_some_and(|entry| entry.sequence == sequence)
            {
                self.by_name.remove(&name);
            }
        }
    }

    /// The first live certificate whose name starts with `prefix`, in
    /// canonical name order.
    pub(crate) fn find(&mut self, prefix: &Name) -> Option<Certificate> {
        self.purge_expired();
        let (name, entry) = self
            .by_name
            .range((Bound::Included(prefix), Bound::Unbounded))
            .next()?;
        prefix
            .is_prefix_of(name)
            .then(|| entry.certificate.clone())
    }

    pub(crate) fn clear(&mut self) {
        self.by_name.clear();
        self.insertions.clear();
    }

    pub(crate) fn set_now_offset(&mut self, offset_ms: i64) {
        self.now_offset_ms = offset_ms;
    }

    fn purge_expired(&mut self) {
        let now = self.now_ms();
        self.by_name.retain(|_, entry| entry.expires_at_ms > now);
    }

    fn now_ms(&self) -> u64 {
        clock::shifted_now_millis(self.now_offset_ms)
    }
}
