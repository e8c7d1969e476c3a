use lru::LruCache;

use crate::{unix_now, HOT_THRESHOLD, MAX_L1_ENTRIES};

/// Typed offset into the facade-owned host arena.
///
/// The cache never holds host addresses; turning an offset into an
/// executable pointer is the arena's (unsafe) business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostOffset(pub u32);

/// The value a lookup hands back: everything a caller needs to locate the
/// translation, nothing it could dangle on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationRecord {
    pub guest_addr: u64,
    pub fingerprint: u64,
    pub guest_size: u32,
    pub host_size: u32,
    /// `None` while a tier-2 promotion awaits its arena slot.
    pub host_offset: Option<HostOffset>,
}

#[derive(Debug, Clone)]
pub(crate) struct Tier1Entry {
    pub record: TranslationRecord,
    pub last_access: u64,
    pub access_count: u32,
    pub hot: bool,
    pub flags: u32,
}

impl Tier1Entry {
    pub fn new(record: TranslationRecord, access_count: u32) -> Self {
        Self {
            record,
            last_access: unix_now(),
            access_count,
            hot: access_count > HOT_THRESHOLD,
            flags: 0,
        }
    }

    fn touch(&mut self) {
        self.last_access = unix_now();
        self.access_count = self.access_count.saturating_add(1);
        self.hot = self.access_count > HOT_THRESHOLD;
    }
}

type Key = (u64, u64);

/// In-memory tier: recency-ordered entries keyed by
/// `(guest address, block fingerprint)`.
///
/// The LRU structure is unbounded; capacity is enforced here so eviction
/// can prefer cold entries and only fall back to evicting a hot one when
/// nothing cold remains.
#[derive(Debug)]
pub(crate) struct Tier1 {
    entries: LruCache<Key, Tier1Entry>,
}

impl Tier1 {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Hit path: bump counters, re-derive hotness, move to MRU.
    pub fn touch(&mut self, guest_addr: u64, fingerprint: u64) -> Option<&Tier1Entry> {
        let entry = self.entries.get_mut(&(guest_addr, fingerprint))?;
        entry.touch();
        Some(entry)
    }

    /// Insert an entry, evicting per policy when at capacity. Re-inserting
    /// an existing key replaces the entry without eviction.
    pub fn insert(&mut self, entry: Tier1Entry) {
        let key = (entry.record.guest_addr, entry.record.fingerprint);
        if !self.entries.contains(&key) && self.entries.len() >= MAX_L1_ENTRIES {
            self.evict_one();
        }
        self.entries.push(key, entry);
    }

    /// Evict the least-recently-used cold entry, or the LRU entry outright
    /// when everything is hot.
    fn evict_one(&mut self) {
        let cold_lru = self
            .entries
            .iter()
            .rev()
            .find(|(_, entry)| !entry.hot)
            .map(|(key, _)| *key);

        match cold_lru {
            Some(key) => {
                self.entries.pop(&key);
            }
            None => {
                self.entries.pop_lru();
            }
        }
    }

    /// MRU-to-LRU iteration without promoting anything.
    pub fn iter(&self) -> impl Iterator<Item = &Tier1Entry> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, guest_addr: u64, fingerprint: u64) -> bool {
        self.entries.contains(&(guest_addr, fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(guest_addr: u64) -> TranslationRecord {
        TranslationRecord {
            guest_addr,
            fingerprint: guest_addr ^ 0x5555,
            guest_size: 4,
            host_size: 8,
            host_offset: Some(HostOffset(0)),
        }
    }

    #[test]
    fn touch_promotes_and_derives_hotness() {
        let mut tier1 = Tier1::new();
        let rec = record(0x10);
        tier1.insert(Tier1Entry::new(rec, 1));

        for i in 0..HOT_THRESHOLD {
            let entry = tier1.touch(rec.guest_addr, rec.fingerprint).unwrap();
            let expect_hot = 1 + i + 1 > HOT_THRESHOLD;
            assert_eq!(entry.hot, expect_hot, "access {}", i + 1);
        }
    }

    #[test]
    fn capacity_evicts_cold_lru_first() {
        let mut tier1 = Tier1::new();

        // First entry becomes hot, then the cache is filled to capacity.
        let hot = record(0);
        tier1.insert(Tier1Entry::new(hot, HOT_THRESHOLD + 1));
        for i in 1..MAX_L1_ENTRIES as u64 {
            tier1.insert(Tier1Entry::new(record(i), 1));
        }
        assert_eq!(tier1.len(), MAX_L1_ENTRIES);

        // One more insert: the hot entry is the LRU, but entry 1 (cold LRU)
        // must go instead.
        tier1.insert(Tier1Entry::new(record(MAX_L1_ENTRIES as u64), 1));
        assert_eq!(tier1.len(), MAX_L1_ENTRIES);
        assert!(tier1.contains(hot.guest_addr, hot.fingerprint));
        assert!(!tier1.contains(record(1).guest_addr, record(1).fingerprint));
    }

    #[test]
    fn all_hot_evicts_lru_unconditionally() {
        let mut tier1 = Tier1::new();
        for i in 0..MAX_L1_ENTRIES as u64 {
            tier1.insert(Tier1Entry::new(record(i), HOT_THRESHOLD + 1));
        }

        tier1.insert(Tier1Entry::new(record(MAX_L1_ENTRIES as u64), HOT_THRESHOLD + 1));
        assert_eq!(tier1.len(), MAX_L1_ENTRIES);
        assert!(!tier1.contains(record(0).guest_addr, record(0).fingerprint));
        assert!(tier1.contains(record(1).guest_addr, record(1).fingerprint));
    }
}
