use std::collections::HashMap;
use std::sync::Arc;

use arcrosse_hash::fingerprint;
use parking_lot::Mutex;
use tracing::{debug, warn};

use arcrosse_persist::PersistenceEngine;

use crate::format::FileEntry;
use crate::tier1::{HostOffset, Tier1, Tier1Entry, TranslationRecord};
use crate::tier2::{self, BinaryDescriptor};
use crate::{unix_now, CacheConfig, CacheError, Result};

/// Outcome of a cache lookup.
#[derive(Debug)]
pub enum Lookup {
    /// In-memory hit; `record.host_offset` is bound.
    Tier1(TranslationRecord),
    /// On-disk hit. The caller copies `host_bytes` into its arena and calls
    /// [`TranslationCache::bind_host`] to finish the promotion.
    Tier2 {
        record: TranslationRecord,
        host_bytes: Vec<u8>,
    },
    Miss,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct Inner {
    tier1: Tier1,
    binaries: HashMap<String, Arc<BinaryDescriptor>>,
    l1_hits: u64,
    l2_hits: u64,
    misses: u64,
}

/// The two-tier translation cache.
///
/// One mutex guards tier-1 state and the statistics; tier-2 file I/O runs
/// outside it against immutable descriptors, so slow disks never stall
/// in-memory hits on other threads.
pub struct TranslationCache {
    config: CacheConfig,
    engine: Arc<PersistenceEngine>,
    inner: Mutex<Inner>,
}

impl TranslationCache {
    pub fn new(config: CacheConfig, engine: Arc<PersistenceEngine>) -> Result<Self> {
        std::fs::create_dir_all(&config.directory)?;
        Ok(Self {
            config,
            engine,
            inner: Mutex::new(Inner {
                tier1: Tier1::new(),
                binaries: HashMap::new(),
                l1_hits: 0,
                l2_hits: 0,
                misses: 0,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Associate `binary_id` with its cache file and the fingerprint used
    /// to validate that file's header.
    pub fn register_binary(&self, binary_id: &str, binary_fp: u64) {
        let descriptor = Arc::new(BinaryDescriptor {
            path: self.config.directory.join(format!("{binary_id}.cache")),
            fingerprint: binary_fp,
        });
        self.inner
            .lock()
            .binaries
            .insert(binary_id.to_owned(), descriptor);
    }

    /// Look up the translation for `guest_bytes` at `guest_addr`.
    pub fn lookup(&self, binary_id: &str, guest_addr: u64, guest_bytes: &[u8]) -> Lookup {
        let fp = fingerprint(guest_bytes);

        // Tier 1, under the lock.
        let descriptor = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if let Some(entry) = inner.tier1.touch(guest_addr, fp) {
                // An entry promoted from tier 2 but never re-bound to an
                // arena slot cannot satisfy a hit; retry tier 2 below.
                if entry.record.host_offset.is_some() {
                    let record = entry.record;
                    inner.l1_hits += 1;
                    return Lookup::Tier1(record);
                }
            }
            inner.binaries.get(binary_id).cloned()
        };

        // Tier 2, outside the lock.
        let Some(descriptor) = descriptor else {
            self.inner.lock().misses += 1;
            return Lookup::Miss;
        };

        match tier2::lookup(&descriptor, guest_addr, fp) {
            Ok(Some(hit)) => {
                let record = TranslationRecord {
                    guest_addr,
                    fingerprint: fp,
                    guest_size: hit.entry.guest_size,
                    host_size: hit.entry.host_size,
                    host_offset: None,
                };
                self.inner.lock().l2_hits += 1;
                debug!(guest_addr, "tier-2 hit, awaiting arena re-bind");
                Lookup::Tier2 {
                    record,
                    host_bytes: hit.host_bytes,
                }
            }
            Ok(None) => {
                self.inner.lock().misses += 1;
                Lookup::Miss
            }
            Err(err) => {
                warn!(path = %descriptor.path.display(), error = %err, "tier-2 read degraded to miss");
                self.inner.lock().misses += 1;
                Lookup::Miss
            }
        }
    }

    /// Record a freshly translated block in tier 1.
    ///
    /// Tier-2 persistence is deferred to the next [`Self::checkpoint`].
    pub fn store(
        &self,
        _binary_id: &str,
        guest_addr: u64,
        guest_bytes: &[u8],
        host_offset: HostOffset,
        host_size: u32,
    ) {
        let record = TranslationRecord {
            guest_addr,
            fingerprint: fingerprint(guest_bytes),
            guest_size: guest_bytes.len() as u32,
            host_size,
            host_offset: Some(host_offset),
        };
        self.inner.lock().tier1.insert(Tier1Entry::new(record, 1));
    }

    /// Finish a tier-2 promotion: the caller has copied the payload to
    /// `host_offset` and the entry now joins tier 1 as a fresh entry.
    pub fn bind_host(&self, record: &TranslationRecord, host_offset: HostOffset) {
        let bound = TranslationRecord {
            host_offset: Some(host_offset),
            ..*record
        };
        self.inner.lock().tier1.insert(Tier1Entry::new(bound, 1));
    }

    /// Persist the current tier-1 set plus its host payloads as a single
    /// cache-file image, queued on the persistence engine.
    ///
    /// Runs under the cache lock for its whole duration, so lookups
    /// serialise with it; the write itself is asynchronous. Entries whose
    /// arena slot is unbound or out of `arena` bounds are skipped.
    pub fn checkpoint(&self, binary_id: &str, arena: &[u8]) -> Result<()> {
        let inner = self.inner.lock();
        let descriptor = inner
            .binaries
            .get(binary_id)
            .cloned()
            .ok_or_else(|| CacheError::UnknownBinary(binary_id.to_owned()))?;

        let now = unix_now();
        let mut entries: Vec<(FileEntry, &[u8])> = Vec::new();
        for entry in inner.tier1.iter() {
            let Some(HostOffset(offset)) = entry.record.host_offset else {
                continue;
            };
            let start = offset as usize;
            let end = start + entry.record.host_size as usize;
            let Some(payload) = arena.get(start..end) else {
                warn!(
                    guest_addr = entry.record.guest_addr,
                    "checkpoint skipping entry outside the arena"
                );
                continue;
            };
            entries.push((
                FileEntry {
                    guest_addr: entry.record.guest_addr,
                    guest_size: entry.record.guest_size,
                    guest_fp: entry.record.fingerprint,
                    host_offset: 0, // prefix sum assigned during encoding
                    host_size: entry.record.host_size,
                    exec_count: entry.access_count,
                    last_exec: now,
                    flags: entry.flags,
                },
                payload,
            ));
        }

        let image = tier2::build_image(descriptor.fingerprint, &entries)?;
        self.engine
            .queue_write(descriptor.path.clone(), image, 0, None)?;
        Ok(())
    }

    /// Drop every tier-1 entry. Tier-2 files are untouched.
    pub fn clear_tier1(&self) {
        self.inner.lock().tier1.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            l1_hits: inner.l1_hits,
            l2_hits: inner.l2_hits,
            misses: inner.misses,
            entries: inner.tier1.len(),
        }
    }
}
