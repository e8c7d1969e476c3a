//! Two-tier translation cache.
//!
//! Tier 1 is an in-memory table of recently used translations with an
//! LRU-plus-hotness eviction policy; tier 2 is one binary-encoded
//! `<binary-id>.cache` file per loaded guest binary. Lookups try tier 1
//! under the cache mutex, then tier 2 outside it; tier-2 hits hand their
//! payload back to the caller, who copies it into the host arena and
//! re-binds the promoted entry with [`TranslationCache::bind_host`].
//!
//! Every tier-2 read failure — missing file, short file, bad magic, bad
//! version, foreign binary fingerprint — degrades silently to a miss, and a
//! file that fails validation is never written to.

mod cache;
mod format;
mod io;
mod tier1;
mod tier2;

pub use crate::cache::{CacheStats, Lookup, TranslationCache};
pub use crate::format::{FileEntry, FileHeader, CACHE_MAGIC, CACHE_VERSION, ENTRY_LEN, HEADER_LEN};
pub use crate::tier1::{HostOffset, TranslationRecord};

use std::path::PathBuf;

use thiserror::Error;

/// Tier-1 capacity, in entries.
pub const MAX_L1_ENTRIES: usize = 1024;

/// Access count beyond which an entry counts as hot.
pub const HOT_THRESHOLD: u32 = 10;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error on cache file: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache file: {0}")]
    Corrupt(&'static str),

    #[error("cache file belongs to a different binary")]
    ForeignBinary,

    #[error("unknown binary id {0:?}")]
    UnknownBinary(String),

    #[error("persistence engine unavailable: {0}")]
    Persist(#[from] arcrosse_persist::PersistError),
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding `<binary-id>.cache` files.
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./cache"),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
