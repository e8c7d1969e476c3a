//! Asynchronous persistence for translation cache files.
//!
//! A single background worker drains a FIFO queue of write jobs, so all
//! writes to one file land in submission order. Failures never propagate
//! into the translator: a failed job fires its completion callback with
//! `false`, bumps a counter, and is otherwise forgotten.
//!
//! The worker also performs periodic housekeeping: when the cache
//! directory's `*.cache` files exceed the configured size cap, the oldest
//! files (by modification time) are deleted until the total drops to 80 %
//! of the cap.

mod engine;
mod housekeeping;

pub use crate::engine::{Completion, PersistStats, PersistenceEngine, WriteJob};
pub use crate::housekeeping::{run_housekeeping, HousekeepingReport};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Extension of the cache files housekeeping manages.
pub const CACHE_FILE_EXTENSION: &str = "cache";

/// Fraction of the size cap housekeeping prunes down to.
pub const HOUSEKEEPING_LOW_WATER: f64 = 0.8;

pub type Result<T> = std::result::Result<T, PersistError>;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence worker is gone")]
    WorkerGone,
}

/// Persistence engine configuration.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Directory housekeeping scans for `*.cache` files.
    pub cache_dir: PathBuf,
    /// Size cap housekeeping enforces over the cache directory.
    pub max_total_bytes: u64,
    /// How often the worker runs housekeeping.
    pub housekeeping_interval: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            max_total_bytes: 1024 * 1024 * 1024,
            housekeeping_interval: Duration::from_secs(3600),
        }
    }
}
