//! Translator facade: the block-at-a-time translate-or-reuse loop.
//!
//! The facade owns the guest and host memory arenas and wires the decoder,
//! the rule table, the signature store, the two-tier cache, and the
//! persistence engine around one loop: resolve the block at the program
//! pointer (cache hit or fresh translation), dispatch it, advance.
//! Dispatching into emitted code is a collaborator concern behind the
//! [`Dispatcher`] trait; this crate never executes anything.

mod arena;
mod cpu;
mod stats;
mod translator;

pub use crate::arena::HostArena;
pub use crate::cpu::{CpuState, Dispatcher};
pub use crate::stats::{
    BlockStatsReport, CacheReport, ExecutionStatsReport, SignatureReport, TopBlock,
    TranslatorStats,
};
pub use crate::translator::Translator;

use std::path::PathBuf;

use thiserror::Error;

/// Blocks executed at least this often count as hot for optimisation.
pub const HOT_BLOCK_MIN_EXECUTIONS: u64 = 10;

/// Upper bound on blocks handed to the optimisation hook per pass.
pub const MAX_BLOCKS_TO_OPTIMIZE: usize = 20;

/// How many blocks the teardown statistics list.
pub const TOP_BLOCKS_IN_STATS: usize = 10;

pub type Result<T> = std::result::Result<T, TranslatorError>;

#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("guest binary of {needed} bytes exceeds the {capacity}-byte guest arena")]
    GuestArenaExhausted { needed: usize, capacity: usize },

    #[error("guest address {guest_addr:#x} is outside the loaded binary")]
    AddressOutOfRange { guest_addr: u64 },

    #[error("no binary loaded")]
    NoBinaryLoaded,

    #[error(transparent)]
    Cache(#[from] arcrosse_cache::CacheError),

    #[error(transparent)]
    Persist(#[from] arcrosse_persist::PersistError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Facade configuration.
///
/// Arena capacities are configuration, not constants: the right sizes
/// depend on the workload, and exhaustion is surfaced rather than hidden
/// behind a silently grown allocation.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub guest_arena_bytes: usize,
    pub host_arena_bytes: usize,
    /// Directory for cache files and the signature database.
    pub cache_dir: PathBuf,
    /// Directory the definition text files are loaded from and seeded to.
    pub defs_dir: PathBuf,
    /// Where the teardown statistics JSON goes; `None` disables it.
    pub stats_path: Option<PathBuf>,
    /// A non-blocking checkpoint is issued every this many dispatches.
    pub checkpoint_every: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            guest_arena_bytes: 1024 * 1024,
            host_arena_bytes: 1024 * 1024,
            cache_dir: PathBuf::from("./cache"),
            defs_dir: PathBuf::from("."),
            stats_path: Some(PathBuf::from("stats.json")),
            checkpoint_every: 100,
        }
    }
}
