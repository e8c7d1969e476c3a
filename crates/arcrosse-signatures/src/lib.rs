//! Code-block signatures and fuzzy matching.
//!
//! A signature marks a class of byte sequences recognised as equivalent: a
//! fingerprint, a per-byte significance mask, and a similarity threshold.
//! The store answers "have we seen a block shaped like this" both exactly
//! (by fingerprint) and fuzzily (masked byte similarity), and persists to a
//! packed little-endian database file.

pub mod analysis;
mod db;
mod store;

pub use crate::store::{
    generate_mask, identify_patterns, masked_similarity, BlockKind, BlockSignature, KindCounts,
    SignatureStore, MIN_PATTERN_LEN,
};

use thiserror::Error;

/// File name of the persisted signature database inside the cache
/// directory.
pub const SIGNATURES_DB_FILE: &str = "signatures.db";

pub type Result<T> = std::result::Result<T, SignatureError>;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("io error on signature database: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt signature database: {0}")]
    Corrupt(&'static str),
}
