use std::collections::{HashMap, HashSet};

use arcrosse_hash::fingerprint;
use tracing::warn;

/// Minimum length of a byte sequence considered by [`identify_patterns`].
pub const MIN_PATTERN_LEN: usize = 16;

/// Classification tag attached to a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Generic,
    Function,
    Loop,
    Branch,
    Simd,
    Hotspot,
}

impl BlockKind {
    pub fn as_tag(self) -> u32 {
        match self {
            BlockKind::Generic => 0,
            BlockKind::Function => 1,
            BlockKind::Loop => 2,
            BlockKind::Branch => 3,
            BlockKind::Simd => 4,
            BlockKind::Hotspot => 5,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => BlockKind::Generic,
            1 => BlockKind::Function,
            2 => BlockKind::Loop,
            3 => BlockKind::Branch,
            4 => BlockKind::Simd,
            5 => BlockKind::Hotspot,
            _ => return None,
        })
    }
}

/// A code-block signature.
///
/// `reference` holds the bytes the signature was derived from and is what
/// fuzzy queries are compared against. The on-disk database format carries
/// no reference bytes, so signatures loaded from disk come back with an
/// empty reference and participate in exact matching only.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSignature {
    pub fingerprint: u64,
    pub kind: BlockKind,
    pub address: u64,
    pub len: usize,
    pub mask: Vec<u8>,
    pub threshold: f32,
    pub reference: Vec<u8>,
}

impl BlockSignature {
    /// Build a signature from reference bytes. The fingerprint and length
    /// are derived, keeping `mask.len() == len` the caller's only burden.
    pub fn from_reference(
        reference: &[u8],
        kind: BlockKind,
        address: u64,
        mask: Vec<u8>,
        threshold: f32,
    ) -> Self {
        Self {
            fingerprint: fingerprint(reference),
            kind,
            address,
            len: reference.len(),
            mask,
            threshold,
            reference: reference.to_vec(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.mask.len() == self.len
    }

    fn fuzzy_capable(&self) -> bool {
        self.reference.len() == self.len
    }
}

/// Per-kind signature totals, reported in the teardown statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub generic: usize,
    pub function: usize,
    pub loops: usize,
    pub branch: usize,
    pub simd: usize,
    pub hotspot: usize,
}

/// Signature store keyed by fingerprint.
#[derive(Debug, Default)]
pub struct SignatureStore {
    pub(crate) table: HashMap<u64, BlockSignature>,
    match_cache: HashMap<u64, u64>,
}

impl SignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a signature, replacing any prior entry with the same
    /// fingerprint. Ill-formed signatures (mask length mismatch) are
    /// rejected.
    pub fn insert(&mut self, sig: BlockSignature) -> bool {
        if !sig.is_well_formed() {
            warn!(
                fingerprint = format_args!("{:#018x}", sig.fingerprint),
                mask_len = sig.mask.len(),
                len = sig.len,
                "rejecting signature with mismatched mask length"
            );
            return false;
        }
        self.table.insert(sig.fingerprint, sig);
        true
    }

    /// Find a signature matching `bytes`, exactly or fuzzily.
    ///
    /// Fuzzy hits are memoised by query fingerprint; the memo is validated
    /// against the live table so `clear`/replacement cannot resurrect a
    /// removed signature.
    pub fn find(&mut self, bytes: &[u8]) -> Option<&BlockSignature> {
        let fp = fingerprint(bytes);

        if let Some(&stored) = self.match_cache.get(&fp) {
            if self.table.contains_key(&stored) {
                return self.table.get(&stored);
            }
            self.match_cache.remove(&fp);
        }

        if self.table.contains_key(&fp) {
            return self.table.get(&fp);
        }

        let matched = self.table.values().find_map(|sig| {
            let candidate = sig.len == bytes.len()
                && sig.fuzzy_capable()
                && masked_similarity(bytes, &sig.reference, &sig.mask) >= sig.threshold;
            candidate.then_some(sig.fingerprint)
        })?;

        self.match_cache.insert(fp, matched);
        self.table.get(&matched)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.match_cache.clear();
    }

    pub fn kind_counts(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for sig in self.table.values() {
            match sig.kind {
                BlockKind::Generic => counts.generic += 1,
                BlockKind::Function => counts.function += 1,
                BlockKind::Loop => counts.loops += 1,
                BlockKind::Branch => counts.branch += 1,
                BlockKind::Simd => counts.simd += 1,
                BlockKind::Hotspot => counts.hotspot += 1,
            }
        }
        counts
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockSignature> {
        self.table.values()
    }
}

/// Masked byte similarity between `a` and `b`.
///
/// Only positions where `mask[i] == 1` participate. Returns the fraction of
/// participating positions whose bytes match, 0.0 when no position
/// participates or when any length differs.
pub fn masked_similarity(a: &[u8], b: &[u8], mask: &[u8]) -> f32 {
    if a.len() != b.len() || a.len() != mask.len() {
        return 0.0;
    }

    let mut matches = 0usize;
    let mut total = 0usize;
    for i in 0..a.len() {
        if mask[i] == 1 {
            total += 1;
            if a[i] == b[i] {
                matches += 1;
            }
        }
    }

    if total > 0 {
        matches as f32 / total as f32
    } else {
        0.0
    }
}

/// Derive a significance mask from variant samples of the same code shape.
///
/// Starts all-ones over the first variant and zeroes every position where
/// any other variant differs. A variant of different length makes the whole
/// shape unmaskable: the result is all zeros.
pub fn generate_mask<B: AsRef<[u8]>>(variants: &[B]) -> Vec<u8> {
    let Some(reference) = variants.first() else {
        return Vec::new();
    };
    let reference = reference.as_ref();
    let mut mask = vec![1u8; reference.len()];

    for variant in &variants[1..] {
        let variant = variant.as_ref();
        if variant.len() != reference.len() {
            return vec![0u8; reference.len()];
        }
        for (i, (r, v)) in reference.iter().zip(variant).enumerate() {
            if r != v {
                mask[i] = 0;
            }
        }
    }

    mask
}

/// Mine recurring byte sequences across decoded blocks.
///
/// Sequences of at least [`MIN_PATTERN_LEN`] bytes that occur in three or
/// more distinct blocks become Generic signatures with an auto-generated
/// mask and a 0.9 similarity threshold. Quadratic in block length; intended
/// as an offline cold path.
pub fn identify_patterns(blocks: &[Vec<u8>], base_addresses: &[u64]) -> Vec<BlockSignature> {
    debug_assert_eq!(blocks.len(), base_addresses.len());

    let mut emitted: HashSet<u64> = HashSet::new();
    let mut patterns = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        for pattern_len in MIN_PATTERN_LEN..=block.len() / 2 {
            for start in 0..=block.len() - pattern_len {
                let pattern = &block[start..start + pattern_len];
                let pattern_fp = fingerprint(pattern);
                if emitted.contains(&pattern_fp) {
                    continue;
                }

                let mut occurrences = vec![pattern.to_vec()];
                for (j, other) in blocks.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    if let Some(pos) = find_subslice(other, pattern) {
                        occurrences.push(other[pos..pos + pattern_len].to_vec());
                    }
                }

                if occurrences.len() >= 3 {
                    emitted.insert(pattern_fp);
                    let mask = generate_mask(&occurrences);
                    let address = base_addresses.get(i).copied().unwrap_or(0) + start as u64;
                    patterns.push(BlockSignature::from_reference(
                        pattern,
                        BlockKind::Generic,
                        address,
                        mask,
                        0.9,
                    ));
                }
            }
        }
    }

    patterns
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
