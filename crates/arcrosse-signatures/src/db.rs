//! Packed little-endian signature database.
//!
//! Layout: `count: u32`, then per entry `fingerprint: u64, kind: u32,
//! address: u64, len: u64, threshold: f32, mask_len: u32, mask bytes`.
//! Reference bytes are not part of the format; loaded signatures are
//! exact-match-only.

use std::path::Path;

use tracing::warn;

use crate::store::{BlockKind, BlockSignature, SignatureStore};
use crate::{Result, SignatureError};

impl SignatureStore {
    /// Serialise every signature to `path`, replacing the file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let count: u32 = self
            .table
            .len()
            .try_into()
            .map_err(|_| SignatureError::Corrupt("too many signatures for the database format"))?;
        buf.extend_from_slice(&count.to_le_bytes());

        for sig in self.table.values() {
            buf.extend_from_slice(&sig.fingerprint.to_le_bytes());
            buf.extend_from_slice(&sig.kind.as_tag().to_le_bytes());
            buf.extend_from_slice(&sig.address.to_le_bytes());
            buf.extend_from_slice(&(sig.len as u64).to_le_bytes());
            buf.extend_from_slice(&sig.threshold.to_le_bytes());
            let mask_len: u32 = sig
                .mask
                .len()
                .try_into()
                .map_err(|_| SignatureError::Corrupt("mask too long for the database format"))?;
            buf.extend_from_slice(&mask_len.to_le_bytes());
            buf.extend_from_slice(&sig.mask);
        }

        std::fs::write(path, buf)?;
        Ok(())
    }

    /// Load signatures from `path` into the store, merging with (and
    /// replacing fingerprint-collisions among) existing entries.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        let bytes = std::fs::read(path)?;
        let mut cursor = DbCursor::new(&bytes);

        let count = cursor.u32()?;
        let mut loaded = 0;
        for _ in 0..count {
            let fingerprint = cursor.u64()?;
            let kind_tag = cursor.u32()?;
            let address = cursor.u64()?;
            let len = cursor.u64()? as usize;
            let threshold = cursor.f32()?;
            let mask_len = cursor.u32()? as usize;
            let mask = cursor.bytes(mask_len)?.to_vec();

            let Some(kind) = BlockKind::from_tag(kind_tag) else {
                warn!(tag = kind_tag, "unknown block kind tag in signature db, skipping entry");
                continue;
            };

            let sig = BlockSignature {
                fingerprint,
                kind,
                address,
                len,
                mask,
                threshold,
                reference: Vec::new(),
            };
            if self.insert(sig) {
                loaded += 1;
            }
        }

        Ok(loaded)
    }
}

struct DbCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DbCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or(SignatureError::Corrupt("truncated signature database"))?;
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32(&mut self) -> Result<f32> {
        let b = self.bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
