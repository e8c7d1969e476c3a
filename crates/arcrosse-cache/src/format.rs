//! On-disk cache file format.
//!
//! ```text
//! [ 64-byte header ][ entry_count x 64-byte entries ][ payload ]
//! ```
//!
//! Records are 64 bytes with natural-alignment padding baked into the
//! layout. The field offsets below are part of the format and are relied
//! on for in-place counter updates:
//!
//! ```text
//! header: magic u64 @0, version u32 @8, entry_count u32 @12,
//!         binary_fp u64 @16, create_ts u64 @24, last_access u64 @32,
//!         hit_count u32 @40, reserved @44..60, pad @60..64
//! entry:  guest_addr u64 @0, guest_size u32 @8, pad @12..16,
//!         guest_fp u64 @16, host_offset u64 @24, host_size u32 @32,
//!         exec_count u32 @36, last_exec u64 @40, flags u32 @48,
//!         reserved @52..64
//! ```
//!
//! `host_offset` is relative to the start of the payload section and is
//! recomputed as a prefix sum on every checkpoint; it carries no address
//! meaning.

use std::io::{Read, Write};

use crate::io::{ReadLeExt, WriteLeExt};
use crate::{CacheError, Result};

/// `ARCROSSE` read as a big-endian u64.
pub const CACHE_MAGIC: u64 = 0x4152_4352_4F53_5345;
pub const CACHE_VERSION: u32 = 1;

pub const HEADER_LEN: u64 = 64;
pub const ENTRY_LEN: u64 = 64;

/// Field offsets used for in-place updates on a stable file.
pub(crate) const HEADER_LAST_ACCESS_AT: u64 = 32;
pub(crate) const HEADER_HIT_COUNT_AT: u64 = 40;
pub(crate) const ENTRY_EXEC_COUNT_AT: u64 = 36;
pub(crate) const ENTRY_LAST_EXEC_AT: u64 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub entry_count: u32,
    pub binary_fp: u64,
    pub create_ts: u64,
    pub last_access: u64,
    pub hit_count: u32,
}

impl FileHeader {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64_le(CACHE_MAGIC)?;
        w.write_u32_le(CACHE_VERSION)?;
        w.write_u32_le(self.entry_count)?;
        w.write_u64_le(self.binary_fp)?;
        w.write_u64_le(self.create_ts)?;
        w.write_u64_le(self.last_access)?;
        w.write_u32_le(self.hit_count)?;
        w.write_zeroes(20)?;
        Ok(())
    }

    /// Decode and validate a header.
    ///
    /// `expected_fp` must match the stored binary fingerprint; magic and
    /// version must match exactly. Validation failure means the file is not
    /// ours to touch.
    pub fn decode<R: Read>(r: &mut R, expected_fp: u64) -> Result<Self> {
        if r.read_u64_le()? != CACHE_MAGIC {
            return Err(CacheError::Corrupt("bad magic"));
        }
        if r.read_u32_le()? != CACHE_VERSION {
            return Err(CacheError::Corrupt("unsupported version"));
        }
        let entry_count = r.read_u32_le()?;
        let binary_fp = r.read_u64_le()?;
        let create_ts = r.read_u64_le()?;
        let last_access = r.read_u64_le()?;
        let hit_count = r.read_u32_le()?;
        r.skip(20)?;

        if binary_fp != expected_fp {
            return Err(CacheError::ForeignBinary);
        }

        Ok(Self {
            entry_count,
            binary_fp,
            create_ts,
            last_access,
            hit_count,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileEntry {
    pub guest_addr: u64,
    pub guest_size: u32,
    pub guest_fp: u64,
    pub host_offset: u64,
    pub host_size: u32,
    pub exec_count: u32,
    pub last_exec: u64,
    pub flags: u32,
}

impl FileEntry {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64_le(self.guest_addr)?;
        w.write_u32_le(self.guest_size)?;
        w.write_zeroes(4)?;
        w.write_u64_le(self.guest_fp)?;
        w.write_u64_le(self.host_offset)?;
        w.write_u32_le(self.host_size)?;
        w.write_u32_le(self.exec_count)?;
        w.write_u64_le(self.last_exec)?;
        w.write_u32_le(self.flags)?;
        w.write_zeroes(12)?;
        Ok(())
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self> {
        let guest_addr = r.read_u64_le()?;
        let guest_size = r.read_u32_le()?;
        r.skip(4)?;
        let guest_fp = r.read_u64_le()?;
        let host_offset = r.read_u64_le()?;
        let host_size = r.read_u32_le()?;
        let exec_count = r.read_u32_le()?;
        let last_exec = r.read_u64_le()?;
        let flags = r.read_u32_le()?;
        r.skip(12)?;

        Ok(Self {
            guest_addr,
            guest_size,
            guest_fp,
            host_offset,
            host_size,
            exec_count,
            last_exec,
            flags,
        })
    }

    /// Byte offset of entry `index`'s record within the file.
    pub fn offset_in_file(index: u32) -> u64 {
        HEADER_LEN + u64::from(index) * ENTRY_LEN
    }
}
