//! Tier-2 file access: header-validated reads and advisory in-place
//! counter updates. All functions here take an immutable descriptor and do
//! their I/O without any cache lock held.

use std::fs::OpenOptions;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::format::{
    FileEntry, FileHeader, ENTRY_EXEC_COUNT_AT, ENTRY_LAST_EXEC_AT, HEADER_HIT_COUNT_AT,
    HEADER_LAST_ACCESS_AT,
};
use crate::io::WriteLeExt;
use crate::{unix_now, CacheError, Result};

/// Immutable description of a registered binary's cache file.
#[derive(Debug, Clone)]
pub(crate) struct BinaryDescriptor {
    pub path: PathBuf,
    pub fingerprint: u64,
}

pub(crate) struct Tier2Hit {
    pub entry: FileEntry,
    pub host_bytes: Vec<u8>,
}

/// Look up `(guest_addr, fp)` in the descriptor's cache file.
///
/// `Ok(None)` covers both "no such record" and every degraded condition: a
/// missing file, a truncated file, or a failed header validation. The file
/// is only modified after it has fully validated and yielded a hit, and
/// even then the counter updates are advisory.
pub(crate) fn lookup(
    desc: &BinaryDescriptor,
    guest_addr: u64,
    fp: u64,
) -> Result<Option<Tier2Hit>> {
    let file = match std::fs::File::open(&desc.path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let header = FileHeader::decode(&mut reader, desc.fingerprint)?;

    let mut found: Option<(u32, FileEntry)> = None;
    for index in 0..header.entry_count {
        let entry = FileEntry::decode(&mut reader)?;
        if entry.guest_addr == guest_addr && entry.guest_fp == fp {
            found = Some((index, entry));
            break;
        }
    }
    let Some((index, entry)) = found else {
        return Ok(None);
    };

    // The payload section starts after the full entry table.
    let payload_start = FileEntry::offset_in_file(header.entry_count);
    let in_bounds = entry
        .host_offset
        .checked_add(u64::from(entry.host_size))
        .and_then(|end| payload_start.checked_add(end))
        .is_some_and(|end| end <= file_len);
    if !in_bounds {
        return Err(CacheError::Corrupt("host payload out of bounds"));
    }

    let mut reader = reader.into_inner();
    reader.seek(SeekFrom::Start(payload_start + entry.host_offset))?;
    let mut host_bytes = vec![0u8; entry.host_size as usize];
    reader.read_exact(&mut host_bytes)?;

    let mut updated = entry;
    updated.exec_count = updated.exec_count.saturating_add(1);
    updated.last_exec = unix_now();
    if let Err(err) = record_hit(&desc.path, &header, index, &updated) {
        warn!(path = %desc.path.display(), error = %err, "tier-2 counter update failed");
    }

    Ok(Some(Tier2Hit {
        entry: updated,
        host_bytes,
    }))
}

/// Seek-write the header hit counters and one entry's execution counters.
fn record_hit(path: &Path, header: &FileHeader, index: u32, entry: &FileEntry) -> Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    file.seek(SeekFrom::Start(HEADER_LAST_ACCESS_AT))?;
    file.write_u64_le(entry.last_exec)?;
    file.seek(SeekFrom::Start(HEADER_HIT_COUNT_AT))?;
    file.write_u32_le(header.hit_count.saturating_add(1))?;

    let entry_at = FileEntry::offset_in_file(index);
    file.seek(SeekFrom::Start(entry_at + ENTRY_EXEC_COUNT_AT))?;
    file.write_u32_le(entry.exec_count)?;
    file.seek(SeekFrom::Start(entry_at + ENTRY_LAST_EXEC_AT))?;
    file.write_u64_le(entry.last_exec)?;

    file.flush()?;
    Ok(())
}

/// Serialise a complete cache image: header, entry table with prefix-sum
/// host offsets, payload.
pub(crate) fn build_image(
    binary_fp: u64,
    entries: &[(FileEntry, &[u8])],
) -> Result<Vec<u8>> {
    let now = unix_now();
    let header = FileHeader {
        entry_count: entries.len() as u32,
        binary_fp,
        create_ts: now,
        last_access: now,
        hit_count: 0,
    };

    let mut image = Vec::new();
    header.encode(&mut image)?;

    let mut running_offset = 0u64;
    for (entry, payload) in entries {
        let mut on_disk = *entry;
        on_disk.host_offset = running_offset;
        on_disk.host_size = payload.len() as u32;
        on_disk.encode(&mut image)?;
        running_offset += payload.len() as u64;
    }
    for (_, payload) in entries {
        image.write_all(payload).map_err(CacheError::Io)?;
    }

    Ok(image)
}
