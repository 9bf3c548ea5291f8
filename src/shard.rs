//! On-disk paged shard file (component B).
//!
//! A shard holds every posting whose `term_hash mod N_shards` selects it,
//! for one logical index. The file is a sequence of pages; a sibling
//! `.keys` file holds a dense directory of `shard_hash_table_size` 8-byte
//! offsets, so `find` is always a directory read plus a single page scan.
//!
//! Reads prefer `memmap2` (matching §5's "mmap is preferred where the
//! platform supports it"); a missing or empty file is treated as a shard
//! with zero keys rather than an error, and a structurally broken page is
//! logged and treated as empty rather than propagated, per §4.B/§7.

use crate::config::EMPTY_SLOT;
use crate::error::{EngineError, Result};
use crate::record::PostingRecord;

use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A read-only view of one shard's data + key-directory files.
pub struct Shard<R: PostingRecord> {
    shard_id: usize,
    data_path: PathBuf,
    keys_path: PathBuf,
    table_size: usize,
    data: Option<Mmap>,
    keys: Option<Mmap>,
    _marker: PhantomData<R>,
}

impl<R: PostingRecord> Shard<R> {
    /// Open (or recognize as empty) the shard at `data_path`/`keys_path`.
    /// Missing files are not an error: the shard simply reports zero
    /// keys until the first `merge` creates them.
    pub fn open(shard_id: usize, data_path: impl AsRef<Path>, keys_path: impl AsRef<Path>, table_size: usize) -> Result<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        let keys_path = keys_path.as_ref().to_path_buf();

        let data = mmap_if_nonempty(&data_path)?;
        let keys = mmap_if_nonempty(&keys_path)?;

        Ok(Self {
            shard_id,
            data_path,
            keys_path,
            table_size,
            data,
            keys,
            _marker: PhantomData,
        })
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    /// Number of occupied directory slots. O(table_size); used only by
    /// diagnostics/tests, never on the query hot path.
    pub fn key_count(&self) -> usize {
        let Some(keys) = &self.keys else { return 0 };
        (0..self.table_size)
            .filter(|&slot| read_slot(keys, slot) != EMPTY_SLOT)
            .count()
    }

    /// Return the posting list for `key` in sectioned value-ascending
    /// order, plus the pre-truncation total seen for that key. Absent
    /// keys and quarantined (corrupt) shards both return an empty list
    /// with total 0 — never an error.
    pub fn find(&self, key: u64) -> Result<(Vec<R>, u64)> {
        let (Some(data), Some(keys)) = (&self.data, &self.keys) else {
            return Ok((Vec::new(), 0));
        };

        let slot = (key as usize) % self.table_size.max(1);
        let offset = read_slot(keys, slot);
        if offset == EMPTY_SLOT {
            return Ok((Vec::new(), 0));
        }

        match self.read_page(data, offset as usize, key) {
            Ok(found) => Ok(found.unwrap_or((Vec::new(), 0))),
            Err(reason) => {
                log::warn!(
                    "shard {} ({}): quarantining corrupt page at offset {}: {}",
                    self.shard_id,
                    self.data_path.display(),
                    offset,
                    reason
                );
                Ok((Vec::new(), 0))
            }
        }
    }

    fn read_page(&self, data: &Mmap, offset: usize, key: u64) -> std::result::Result<Option<(Vec<R>, u64)>, String> {
        let read_u64 = |at: usize| -> std::result::Result<u64, String> {
            data.get(at..at + 8)
                .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
                .ok_or_else(|| format!("truncated file reading u64 at {at}"))
        };

        let num_keys = read_u64(offset)? as usize;
        // A page listing more keys than fit in the rest of the file is
        // corrupt by construction; bound it before any allocation sized
        // from untrusted input.
        let header_bytes = num_keys
            .checked_mul(32)
            .ok_or_else(|| "key count overflow".to_string())?;
        let keys_start = offset + 8;
        if data.len() < keys_start + header_bytes {
            return Err(format!("page header extends past end of file ({num_keys} keys)"));
        }

        let positions_start = keys_start + num_keys * 8;
        let lengths_start = positions_start + num_keys * 8;
        let totals_start = lengths_start + num_keys * 8;
        let data_start = totals_start + num_keys * 8;

        // Binary search: keys are stored ascending.
        let key_at = |i: usize| -> std::result::Result<u64, String> { read_u64(keys_start + i * 8) };

        let mut lo = 0usize;
        let mut hi = num_keys;
        let mut found_idx = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let k = key_at(mid)?;
            match k.cmp(&key) {
                std::cmp::Ordering::Equal => {
                    found_idx = Some(mid);
                    break;
                }
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }

        let Some(idx) = found_idx else {
            return Ok(None);
        };

        let position = read_u64(positions_start + idx * 8)? as usize;
        let length = read_u64(lengths_start + idx * 8)? as usize;
        let total = read_u64(totals_start + idx * 8)?;

        if length % R::ENCODED_LEN != 0 {
            return Err(format!("posting run length {length} is not a multiple of record size {}", R::ENCODED_LEN));
        }

        let run_start = data_start + position;
        let run_end = run_start
            .checked_add(length)
            .ok_or_else(|| "posting run length overflow".to_string())?;
        let bytes = data
            .get(run_start..run_end)
            .ok_or_else(|| format!("posting run [{run_start}, {run_end}) extends past end of file"))?;

        let mut records = Vec::with_capacity(length / R::ENCODED_LEN);
        for chunk in bytes.chunks_exact(R::ENCODED_LEN) {
            match R::decode(chunk) {
                Some(rec) => records.push(rec),
                None => return Err("failed to decode posting record".to_string()),
            }
        }

        Ok(Some((records, total)))
    }

    /// Enumerate every `(key, records, total)` currently stored, in no
    /// particular key order. Used by `builder::merge` step 1 ("read the
    /// current shard file fully into memory, per key, restoring
    /// totals") to seed the merge bucket before folding in the cache.
    pub fn all_entries(&self) -> Vec<(u64, Vec<R>, u64)> {
        let (Some(data), Some(keys)) = (&self.data, &self.keys) else {
            return Vec::new();
        };

        let mut seen_offsets = std::collections::HashSet::new();
        let mut out = Vec::new();
        for slot in 0..self.table_size {
            let offset = read_slot(keys, slot);
            if offset == EMPTY_SLOT || !seen_offsets.insert(offset) {
                continue;
            }
            match self.read_full_page(data, offset as usize) {
                Ok(entries) => out.extend(entries),
                Err(reason) => {
                    log::warn!(
                        "shard {} ({}): quarantining corrupt page at offset {} during enumeration: {}",
                        self.shard_id,
                        self.data_path.display(),
                        offset,
                        reason
                    );
                }
            }
        }
        out
    }

    fn read_full_page(&self, data: &Mmap, offset: usize) -> std::result::Result<Vec<(u64, Vec<R>, u64)>, String> {
        let read_u64 = |at: usize| -> std::result::Result<u64, String> {
            data.get(at..at + 8)
                .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
                .ok_or_else(|| format!("truncated file reading u64 at {at}"))
        };

        let num_keys = read_u64(offset)? as usize;
        let header_bytes = num_keys
            .checked_mul(32)
            .ok_or_else(|| "key count overflow".to_string())?;
        let keys_start = offset + 8;
        if data.len() < keys_start + header_bytes {
            return Err(format!("page header extends past end of file ({num_keys} keys)"));
        }

        let positions_start = keys_start + num_keys * 8;
        let lengths_start = positions_start + num_keys * 8;
        let totals_start = lengths_start + num_keys * 8;
        let data_start = totals_start + num_keys * 8;

        let mut out = Vec::with_capacity(num_keys);
        for i in 0..num_keys {
            let key = read_u64(keys_start + i * 8)?;
            let position = read_u64(positions_start + i * 8)? as usize;
            let length = read_u64(lengths_start + i * 8)? as usize;
            let total = read_u64(totals_start + i * 8)?;

            if length % R::ENCODED_LEN != 0 {
                return Err(format!("posting run length {length} is not a multiple of record size {}", R::ENCODED_LEN));
            }
            let run_start = data_start + position;
            let run_end = run_start
                .checked_add(length)
                .ok_or_else(|| "posting run length overflow".to_string())?;
            let bytes = data
                .get(run_start..run_end)
                .ok_or_else(|| format!("posting run [{run_start}, {run_end}) extends past end of file"))?;

            let mut records = Vec::with_capacity(length / R::ENCODED_LEN);
            for chunk in bytes.chunks_exact(R::ENCODED_LEN) {
                match R::decode(chunk) {
                    Some(rec) => records.push(rec),
                    None => return Err("failed to decode posting record".to_string()),
                }
            }
            out.push((key, records, total));
        }
        Ok(out)
    }

    /// Empty the shard: truncate both files to zero length. The shard
    /// reports zero keys again until the next `merge`.
    pub fn truncate(&mut self) -> Result<()> {
        File::create(&self.data_path)?;
        File::create(&self.keys_path)?;
        self.data = None;
        self.keys = None;
        Ok(())
    }

    /// Reload memory maps after an external writer (e.g. `builder::merge`)
    /// has atomically replaced the underlying files.
    pub fn refresh(&mut self) -> Result<()> {
        self.data = mmap_if_nonempty(&self.data_path)?;
        self.keys = mmap_if_nonempty(&self.keys_path)?;
        Ok(())
    }
}

fn mmap_if_nonempty(path: &Path) -> Result<Option<Mmap>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::Io(e)),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: shard files are only ever mutated by `merge`, which writes
    // a temp file and atomically renames it over the original — this
    // mapping never observes a torn write.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

fn read_slot(keys: &Mmap, slot: usize) -> u64 {
    let at = slot * 8;
    match keys.get(at..at + 8) {
        Some(b) => u64::from_le_bytes(b.try_into().unwrap()),
        None => EMPTY_SLOT,
    }
}

/// One term's worth of postings ready to be written into a page, as
/// assembled by `builder::merge`.
pub struct PageEntry<R: PostingRecord> {
    pub key: u64,
    pub records: Vec<R>,
    pub total: u64,
}

/// Write a brand-new shard file + key directory from a complete set of
/// per-key posting lists, then atomically replace `data_path`/`keys_path`.
/// `entries` need not be sorted; this groups them by slot and sorts keys
/// ascending within each page, satisfying the §3 page-format invariants.
pub fn compact_write<R: PostingRecord>(
    data_path: impl AsRef<Path>,
    keys_path: impl AsRef<Path>,
    table_size: usize,
    entries: Vec<PageEntry<R>>,
) -> Result<()> {
    let data_path = data_path.as_ref();
    let keys_path = keys_path.as_ref();

    let mut by_slot: Vec<Vec<PageEntry<R>>> = (0..table_size).map(|_| Vec::new()).collect();
    for entry in entries {
        let slot = (entry.key as usize) % table_size.max(1);
        by_slot[slot].push(entry);
    }

    let data_tmp = sibling_tmp_path(data_path);
    let keys_tmp = sibling_tmp_path(keys_path);

    let mut directory = vec![EMPTY_SLOT; table_size];
    {
        let mut data_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&data_tmp)?;

        let mut offset: u64 = 0;
        for (slot, mut group) in by_slot.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.key.cmp(&b.key));

            let page_bytes = encode_page(&group);
            data_file.write_all(&page_bytes)?;
            directory[slot] = offset;
            offset += page_bytes.len() as u64;
        }
        data_file.flush()?;
        data_file.sync_all()?;
    }

    {
        let mut keys_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&keys_tmp)?;
        let mut buf = Vec::with_capacity(table_size * 8);
        for slot in &directory {
            buf.extend_from_slice(&slot.to_le_bytes());
        }
        keys_file.write_all(&buf)?;
        keys_file.flush()?;
        keys_file.sync_all()?;
    }

    std::fs::rename(&data_tmp, data_path)?;
    std::fs::rename(&keys_tmp, keys_path)?;
    Ok(())
}

fn encode_page<R: PostingRecord>(group: &[PageEntry<R>]) -> Vec<u8> {
    let num_keys = group.len();
    let mut positions = Vec::with_capacity(num_keys);
    let mut lengths = Vec::with_capacity(num_keys);
    let mut data = Vec::new();

    let mut running = 0u64;
    for entry in group {
        positions.push(running);
        let len = (entry.records.len() * R::ENCODED_LEN) as u64;
        lengths.push(len);
        for rec in &entry.records {
            rec.encode(&mut data);
        }
        running += len;
    }

    let mut out = Vec::with_capacity(8 + num_keys * 32 + data.len());
    out.extend_from_slice(&(num_keys as u64).to_le_bytes());
    for entry in group {
        out.extend_from_slice(&entry.key.to_le_bytes());
    }
    for p in &positions {
        out.extend_from_slice(&p.to_le_bytes());
    }
    for l in &lengths {
        out.extend_from_slice(&l.to_le_bytes());
    }
    for entry in group {
        out.extend_from_slice(&entry.total.to_le_bytes());
    }
    out.extend_from_slice(&data);
    out
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = tmp.file_name().map(|n| n.to_owned()).unwrap_or_default();
    tmp.set_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PageRecord;
    use tempfile::tempdir;

    fn paths(dir: &Path) -> (PathBuf, PathBuf) {
        (dir.join("idx_0.data"), dir.join("idx_0.keys"))
    }

    #[test]
    fn missing_shard_is_empty() {
        let dir = tempdir().unwrap();
        let (data, keys) = paths(dir.path());
        let shard: Shard<PageRecord> = Shard::open(0, &data, &keys, 16).unwrap();
        let (records, total) = shard.find(123).unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn round_trip_single_key() {
        let dir = tempdir().unwrap();
        let (data, keys) = paths(dir.path());

        let records = vec![PageRecord::new(1, 1.0), PageRecord::new(2, 2.0), PageRecord::new(3, 3.0)];
        let entries = vec![PageEntry {
            key: 42,
            records: records.clone(),
            total: 3,
        }];
        compact_write(&data, &keys, 16, entries).unwrap();

        let shard: Shard<PageRecord> = Shard::open(0, &data, &keys, 16).unwrap();
        let (found, total) = shard.find(42).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(total, 3);
        assert_eq!(found[0].value, 1);
        assert_eq!(found[2].value, 3);
    }

    #[test]
    fn collisions_share_one_page() {
        let dir = tempdir().unwrap();
        let (data, keys) = paths(dir.path());
        // table_size 4: keys 1 and 5 collide on slot 1.
        let entries = vec![
            PageEntry { key: 1, records: vec![PageRecord::new(10, 1.0)], total: 1 },
            PageEntry { key: 5, records: vec![PageRecord::new(20, 2.0)], total: 1 },
        ];
        compact_write(&data, &keys, 4, entries).unwrap();

        let shard: Shard<PageRecord> = Shard::open(0, &data, &keys, 4).unwrap();
        let (a, _) = shard.find(1).unwrap();
        let (b, _) = shard.find(5).unwrap();
        assert_eq!(a[0].value, 10);
        assert_eq!(b[0].value, 20);
    }

    #[test]
    fn absent_key_in_occupied_slot_is_empty() {
        let dir = tempdir().unwrap();
        let (data, keys) = paths(dir.path());
        let entries = vec![PageEntry { key: 1, records: vec![PageRecord::new(10, 1.0)], total: 1 }];
        compact_write(&data, &keys, 4, entries).unwrap();

        let shard: Shard<PageRecord> = Shard::open(0, &data, &keys, 4).unwrap();
        // key 5 shares slot 1 with key 1 but was never written.
        let (found, total) = shard.find(5).unwrap();
        assert!(found.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn truncate_empties_shard() {
        let dir = tempdir().unwrap();
        let (data, keys) = paths(dir.path());
        let entries = vec![PageEntry { key: 1, records: vec![PageRecord::new(10, 1.0)], total: 1 }];
        compact_write(&data, &keys, 4, entries).unwrap();

        let mut shard: Shard<PageRecord> = Shard::open(0, &data, &keys, 4).unwrap();
        shard.truncate().unwrap();
        let (found, _) = shard.find(1).unwrap();
        assert!(found.is_empty());
    }
}
