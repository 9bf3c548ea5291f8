//! Shard builder (component C): in-memory accumulation, append-only cache
//! spill, and merge-compaction into the dense shard file.
//!
//! Grounded on `profiles/turbo.rs`'s `build_from_pending` term-bucket
//! accumulation, adapted from an in-memory-only structure to the spec's
//! disk-backed cache/merge cycle, and on the `parking_lot::RwLock`
//! per-shard guard every profile uses, narrowed here to guard the on-disk
//! cache/shard files rather than an in-memory map.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::record::{sort_by_value, PostingRecord};
use crate::shard::{self, PageEntry, Shard};

use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;

/// One shard's builder state: pending in-memory postings plus the paths
/// of its cache and shard files.
pub struct ShardBuilder<R: PostingRecord> {
    shard_id: usize,
    data_path: PathBuf,
    keys_path: PathBuf,
    cache_path: PathBuf,
    cache_keys_path: PathBuf,
    table_size: usize,
    section_size: usize,
    max_sections: usize,
    record_size: usize,
    // Parallel vectors per §4.C: `pending_keys[i]` is the term key for
    // `pending_records[i]`. Guarded together so `add` stays O(1).
    pending: Mutex<(Vec<u64>, Vec<R>)>,
}

impl<R: PostingRecord> ShardBuilder<R> {
    pub fn new(shard_id: usize, data_path: PathBuf, keys_path: PathBuf, cache_path: PathBuf, cache_keys_path: PathBuf, config: &EngineConfig) -> Self {
        Self {
            shard_id,
            data_path,
            keys_path,
            cache_path,
            cache_keys_path,
            table_size: config.shard_hash_table_size,
            section_size: config.section_size,
            max_sections: config.max_sections,
            record_size: R::ENCODED_LEN,
            pending: Mutex::new((Vec::new(), Vec::new())),
        }
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    /// Push one posting into the pending in-memory vectors. O(1) amortized.
    pub fn add(&self, key: u64, record: R) {
        let mut pending = self.pending.lock();
        pending.0.push(key);
        pending.1.push(record);
    }

    /// True once pending bytes exceed `threshold_bytes`.
    pub fn full(&self, threshold_bytes: u64) -> bool {
        let pending = self.pending.lock();
        (pending.1.len() * self.record_size) as u64 > threshold_bytes
    }

    /// True once the combined cache-file size exceeds `threshold_bytes`.
    pub fn should_merge(&self, threshold_bytes: u64) -> Result<bool> {
        let len = match std::fs::metadata(&self.cache_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(len > threshold_bytes)
    }

    /// Flush the pending vectors to the `.cache`/`.cache.keys` files and
    /// clear them. Durability is deferred to `merge`'s `fsync`; this call
    /// only guarantees the bytes reach the OS, not the platter.
    pub fn append(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.1.is_empty() {
            return Ok(());
        }

        let mut cache_file = OpenOptions::new().create(true).append(true).open(&self.cache_path)?;
        let mut record_buf = Vec::with_capacity(pending.1.len() * self.record_size);
        for rec in &pending.1 {
            rec.encode(&mut record_buf);
        }
        cache_file.write_all(&record_buf)?;

        let mut keys_file = OpenOptions::new().create(true).append(true).open(&self.cache_keys_path)?;
        let mut key_buf = Vec::with_capacity(pending.0.len() * 8);
        for key in &pending.0 {
            key_buf.extend_from_slice(&key.to_le_bytes());
        }
        keys_file.write_all(&key_buf)?;

        pending.0.clear();
        pending.1.clear();
        pending.0.shrink_to_fit();
        pending.1.shrink_to_fit();
        Ok(())
    }

    /// Fold the current shard file and the append caches into a fresh
    /// shard file, per the §4.C merge algorithm, then truncate the caches.
    pub fn merge(&self) -> Result<()> {
        // Anything still pending in memory must reach the caches first —
        // merge only ever reads from disk.
        self.append()?;

        let existing: Shard<R> = Shard::open(self.shard_id, &self.data_path, &self.keys_path, self.table_size)?;
        let bucket: DashMap<u64, Vec<R>> = DashMap::new();

        for (key, records, _total) in existing.all_entries() {
            bucket.entry(key).or_default().extend(records);
        }

        let (cache_keys, cache_records) = self.read_cache()?;
        cache_keys
            .par_iter()
            .zip(cache_records.par_iter())
            .for_each(|(&key, &record)| {
                bucket.entry(key).or_default().push(record);
            });

        let max_per_term = self.section_size * self.max_sections;
        let entries: Vec<PageEntry<R>> = bucket
            .into_par_iter()
            .map(|(key, mut records)| {
                sort_by_value(&mut records);
                dedupe_adjacent_keeping_max_score(&mut records);
                let total = records.len() as u64;

                if records.len() > max_per_term {
                    records.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal));
                    records.truncate(max_per_term);
                    reorder_into_sections(&mut records, self.section_size);
                }

                PageEntry { key, records, total }
            })
            .collect();

        shard::compact_write(&self.data_path, &self.keys_path, self.table_size, entries)?;

        OpenOptions::new().create(true).write(true).truncate(true).open(&self.cache_path)?;
        OpenOptions::new().create(true).write(true).truncate(true).open(&self.cache_keys_path)?;
        Ok(())
    }

    fn read_cache(&self) -> Result<(Vec<u64>, Vec<R>)> {
        let mut keys = Vec::new();
        match std::fs::File::open(&self.cache_keys_path) {
            Ok(mut f) => {
                let mut buf = Vec::new();
                f.read_to_end(&mut buf)?;
                keys = buf.chunks_exact(8).map(|c| u64::from_le_bytes(c.try_into().unwrap())).collect();
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut records = Vec::new();
        match std::fs::File::open(&self.cache_path) {
            Ok(mut f) => {
                let mut buf = Vec::new();
                f.read_to_end(&mut buf)?;
                for chunk in buf.chunks_exact(self.record_size) {
                    if let Some(rec) = R::decode(chunk) {
                        records.push(rec);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok((keys, records))
    }

    /// Delete cache contents and empty the shard file.
    pub fn truncate(&self) -> Result<()> {
        OpenOptions::new().create(true).write(true).truncate(true).open(&self.cache_path)?;
        OpenOptions::new().create(true).write(true).truncate(true).open(&self.cache_keys_path)?;
        let mut shard: Shard<R> = Shard::open(self.shard_id, &self.data_path, &self.keys_path, self.table_size)?;
        shard.truncate()
    }
}

/// Collapse runs of equal `value` (the list is sorted ascending by value)
/// into the max-scoring record per the Open Question decision in
/// DESIGN.md: ties keep the first-seen max, not a summed merge.
fn dedupe_adjacent_keeping_max_score<R: PostingRecord>(records: &mut Vec<R>) {
    if records.is_empty() {
        return;
    }
    let mut write = 0;
    for read in 1..records.len() {
        if records[read].value() == records[write].value() {
            if records[read].score() > records[write].score() {
                records[write] = records[read];
            }
        } else {
            write += 1;
            records[write] = records[read];
        }
    }
    records.truncate(write + 1);
}

/// Reorder a score-truncated list into sections of `section_size`, each
/// sorted ascending by `value`, preserving the top-K-by-score selection
/// already made by the caller's truncation.
fn reorder_into_sections<R: PostingRecord>(records: &mut [R], section_size: usize) {
    for chunk in records.chunks_mut(section_size) {
        sort_by_value(chunk);
    }
}
