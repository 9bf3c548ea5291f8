//! URL→domain map (component D): an append-only `(url_hash, host_hash)`
//! sidecar file, read back into memory for existence/lookup queries.
//!
//! Grounded on the parallel-vector-plus-single-lock pattern
//! `profiles/bmw_simd.rs` uses for its `doc_ids`/`doc_lengths` state,
//! narrowed per §5's "one mutex for the URL→domain map" to a single
//! `parking_lot::Mutex` guarding both the in-memory state and the file.

use crate::error::Result;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{Read, Write};
use std::path::PathBuf;

struct State {
    pairs: Vec<(u64, u64)>,
    seen: FxHashSet<u64>,
    host_of: FxHashMap<u64, u64>,
}

impl State {
    fn empty() -> Self {
        Self {
            pairs: Vec::new(),
            seen: FxHashSet::default(),
            host_of: FxHashMap::default(),
        }
    }

    fn insert(&mut self, url_hash: u64, host_hash: u64) {
        self.pairs.push((url_hash, host_hash));
        self.seen.insert(url_hash);
        self.host_of.insert(url_hash, host_hash);
    }
}

/// The URL→domain map for one logical index family, backed by one file.
pub struct DomainMap {
    path: PathBuf,
    state: Mutex<State>,
}

impl DomainMap {
    /// An empty map backed by `path`. Call [`DomainMap::read`] to load any
    /// existing contents before querying.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(State::empty()),
        }
    }

    /// Load `path` into memory, replacing any in-memory state. A missing
    /// file is treated as an empty map.
    pub fn read(&self) -> Result<()> {
        let mut buf = Vec::new();
        match std::fs::File::open(&self.path) {
            Ok(mut f) => {
                f.read_to_end(&mut buf)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut state = State::empty();
        for chunk in buf.chunks_exact(16) {
            let url_hash = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let host_hash = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
            state.insert(url_hash, host_hash);
        }
        *self.state.lock() = state;
        Ok(())
    }

    /// Record one `(url_hash, host_hash)` pair in memory. Call
    /// [`DomainMap::write`] to persist.
    pub fn add(&self, url_hash: u64, host_hash: u64) {
        self.state.lock().insert(url_hash, host_hash);
    }

    /// Whether `url_hash` has been recorded.
    pub fn contains(&self, url_hash: u64) -> bool {
        self.state.lock().seen.contains(&url_hash)
    }

    /// The host hash recorded for `url_hash`, if any.
    pub fn host_for(&self, url_hash: u64) -> Option<u64> {
        self.state.lock().host_of.get(&url_hash).copied()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the backing file from the current in-memory pairs.
    pub fn write(&self) -> Result<()> {
        let state = self.state.lock();
        let mut buf = Vec::with_capacity(state.pairs.len() * 16);
        for (url_hash, host_hash) in &state.pairs {
            buf.extend_from_slice(&url_hash.to_le_bytes());
            buf.extend_from_slice(&host_hash.to_le_bytes());
        }
        let mut file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }
}
