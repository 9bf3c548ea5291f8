//! Injected engine configuration.
//!
//! The reference design keeps `N_shards`, `P`, `K`, `SHARD_HASH_TABLE_SIZE`
//! and friends as process-wide mutable constants. Per the redesign note in
//! the spec, they are collected here into one immutable value constructed
//! once and passed by reference (or `Arc`) to every component. Tests build
//! their own small-scale configuration with [`EngineConfig::for_tests`].
//!
//! `EngineConfig` is `serde`-serializable so the embedding binary can load
//! it from a config file or the cluster's control plane rather than
//! hard-coding it, the way the teacher crate uses `serde`/`serde_json` for
//! its own on-the-wire types.

use serde::{Deserialize, Serialize};

/// Default number of slots in a shard's key directory (must be a power of
/// two — see [`EngineConfig::shard_hash_table_size`]).
pub const DEFAULT_SHARD_HASH_TABLE_SIZE: usize = 1 << 20;

/// Default number of postings per section of a sectioned posting list.
pub const DEFAULT_SECTION_SIZE: usize = 128;

/// Default number of sections kept per term before truncation.
pub const DEFAULT_MAX_SECTIONS: usize = 64;

/// Sentinel key-directory value meaning "this slot holds no page".
pub const EMPTY_SLOT: u64 = u64::MAX;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of shards in each logical index.
    pub num_shards: usize,
    /// Number of document partitions in the cluster (`P`).
    pub num_partitions: u64,
    /// Number of nodes in the cluster (`K`).
    pub nodes_in_cluster: u64,
    /// Power-of-two slot count for each shard's key directory.
    pub shard_hash_table_size: usize,
    /// Postings per section of a sectioned posting list.
    pub section_size: usize,
    /// Sections kept per term before truncation (`max_per_term =
    /// section_size * max_sections`).
    pub max_sections: usize,
    /// In-memory byte threshold before a shard builder is considered
    /// `full()` and should spill to its `.cache` files.
    pub append_threshold_bytes: u64,
    /// Combined cache-file byte threshold before a shard builder's
    /// `should_merge()` returns true.
    pub merge_threshold_bytes: u64,
    /// Maximum host-repeat count kept by search result deduplication.
    pub host_dedup_cap: usize,
    /// Bounded retry attempts for `IoTransient` failures.
    pub io_retry_attempts: u32,
    /// Thread pool size used by the indexer's tokenizer/inverter stages.
    /// `None` defers to `num_cpus::get()`.
    pub indexer_threads: Option<usize>,
    /// Number of records between cooperative cache spills during
    /// indexing (§4.F step 8).
    pub spill_every_records: u64,
}

impl EngineConfig {
    pub fn max_per_term(&self) -> usize {
        self.section_size * self.max_sections
    }

    /// Parse a configuration from its JSON wire form.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serialize to the same JSON form `from_json` accepts.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Mount point index for shard `i`, spreading shards across 8 storage
    /// mountpoints as specified in §6.
    pub fn mount_for_shard(shard_id: usize) -> usize {
        shard_id % 8
    }

    /// A configuration tuned for fast, deterministic unit tests: few
    /// shards, tiny thresholds, small key directory.
    pub fn for_tests() -> Self {
        Self {
            num_shards: 4,
            num_partitions: 8,
            nodes_in_cluster: 3,
            shard_hash_table_size: 256,
            section_size: 8,
            max_sections: 4,
            append_threshold_bytes: 4096,
            merge_threshold_bytes: 16 * 1024,
            host_dedup_cap: 1,
            io_retry_attempts: 3,
            indexer_threads: Some(2),
            spill_every_records: 100,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_shards: 256,
            num_partitions: 1,
            nodes_in_cluster: 1,
            shard_hash_table_size: DEFAULT_SHARD_HASH_TABLE_SIZE,
            section_size: DEFAULT_SECTION_SIZE,
            max_sections: DEFAULT_MAX_SECTIONS,
            append_threshold_bytes: 300 * 1024 * 1024,
            merge_threshold_bytes: 1024 * 1024 * 1024,
            host_dedup_cap: 1,
            io_retry_attempts: 5,
            indexer_threads: None,
            spill_every_records: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_per_term_multiplies_section_by_sections() {
        let cfg = EngineConfig::for_tests();
        assert_eq!(cfg.max_per_term(), 8 * 4);
    }

    #[test]
    fn json_round_trips() {
        let cfg = EngineConfig::for_tests();
        let json = cfg.to_json().unwrap();
        let back = EngineConfig::from_json(&json).unwrap();
        assert_eq!(back.num_shards, cfg.num_shards);
        assert_eq!(back.indexer_threads, cfg.indexer_threads);
    }

    #[test]
    fn mount_wraps_at_eight() {
        assert_eq!(EngineConfig::mount_for_shard(0), 0);
        assert_eq!(EngineConfig::mount_for_shard(7), 7);
        assert_eq!(EngineConfig::mount_for_shard(8), 0);
        assert_eq!(EngineConfig::mount_for_shard(23), 7);
    }
}
