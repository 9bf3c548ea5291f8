//! Sharded inverted-index search engine core.
//!
//! This crate builds and queries on-disk inverted indices for web-scale
//! document corpora: a [`builder::ShardBuilder`] accumulates per-term
//! postings and compacts them into a paged [`shard::Shard`] file;
//! [`sharded_index::ShardedIndexBuilder`] fans a logical index out across
//! `N` such shards by `term_hash mod N`; [`indexer::IndexerRunner`] drives
//! ingestion of a batch of TSV records into one or more logical indices;
//! and [`search::SearchEngine`] fuses page-text, link-anchor-text, and
//! domain-link-anchor-text indices at query time.

pub mod builder;
pub mod config;
pub mod domain_map;
pub mod error;
pub mod hash;
pub mod indexer;
pub mod partition;
pub mod record;
pub mod search;
pub mod shard;
pub mod sharded_index;
pub mod tokenizer;

pub use builder::ShardBuilder;
pub use config::EngineConfig;
pub use domain_map::DomainMap;
pub use error::{EngineError, Result};
pub use indexer::{ColumnSpec, IndexerRunner, IndexerStats};
pub use partition::PartitionPlanner;
pub use record::{DomainLinkRecord, LinkRecord, PageRecord, PostingRecord};
pub use search::{SearchEngine, SearchMetric, SearchResult};
pub use shard::Shard;
pub use sharded_index::{ChannelWriter, ShardedIndexBuilder};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
