//! Benchmark: synthetic-corpus ingest throughput through the real
//! build pipeline (indexer -> sharded index -> shard merge).
//!
//! Usage: cargo run --release --example bench_ingest -- [num_docs]
//!
//! Generates `num_docs` synthetic TSV rows in memory (not measured),
//! then indexes them through `IndexerRunner::index_row` and a final
//! `merge_all` (measured), and reports throughput in docs/sec.

use std::env;
use std::sync::Arc;
use std::time::Instant;

use shardfts_core::indexer::{CanonicalUrl, ColumnSpec, IndexerRunner, PriorScorer, RecordFactory, RowOutcome, TextExtractor, UrlCanonicalizer};
use shardfts_core::{hash, DomainMap, EngineConfig, PageRecord, PartitionPlanner, ShardedIndexBuilder};

struct SimpleCanonicalizer;
impl UrlCanonicalizer for SimpleCanonicalizer {
    fn canonicalize(&self, url: &str) -> Option<CanonicalUrl> {
        let host = url.split('/').nth(2)?.to_string();
        Some(CanonicalUrl {
            host_hash: hash::host_hash(&host),
            domain_hash: hash::host_hash(&host),
            url_hash: hash::url_hash(url),
            host,
        })
    }
}

struct WhitespaceExtractor;
impl TextExtractor for WhitespaceExtractor {
    fn get_full_text_words(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(|s| s.to_string()).collect()
    }
    fn get_expanded_full_text_words(&self, text: &str) -> Vec<String> {
        self.get_full_text_words(text)
    }
}

struct ConstantScorer;
impl PriorScorer for ConstantScorer {
    fn harmonic(&self, _url: &str) -> f32 {
        1.0
    }
}

struct PageFactory;
impl RecordFactory<PageRecord> for PageFactory {
    fn make(&self, value: u64, score: f32, _host_hash: u64) -> PageRecord {
        PageRecord::new(value, score)
    }
}

/// A small fixed vocabulary so postings overlap across documents, the
/// way real web text does.
const VOCAB: &[&str] = &[
    "rust", "search", "index", "shard", "query", "posting", "engine", "term", "score", "merge",
];

fn synthetic_row(doc_id: u64) -> String {
    let host = doc_id % 500;
    let words: Vec<&str> = (0..12).map(|i| VOCAB[((doc_id as usize) + i) % VOCAB.len()]).collect();
    format!("http://site{host}.example/doc{doc_id}\t{}", words.join(" "))
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let num_docs: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(200_000);

    println!("=== shardfts ingest benchmark ===");
    println!("documents: {num_docs}");

    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = Arc::new(EngineConfig {
        num_shards: 16,
        shard_hash_table_size: 1 << 14,
        ..EngineConfig::default()
    });
    let index = Arc::new(ShardedIndexBuilder::<PageRecord>::open(dir.path(), "pages", &config));
    let domain_map = Arc::new(DomainMap::new(dir.path().join("pages.map")));
    domain_map.read().expect("domain map read");

    let runner = IndexerRunner::new(
        config.clone(),
        index.clone(),
        domain_map,
        Arc::new(SimpleCanonicalizer),
        Arc::new(WhitespaceExtractor),
        Arc::new(ConstantScorer),
        Arc::new(PageFactory),
        vec![ColumnSpec { column: 1, base_score: 1.0 }],
    );
    let planner = PartitionPlanner::new(1, 1);

    println!("[phase 1] generating rows (not measured)...");
    let rows: Vec<String> = (0..num_docs).map(synthetic_row).collect();

    println!("[phase 2] indexing rows (measured)...");
    let start = Instant::now();
    let mut indexed = 0u64;
    for row in &rows {
        if matches!(runner.index_row(row, &planner, 0, 0), RowOutcome::Indexed) {
            indexed += 1;
        }
    }
    index.flush_cache().expect("flush_cache");
    index.merge_all().expect("merge_all");
    let elapsed = start.elapsed();

    let throughput = indexed as f64 / elapsed.as_secs_f64();
    println!();
    println!("=== results ===");
    println!("documents indexed: {indexed}");
    println!("duration:          {:.3}s", elapsed.as_secs_f64());
    println!("throughput:        {throughput:.0} docs/sec");
}
