//! End-to-end exercise of the build -> merge -> search pipeline: index a
//! small synthetic corpus through `IndexerRunner`, merge every shard, then
//! query it through `SearchEngine` and check the results match what was
//! indexed.

use std::sync::Arc;

use shardfts_core::indexer::{CanonicalUrl, ColumnSpec, IndexerRunner, PriorScorer, RecordFactory, RowOutcome, TextExtractor, UrlCanonicalizer};
use shardfts_core::{hash, DomainMap, EngineConfig, PageRecord, PartitionPlanner, SearchEngine, ShardedIndexBuilder};

struct TestCanonicalizer;
impl UrlCanonicalizer for TestCanonicalizer {
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

struct FixedScorer(f32);
impl PriorScorer for FixedScorer {
    fn harmonic(&self, _url: &str) -> f32 {
        self.0
    }
}

struct PageFactory;
impl RecordFactory<PageRecord> for PageFactory {
    fn make(&self, value: u64, score: f32, _host_hash: u64) -> PageRecord {
        PageRecord::new(value, score)
    }
}

fn build_index(dir: &std::path::Path, config: Arc<EngineConfig>, rows: &[(&str, f32)]) -> Arc<DomainMap> {
    let index = Arc::new(ShardedIndexBuilder::<PageRecord>::open(dir, "pages", &config));
    let domain_map = Arc::new(DomainMap::new(dir.join("pages.map")));
    domain_map.read().unwrap();
    let planner = PartitionPlanner::new(1, 1);

    for &(row, harmonic) in rows {
        let runner = IndexerRunner::new(
            config.clone(),
            index.clone(),
            domain_map.clone(),
            Arc::new(TestCanonicalizer),
            Arc::new(WhitespaceExtractor),
            Arc::new(FixedScorer(harmonic)),
            Arc::new(PageFactory),
            vec![ColumnSpec { column: 1, base_score: 1.0 }],
        );
        let outcome = runner.index_row(row, &planner, 0, 0);
        assert!(matches!(outcome, RowOutcome::Indexed), "row should be indexed: {row}");
    }

    index.flush_cache().unwrap();
    index.merge_all().unwrap();
    domain_map.write().unwrap();
    domain_map
}

#[test]
fn single_url_query_returns_one_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(EngineConfig::for_tests());
    let domain_map = build_index(
        dir.path(),
        config.clone(),
        &[("http://url1.com/test\ttest page about rust search", 2.0)],
    );

    let engine = SearchEngine::open(dir.path(), "pages", None, None, config, domain_map).unwrap();
    let (results, metric) = engine.search("rust", 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].value, hash::url_hash("http://url1.com/test"));
    assert_eq!(metric.total_found, 1);
}

#[test]
fn reindexing_with_higher_harmonic_updates_score_not_count() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(EngineConfig::for_tests());

    let domain_map = build_index(dir.path(), config.clone(), &[("http://example.com/\tsearch engine", 1.0)]);
    let engine = SearchEngine::open(dir.path(), "pages", None, None, config.clone(), domain_map).unwrap();
    let (first, _) = engine.search("search", 10);
    assert_eq!(first.len(), 1);
    let first_score = first[0].score;

    // Re-run the same row through a fresh indexer pointed at the same
    // shard files, with a higher harmonic prior.
    let domain_map2 = build_index(dir.path(), config.clone(), &[("http://example.com/\tsearch engine", 9.0)]);
    let engine2 = SearchEngine::open(dir.path(), "pages", None, None, config, domain_map2).unwrap();
    let (second, _) = engine2.search("search", 10);

    assert_eq!(second.len(), 1, "re-indexing the same URL must not create a second posting");
    assert!(second[0].score > first_score, "higher harmonic should raise the score");
}

#[test]
fn host_dedup_cap_limits_results_per_host() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::for_tests();
    cfg.host_dedup_cap = 1;
    let config = Arc::new(cfg);

    let domain_map = build_index(
        dir.path(),
        config.clone(),
        &[
            ("http://shared-host.example/a\tindex query term", 5.0),
            ("http://shared-host.example/b\tindex query term", 1.0),
        ],
    );

    let engine = SearchEngine::open(dir.path(), "pages", None, None, config, domain_map).unwrap();
    let (results, _) = engine.search("index", 10);
    assert_eq!(results.len(), 1, "default cap keeps only the higher-scored page per host");
    assert_eq!(results[0].value, hash::url_hash("http://shared-host.example/a"));
}

#[test]
fn multi_term_query_intersects_across_documents() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(EngineConfig::for_tests());

    let domain_map = build_index(
        dir.path(),
        config.clone(),
        &[
            ("http://a.example/\trust search engine", 1.0),
            ("http://b.example/\trust programming language", 1.0),
        ],
    );

    let engine = SearchEngine::open(dir.path(), "pages", None, None, config, domain_map).unwrap();
    let (results, metric) = engine.search("rust search", 10);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].value, hash::url_hash("http://a.example/"));
    assert_eq!(metric.total_found, 1);
}
