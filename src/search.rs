//! Search engine (component G): tokenizes a query, reads postings from
//! every relevant shard, intersects terms, fuses link-graph scores, and
//! deduplicates results by host.
//!
//! Grounded on `profiles/bmw_simd.rs`/`profiles/turbo.rs`'s `search_bmw`
//! (top-k `BinaryHeap<Reverse<...>>`, `Instant::now()` timing into the
//! result), generalized from single-list BM25 scoring to multi-list
//! sectioned intersection plus link fusion and host dedup. The
//! section-at-a-time value comparison uses the `wide` crate's portable
//! `u64x4` SIMD lanes — the concrete SIMD intersection the `bmw_simd`
//! profile's module doc promises but never implements.

use crate::config::EngineConfig;
use crate::domain_map::DomainMap;
use crate::error::Result;
use crate::hash::term_hash;
use crate::record::{DomainLinkRecord, LinkRecord, PageRecord, PostingRecord};
use crate::shard::Shard;
use crate::tokenizer::FastTokenizer;

use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use wide::u64x4;

/// One ranked document in a search response.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub value: u64,
    pub score: f32,
}

/// Counters describing one query's execution, returned alongside results.
#[derive(Debug, Clone)]
pub struct SearchMetric {
    pub total_found: usize,
    pub link_url_matches: usize,
    pub link_domain_matches: usize,
    pub elapsed: std::time::Duration,
}

pub struct SearchEngine {
    config: Arc<EngineConfig>,
    domain_map: Arc<DomainMap>,
    tokenizer: FastTokenizer,
    text_shards: Vec<Shard<PageRecord>>,
    link_shards: Option<Vec<Shard<LinkRecord>>>,
    domain_link_shards: Option<Vec<Shard<DomainLinkRecord>>>,
}

impl SearchEngine {
    /// Open every shard of the page-text index `name`, optionally
    /// alongside a link-anchor-text index and a domain-link index of
    /// the same shard count.
    pub fn open(root: &Path, name: &str, link_name: Option<&str>, domain_link_name: Option<&str>, config: Arc<EngineConfig>, domain_map: Arc<DomainMap>) -> Result<Self> {
        let text_shards = open_shards(root, name, config.num_shards, config.shard_hash_table_size)?;
        let link_shards = link_name.map(|n| open_shards(root, n, config.num_shards, config.shard_hash_table_size)).transpose()?;
        let domain_link_shards = domain_link_name.map(|n| open_shards(root, n, config.num_shards, config.shard_hash_table_size)).transpose()?;

        Ok(Self {
            config,
            domain_map,
            tokenizer: FastTokenizer::default(),
            text_shards,
            link_shards,
            domain_link_shards,
        })
    }

    pub fn search(&self, query: &str, limit: usize) -> (Vec<SearchResult>, SearchMetric) {
        let start = Instant::now();
        let terms = self.tokenizer.tokenize_query(query);

        let mut per_term_lists: Vec<Vec<PageRecord>> = Vec::with_capacity(terms.len());
        for term in &terms {
            let th = term_hash(term);
            let shard_id = (th as usize) % self.text_shards.len().max(1);
            let (records, _total) = self.text_shards[shard_id].find(th).unwrap_or_default();
            if records.is_empty() {
                return (
                    Vec::new(),
                    SearchMetric {
                        total_found: 0,
                        link_url_matches: 0,
                        link_domain_matches: 0,
                        elapsed: start.elapsed(),
                    },
                );
            }
            per_term_lists.push(records);
        }

        let mut intersected = match per_term_lists.split_first() {
            None => Vec::new(),
            Some((first, rest)) => {
                let mut acc: Vec<(u64, f32)> = first.iter().map(|r| (r.value(), r.score())).collect();
                for list in rest {
                    acc = intersect_scored(&acc, list, self.config.section_size);
                    if acc.is_empty() {
                        break;
                    }
                }
                acc
            }
        };
        intersected.sort_by(|a, b| a.0.cmp(&b.0));

        let total_found = intersected.len();
        let mut link_url_matches = 0usize;
        let mut link_domain_matches = 0usize;

        if let Some(link_shards) = &self.link_shards {
            let link_postings = self.lookup_terms(&terms, link_shards);
            for (value, score) in &mut intersected {
                if let Some(link_score) = link_postings.get(value) {
                    *score += link_score;
                    link_url_matches += 1;
                }
            }
        }

        if let Some(domain_link_shards) = &self.domain_link_shards {
            let domain_postings = self.lookup_terms(&terms, domain_link_shards);
            for (value, score) in &mut intersected {
                if let Some(host_hash) = self.domain_map.host_for(*value) {
                    if let Some(link_score) = domain_postings.get(&host_hash) {
                        *score += link_score;
                        link_domain_matches += 1;
                    }
                }
            }
        }

        let mut results: Vec<SearchResult> = intersected.into_iter().map(|(value, score)| SearchResult { value, score }).collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.value.cmp(&b.value)));

        let deduped = self.dedup_by_host(results, limit);

        (
            deduped,
            SearchMetric {
                total_found,
                link_url_matches,
                link_domain_matches,
                elapsed: start.elapsed(),
            },
        )
    }

    fn lookup_terms<R: PostingRecord>(&self, terms: &[String], shards: &[Shard<R>]) -> FxHashMap<u64, f32> {
        let mut out: FxHashMap<u64, f32> = FxHashMap::default();
        for term in terms {
            let th = term_hash(term);
            let shard_id = (th as usize) % shards.len().max(1);
            if let Ok((records, _total)) = shards[shard_id].find(th) {
                for rec in records {
                    *out.entry(rec.value()).or_insert(0.0) += rec.score();
                }
            }
        }
        out
    }

    /// Sweep score-descending results, dropping any whose host has
    /// already appeared `host_dedup_cap` times, stopping at `limit`.
    fn dedup_by_host(&self, results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
        let mut seen_hosts: FxHashMap<u64, usize> = FxHashMap::default();
        let mut out = Vec::with_capacity(limit.min(results.len()));
        for result in results {
            if out.len() >= limit {
                break;
            }
            let host_hash = self.domain_map.host_for(result.value).unwrap_or(result.value);
            let count = seen_hosts.entry(host_hash).or_insert(0);
            if *count >= self.config.host_dedup_cap {
                continue;
            }
            *count += 1;
            out.push(result);
        }
        out
    }
}

fn open_shards<R: PostingRecord>(root: &Path, name: &str, num_shards: usize, table_size: usize) -> Result<Vec<Shard<R>>> {
    (0..num_shards)
        .map(|shard_id| {
            let mount = EngineConfig::mount_for_shard(shard_id);
            let dir = root.join(format!("mount_{mount}")).join("full_text");
            Shard::open(shard_id, dir.join(format!("{name}_{shard_id}.data")), dir.join(format!("{name}_{shard_id}.keys")), table_size)
        })
        .collect()
}

/// Intersect an accumulated `(value, score)` list against one more
/// term's posting list, summing scores for values present in both.
/// `section_size`-wide chunks of `list` are compared against each
/// accumulated value using `wide::u64x4` SIMD lanes.
fn intersect_scored<R: PostingRecord>(acc: &[(u64, f32)], list: &[R], section_size: usize) -> Vec<(u64, f32)> {
    let mut out = Vec::new();
    for &(value, score) in acc {
        if let Some(other_score) = find_in_sections(list, value, section_size) {
            out.push((value, score + other_score));
        }
    }
    out
}

fn find_in_sections<R: PostingRecord>(list: &[R], target: u64, section_size: usize) -> Option<f32> {
    for section in list.chunks(section_size) {
        let mut lanes = section.chunks(4);
        for lane in &mut lanes {
            let mut vals = [u64::MAX; 4];
            for (i, rec) in lane.iter().enumerate() {
                vals[i] = rec.value();
            }
            let simd = u64x4::new(vals);
            let cmp = simd.cmp_eq(u64x4::splat(target));
            let mask = cmp.to_array();
            if let Some(i) = mask.iter().position(|&m| m != 0) {
                return Some(lane[i].score());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ShardBuilder;
    use tempfile::tempdir;

    fn build_text_shard(dir: &Path, config: &EngineConfig, shard_id: usize, postings: &[(u64, u64, f32)]) {
        let mount = EngineConfig::mount_for_shard(shard_id);
        let sdir = dir.join(format!("mount_{mount}")).join("full_text");
        std::fs::create_dir_all(&sdir).unwrap();
        let b: ShardBuilder<PageRecord> = ShardBuilder::new(
            shard_id,
            sdir.join(format!("pages_{shard_id}.data")),
            sdir.join(format!("pages_{shard_id}.keys")),
            sdir.join(format!("pages_{shard_id}.cache")),
            sdir.join(format!("pages_{shard_id}.cache.keys")),
            config,
        );
        for &(key, value, score) in postings {
            b.add(key, PageRecord::new(value, score));
        }
        b.merge().unwrap();
    }

    #[test]
    fn single_term_query_matches_seeded_corpus() {
        let dir = tempdir().unwrap();
        let config = Arc::new(EngineConfig::for_tests());
        let term = term_hash("url1");
        let shard_id = (term as usize) % config.num_shards;

        build_text_shard(dir.path(), &config, shard_id, &[(term, 1, 2.0)]);

        let domain_map = Arc::new(DomainMap::new(dir.path().join("pages.map")));
        domain_map.add(1, 100);
        domain_map.read().ok(); // no-op: file doesn't exist yet, keep in-memory add

        let engine = SearchEngine::open(dir.path(), "pages", None, None, config, domain_map).unwrap();
        let (results, metric) = engine.search("url1", 10);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 1);
        assert_eq!(metric.total_found, 1);
    }

    fn build_link_shard(dir: &Path, config: &EngineConfig, shard_id: usize, name: &str, postings: &[(u64, LinkRecord)]) {
        let mount = EngineConfig::mount_for_shard(shard_id);
        let sdir = dir.join(format!("mount_{mount}")).join("full_text");
        std::fs::create_dir_all(&sdir).unwrap();
        let b: ShardBuilder<LinkRecord> = ShardBuilder::new(
            shard_id,
            sdir.join(format!("{name}_{shard_id}.data")),
            sdir.join(format!("{name}_{shard_id}.keys")),
            sdir.join(format!("{name}_{shard_id}.cache")),
            sdir.join(format!("{name}_{shard_id}.cache.keys")),
            config,
        );
        for &(key, record) in postings {
            b.add(key, record);
        }
        b.merge().unwrap();
    }

    #[test]
    fn link_anchor_index_fuses_score_and_counts_url_match() {
        let dir = tempdir().unwrap();
        let config = Arc::new(EngineConfig::for_tests());
        let term = term_hash("url1");
        let shard_id = (term as usize) % config.num_shards;

        build_text_shard(dir.path(), &config, shard_id, &[(term, 1, 2.0)]);
        build_link_shard(dir.path(), &config, shard_id, "links", &[(term, LinkRecord::new(1, 3.0, 77))]);

        let domain_map = Arc::new(DomainMap::new(dir.path().join("pages.map")));
        domain_map.add(1, 100);

        let engine = SearchEngine::open(dir.path(), "pages", Some("links"), None, config, domain_map).unwrap();
        let (results, metric) = engine.search("url1", 10);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 1);
        assert_eq!(metric.link_url_matches, 1);
        assert_eq!(metric.link_domain_matches, 0);
        // Page score (2.0) plus the matching link posting's score (3.0).
        assert!((results[0].score - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn host_dedup_cap() {
        let dir = tempdir().unwrap();
        let mut cfg = EngineConfig::for_tests();
        cfg.host_dedup_cap = 1;
        let config = Arc::new(cfg);
        let term = term_hash("rust");
        let shard_id = (term as usize) % config.num_shards;

        // Two documents, same host, different scores.
        build_text_shard(dir.path(), &config, shard_id, &[(term, 1, 5.0), (term, 2, 3.0)]);

        let domain_map = Arc::new(DomainMap::new(dir.path().join("pages.map")));
        domain_map.add(1, 100);
        domain_map.add(2, 100);

        let engine = SearchEngine::open(dir.path(), "pages", None, None, config.clone(), domain_map).unwrap();
        let (results, _) = engine.search("rust", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 1);

        let domain_map2 = Arc::new(DomainMap::new(dir.path().join("pages2.map")));
        domain_map2.add(1, 100);
        domain_map2.add(2, 100);
        let mut cfg2 = EngineConfig::for_tests();
        cfg2.host_dedup_cap = 2;
        let engine2 = SearchEngine::open(dir.path(), "pages", None, None, Arc::new(cfg2), domain_map2).unwrap();
        let (results2, _) = engine2.search("rust", 10);
        assert_eq!(results2.len(), 2);
    }
}
