//! Posting record types (component A).
//!
//! A posting is a fixed-size, bitwise-copyable value: a 64-bit document
//! identifier, a 32-bit score, and a 32-bit duplicate count, plus
//! variant-specific trailing 64-bit fields declared in order. The storage
//! layer (`shard`, `builder`) only ever sees `ENCODED_LEN` bytes and never
//! interprets them beyond `encode`/`decode` — no reinterpret-cast, per the
//! spec's redesign note against raw byte-cast I/O.

use std::cmp::Ordering;

/// Common contract for every posting record variant used by this engine.
pub trait PostingRecord: Copy + Clone + std::fmt::Debug {
    /// On-disk size in bytes. A compile-time constant per variant.
    const ENCODED_LEN: usize;

    /// The document identifier this posting refers to.
    fn value(&self) -> u64;

    /// Composite relevance score.
    fn score(&self) -> f32;

    /// Number of times this `(term, value)` pair was seen pre-dedup.
    fn count(&self) -> u32;

    /// Merge two postings for the same `value`: scores combine additively
    /// (used when accumulating duplicates before the max-score dedup in
    /// `merge()` picks a winner) and counts sum.
    fn merged_with(&self, other: &Self) -> Self;

    /// Encode into a little-endian byte buffer of exactly `ENCODED_LEN`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from a little-endian byte slice of exactly `ENCODED_LEN`.
    /// Returns `None` if `bytes.len() != ENCODED_LEN`.
    fn decode(bytes: &[u8]) -> Option<Self>
    where
        Self: Sized;
}

/// Total ordering by `value` ascending; ties are irrelevant (`value` is
/// unique per deduped posting list) but `Ord` requires totality so
/// `partial_cmp`/ties fall back to `Ordering::Equal`.
fn cmp_by_value<R: PostingRecord>(a: &R, b: &R) -> Ordering {
    a.value().cmp(&b.value())
}

/// A page-text posting: `(value, score, count)`, 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRecord {
    pub value: u64,
    pub score: f32,
    pub count: u32,
}

impl PageRecord {
    pub fn new(value: u64, score: f32) -> Self {
        Self { value, score, count: 1 }
    }
}

impl PostingRecord for PageRecord {
    const ENCODED_LEN: usize = 16;

    fn value(&self) -> u64 {
        self.value
    }

    fn score(&self) -> f32 {
        self.score
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn merged_with(&self, other: &Self) -> Self {
        debug_assert_eq!(self.value, other.value);
        Self {
            value: self.value,
            score: self.score + other.score,
            count: self.count + other.count,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.score.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let value = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let score = f32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let count = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
        Some(Self { value, score, count })
    }
}

/// An inbound anchor-text posting: page-text fields plus the hash of the
/// domain the link originated from. 24 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkRecord {
    pub value: u64,
    pub score: f32,
    pub count: u32,
    pub source_domain_hash: u64,
}

impl LinkRecord {
    pub fn new(value: u64, score: f32, source_domain_hash: u64) -> Self {
        Self {
            value,
            score,
            count: 1,
            source_domain_hash,
        }
    }
}

impl PostingRecord for LinkRecord {
    const ENCODED_LEN: usize = 24;

    fn value(&self) -> u64 {
        self.value
    }

    fn score(&self) -> f32 {
        self.score
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn merged_with(&self, other: &Self) -> Self {
        Self {
            value: self.value,
            score: self.score + other.score,
            count: self.count + other.count,
            source_domain_hash: self.source_domain_hash,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.score.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.source_domain_hash.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let value = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let score = f32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let count = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
        let source_domain_hash = u64::from_le_bytes(bytes[16..24].try_into().ok()?);
        Some(Self {
            value,
            score,
            count,
            source_domain_hash,
        })
    }
}

/// An inbound domain-link posting, identical layout to `LinkRecord`: the
/// target (`value`) is a domain hash rather than a URL hash when used in
/// the domain-link logical index. Kept as a distinct type (rather than a
/// type alias) so `SearchProfile`-style code can't accidentally mix the
/// two logical indices' records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainLinkRecord {
    pub value: u64,
    pub score: f32,
    pub count: u32,
    pub source_domain_hash: u64,
}

impl DomainLinkRecord {
    pub fn new(value: u64, score: f32, source_domain_hash: u64) -> Self {
        Self {
            value,
            score,
            count: 1,
            source_domain_hash,
        }
    }
}

impl PostingRecord for DomainLinkRecord {
    const ENCODED_LEN: usize = 24;

    fn value(&self) -> u64 {
        self.value
    }

    fn score(&self) -> f32 {
        self.score
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn merged_with(&self, other: &Self) -> Self {
        Self {
            value: self.value,
            score: self.score + other.score,
            count: self.count + other.count,
            source_domain_hash: self.source_domain_hash,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.score.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.source_domain_hash.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let value = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let score = f32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let count = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
        let source_domain_hash = u64::from_le_bytes(bytes[16..24].try_into().ok()?);
        Some(Self {
            value,
            score,
            count,
            source_domain_hash,
        })
    }
}

/// Sort records ascending by `value`, as required before dedup/section
/// building in `builder::merge`.
pub fn sort_by_value<R: PostingRecord>(records: &mut [R]) {
    records.sort_by(cmp_by_value);
}
