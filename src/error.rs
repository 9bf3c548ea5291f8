//! Unified error taxonomy for the engine.
//!
//! One enum covers every component (§7 of the design spec): builders,
//! shard readers, the indexer runner and the search engine all return
//! `EngineError`. Corrupt shards and malformed rows are not fatal — they
//! are logged and the affected unit (shard, row) is treated as empty or
//! skipped; only `Fatal` unwinds all the way to the batch driver.

use std::io;

/// Errors produced anywhere in the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Transient I/O failure; the caller may retry within a bounded
    /// number of attempts (see [`crate::config::EngineConfig::io_retry_attempts`]).
    #[error("transient I/O error: {0}")]
    IoTransient(io::Error),

    /// A shard file failed an integrity check (bad header, length past
    /// end of file, truncated record). The shard is quarantined — reads
    /// against it return empty results rather than propagating.
    #[error("corrupt shard {shard_id} ({path}): {reason}")]
    IoCorrupt {
        shard_id: usize,
        path: String,
        reason: String,
    },

    /// A TSV row could not be parsed or failed a hard column-count /
    /// UTF-8 requirement. The row is skipped, not fatal.
    #[error("malformed input row {line}: {reason}")]
    InputMalformed { line: u64, reason: String },

    /// Lock acquisition timed out.
    #[error("lock contention acquiring {resource}")]
    Contention { resource: String },

    /// Unrecoverable condition (e.g. OOM building the merge buffer).
    /// Aborts the current batch.
    #[error("fatal engine error: {0}")]
    Fatal(String),

    /// Transparent wrapper for ordinary I/O errors that don't fit the
    /// retry/quarantine distinctions above (e.g. `create_dir_all`).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named logical index profile/shard layout is not recognized.
    #[error("unknown index: {0}")]
    UnknownIndex(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
