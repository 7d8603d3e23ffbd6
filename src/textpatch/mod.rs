//! # Fuzzy Text Patcher
//!
//! Applies unified-diff patch sets against a directory tree without any
//! version-control involvement. Each hunk is located by exact line offset
//! first, then by letting it drift within the file, then by a
//! context-similarity search scored with a line-similarity metric. Per-hunk
//! match quality is aggregated into a [`MatchSummary`]; hunks that cannot be
//! placed are written verbatim to a rejects directory instead of being
//! applied.
//!
//! The caller decides whether any failures are fatal; the file layer of the
//! stack treats a non-zero failed count as an abort.

mod applier;
mod parser;

pub use applier::{MatchMode, TextPatcher};
pub use parser::{parse_patch, FileDiff, Hunk, HunkLine};

/// Default minimum fuzzy-match score, tuned for line-similarity heuristics.
pub const DEFAULT_MIN_FUZZ: f32 = 0.5;

/// Aggregated per-hunk match quality for one patcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSummary {
    /// Hunks applied at their declared offset.
    pub exact: usize,
    /// Hunks that drifted but matched exactly at a shifted offset.
    pub offset: usize,
    /// Hunks placed by the similarity search.
    pub fuzzy: usize,
    /// File-permission-only changes.
    pub access: usize,
    /// Hunks that could not be placed at all.
    pub failed: usize,
    /// Files whose content or mode changed.
    pub changed_files: usize,
}

impl MatchSummary {
    /// Grand total of classified hunks, access changes included.
    pub fn total(&self) -> usize {
        self.exact + self.offset + self.fuzzy + self.access + self.failed
    }

    /// The run succeeded iff nothing failed to match.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: &MatchSummary) {
        self.exact += other.exact;
        self.offset += other.offset;
        self.fuzzy += other.fuzzy;
        self.access += other.access;
        self.failed += other.failed;
        self.changed_files += other.changed_files;
    }
}
