//! Patch application with line-offset and fuzzy-context matching.
//!
//! Each hunk is tried in escalating order: exact content at the declared
//! offset, exact content at a drifted offset, then a similarity-scored
//! window search. Which rung succeeded is recorded per hunk so the caller
//! can see how healthy the patch set is against this base.

use std::fs;
use std::path::{Path, PathBuf};

use similar::TextDiff;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::textpatch::parser::{parse_patch, FileDiff, Hunk};
use crate::textpatch::{MatchSummary, DEFAULT_MIN_FUZZ};

/// Match mode, from strictest to most forgiving. Each mode includes the
/// rungs below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Declared offset only.
    Exact,
    /// Allow the hunk to drift to a shifted offset with identical content.
    #[default]
    Offset,
    /// Additionally accept a context-similarity match above the minimum
    /// score.
    Fuzzy,
}

/// How one hunk was placed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum HunkMatch {
    Exact,
    Offset(isize),
    /// Similarity match, with the 0-based index the window landed on.
    Fuzzy(usize),
    Failed,
}

/// Applies a patch-set directory against a base directory tree.
pub struct TextPatcher {
    base_dir: PathBuf,
    /// Write results here instead of in place, when set.
    output_dir: Option<PathBuf>,
    rejects_dir: Option<PathBuf>,
    mode: MatchMode,
    min_fuzz: f32,
}

impl TextPatcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            output_dir: None,
            rejects_dir: None,
            mode: MatchMode::default(),
            min_fuzz: DEFAULT_MIN_FUZZ,
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn rejects_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rejects_dir = Some(dir.into());
        self
    }

    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn min_fuzz(mut self, min_fuzz: f32) -> Self {
        self.min_fuzz = min_fuzz;
        self
    }

    /// Apply every `*.patch` under `patch_root`, lexicographic order.
    ///
    /// Returns the aggregated match summary; a non-zero failed count is
    /// reported, not raised, so the caller owns the failure policy.
    pub fn apply_set(&self, patch_root: &Path) -> Result<MatchSummary> {
        let mut patch_files: Vec<PathBuf> = WalkDir::new(patch_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "patch"))
            .map(|e| e.into_path())
            .collect();
        patch_files.sort();

        let mut summary = MatchSummary::default();
        for patch_path in &patch_files {
            let rel = patch_path.strip_prefix(patch_root).map_err(|_| Error::Path {
                message: format!(
                    "{} is not under the patch root {}",
                    patch_path.display(),
                    patch_root.display()
                ),
            })?;
            let file_summary = self.apply_patch_file(patch_path, rel)?;
            summary.merge(&file_summary);
        }
        Ok(summary)
    }

    /// Apply a single patch file; `rel` is its path relative to the patch
    /// root, mirrored into the rejects directory on failure.
    pub fn apply_patch_file(&self, patch_path: &Path, rel: &Path) -> Result<MatchSummary> {
        let text = fs::read_to_string(patch_path)?;
        let name = patch_path.display().to_string();
        let diffs = parse_patch(&name, &text)?;

        let mut summary = MatchSummary::default();
        let mut rejected_hunks: Vec<(FileDiff, Vec<Hunk>)> = Vec::new();

        for diff in &diffs {
            let (file_summary, failed) = self.apply_file_diff(diff)?;
            summary.merge(&file_summary);
            if !failed.is_empty() {
                rejected_hunks.push((diff.clone(), failed));
            }
        }

        if !rejected_hunks.is_empty() {
            if let Some(rejects_dir) = &self.rejects_dir {
                write_rejects(rejects_dir, rel, &rejected_hunks)?;
            }
            log::warn!(
                "{}: {} hunk(s) failed to match",
                patch_path.display(),
                rejected_hunks.iter().map(|(_, h)| h.len()).sum::<usize>()
            );
        }

        Ok(summary)
    }

    fn target_for(&self, rel: &str) -> PathBuf {
        self.output_dir
            .as_deref()
            .unwrap_or(&self.base_dir)
            .join(rel)
    }

    /// Apply one file's diff. Returns the summary plus the hunks that could
    /// not be placed; failed hunks are never partially applied.
    fn apply_file_diff(&self, diff: &FileDiff) -> Result<(MatchSummary, Vec<Hunk>)> {
        let mut summary = MatchSummary::default();
        let mut failed: Vec<Hunk> = Vec::new();

        let rel = diff
            .target_path()
            .ok_or_else(|| Error::Path {
                message: "file diff without a target path".to_string(),
            })?
            .to_string();

        if diff.is_mode_only() {
            let target = self.target_for(&rel);
            if self.output_dir.is_some() && !target.exists() {
                let src = self.base_dir.join(&rel);
                copy_into_place(&src, &target)?;
            }
            set_executable(&target, diff.new_mode)?;
            summary.access += 1;
            summary.changed_files += 1;
            return Ok((summary, failed));
        }

        if diff.is_delete() {
            let target = self.target_for(&rel);
            if target.exists() {
                fs::remove_file(&target)?;
            }
            summary.exact += diff.hunks.len().max(1);
            summary.changed_files += 1;
            return Ok((summary, failed));
        }

        // New files go through the same pipeline with zero-context
        // acceptance: nothing to match against, everything is an insert.
        let source = self.base_dir.join(&rel);
        let original = if diff.is_new_file() || !source.exists() {
            String::new()
        } else {
            fs::read_to_string(&source)?
        };
        let had_trailing_newline = original.ends_with('\n') || original.is_empty();

        let mut lines: Vec<String> = original.lines().map(|l| l.to_string()).collect();
        // Running difference between declared and actual line numbers,
        // updated as earlier hunks grow or shrink the file.
        let mut delta: isize = 0;
        let mut any_applied = false;

        for hunk in &diff.hunks {
            match self.place_hunk(&lines, hunk, delta) {
                HunkMatch::Exact => {
                    let at = expected_index(hunk, delta, lines.len());
                    delta += splice_hunk(&mut lines, hunk, at);
                    summary.exact += 1;
                    any_applied = true;
                }
                HunkMatch::Offset(shift) => {
                    let at = (expected_index(hunk, delta, lines.len()) as isize + shift) as usize;
                    delta += splice_hunk(&mut lines, hunk, at);
                    summary.offset += 1;
                    any_applied = true;
                }
                HunkMatch::Fuzzy(at) => {
                    delta += splice_hunk(&mut lines, hunk, at);
                    summary.fuzzy += 1;
                    any_applied = true;
                }
                HunkMatch::Failed => {
                    summary.failed += 1;
                    failed.push(hunk.clone());
                }
            }
        }

        if any_applied || diff.is_new_file() {
            let target = self.target_for(&rel);
            let mut content = lines.join("\n");
            if had_trailing_newline && !diff.no_newline && !content.is_empty() {
                content.push('\n');
            }
            copy_parent_dirs(&target)?;
            fs::write(&target, content)?;
            if diff.new_mode.is_some() {
                set_executable(&target, diff.new_mode)?;
            }
            summary.changed_files += 1;
        }

        Ok((summary, failed))
    }

    /// Decide where (and whether) a hunk fits, without mutating the file.
    fn place_hunk(&self, lines: &[String], hunk: &Hunk, delta: isize) -> HunkMatch {
        let old = hunk.old_lines();

        // Pure insertion with no context: accept at the declared offset.
        if old.is_empty() {
            return HunkMatch::Exact;
        }

        let expected = expected_index(hunk, delta, lines.len());
        if window_matches(lines, expected, &old) {
            return HunkMatch::Exact;
        }
        if self.mode == MatchMode::Exact {
            return HunkMatch::Failed;
        }

        // Offset rung: identical content at a shifted position, nearest
        // drift wins.
        if let Some(shift) = nearest_exact_window(lines, expected, &old) {
            return HunkMatch::Offset(shift);
        }
        if self.mode == MatchMode::Offset {
            return HunkMatch::Failed;
        }

        match self.best_fuzzy_score(lines, hunk) {
            Some((at, score)) if score >= self.min_fuzz => HunkMatch::Fuzzy(at),
            _ => HunkMatch::Failed,
        }
    }

    /// Slide the hunk over the whole file and score each window by the mean
    /// per-line similarity of non-whitespace content.
    fn best_fuzzy_score(&self, lines: &[String], hunk: &Hunk) -> Option<(usize, f32)> {
        let old = hunk.old_lines();
        if old.is_empty() || lines.len() < old.len() {
            return None;
        }
        let mut best: Option<(usize, f32)> = None;
        for start in 0..=(lines.len() - old.len()) {
            let window = &lines[start..start + old.len()];
            let score = window_similarity(window, &old);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((start, score)),
            }
        }
        best
    }
}

/// 0-based index the hunk's header points at, clamped to the file.
fn expected_index(hunk: &Hunk, delta: isize, len: usize) -> usize {
    let declared = hunk.old_start.saturating_sub(1) as isize + delta;
    declared.clamp(0, len as isize) as usize
}

fn window_matches(lines: &[String], start: usize, old: &[&str]) -> bool {
    if start + old.len() > lines.len() {
        return false;
    }
    lines[start..start + old.len()]
        .iter()
        .zip(old)
        .all(|(have, want)| have == want)
}

/// Search outward from the expected index for an exact content match,
/// returning the smallest drift.
fn nearest_exact_window(lines: &[String], expected: usize, old: &[&str]) -> Option<isize> {
    if lines.len() < old.len() {
        return None;
    }
    let max_start = lines.len() - old.len();
    let mut drift: isize = 1;
    loop {
        let below = expected as isize - drift;
        let above = expected as isize + drift;
        if below < 0 && above > max_start as isize {
            return None;
        }
        if below >= 0 && window_matches(lines, below as usize, old) {
            return Some(-drift);
        }
        if above <= max_start as isize && window_matches(lines, above as usize, old) {
            return Some(drift);
        }
        drift += 1;
    }
}

/// Mean per-line char-level similarity over whitespace-trimmed content.
fn window_similarity(window: &[String], old: &[&str]) -> f32 {
    let mut total = 0.0f32;
    for (have, want) in window.iter().zip(old) {
        let have = have.trim();
        let want = want.trim();
        if have == want {
            total += 1.0;
        } else if have.is_empty() || want.is_empty() {
            // one side blank, nothing to compare
        } else {
            total += TextDiff::from_chars(want, have).ratio();
        }
    }
    total / old.len() as f32
}

/// Replace the hunk's old window at `at` with its new lines. Returns the
/// change in line count for subsequent hunks.
fn splice_hunk(lines: &mut Vec<String>, hunk: &Hunk, at: usize) -> isize {
    let old_len = hunk.old_lines().len();
    let new_lines: Vec<String> = hunk.new_lines().iter().map(|s| s.to_string()).collect();
    let at = at.min(lines.len());
    let end = (at + old_len).min(lines.len());
    let new_len = new_lines.len() as isize;
    lines.splice(at..end, new_lines);
    new_len - old_len as isize
}

fn copy_parent_dirs(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn copy_into_place(src: &Path, target: &Path) -> Result<()> {
    copy_parent_dirs(target)?;
    fs::copy(src, target)?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(target: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let Some(mode) = mode else { return Ok(()) };
    if !target.exists() {
        return Ok(());
    }
    let executable = mode & 0o111 != 0;
    let metadata = fs::metadata(target)?;
    let mut perms = metadata.permissions();
    let current = perms.mode();
    let new = if executable {
        current | 0o755
    } else {
        current & !0o111
    };
    perms.set_mode(new);
    fs::set_permissions(target, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_target: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Persist the unmatched hunks of a patch, mirroring its relative path under
/// the rejects directory.
fn write_rejects(
    rejects_dir: &Path,
    rel: &Path,
    rejected: &[(FileDiff, Vec<Hunk>)],
) -> Result<()> {
    let mut out = String::new();
    for (diff, hunks) in rejected {
        let path = diff.target_path().unwrap_or("unknown");
        out.push_str(&format!("--- a/{}\n+++ b/{}\n", path, path));
        for hunk in hunks {
            out.push_str(&hunk.render());
        }
    }
    let reject_path = rejects_dir.join(rel).with_extension("patch.rej");
    copy_parent_dirs(&reject_path)?;
    fs::write(reject_path, out)?;
    Ok(())
}
