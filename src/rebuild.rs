//! # Patch Layer Rebuilder
//!
//! Regenerates one patch file per commit between a layer's lower bound and
//! its marker commit, then filters out regenerated patches that carry no
//! semantic change relative to the previously committed patch set. The file
//! layer is the exception: its single marker commit is saved as one diff
//! per changed file instead of per commit.
//!
//! The marker commit itself is a synthetic checkpoint, not a logical
//! change, so the upper bound is always one commit before it. A layer whose
//! marker cannot be found has nothing to rebuild; finding more than one
//! marker is corrupt history and aborts before any destructive step.
//!
//! ## No-op filtering
//!
//! `format-patch` output drifts even when nothing real changed: context
//! line numbers shift, blob hashes churn. A regenerated patch is a no-op
//! when every added or removed line of its staged diff (diff headers
//! excluded) is an `index` metadata line. Calling out to git once per
//! `git diff --staged` is latency-dominated by process spawn, so the
//! classification fans out on the rayon pool; only the orchestrating thread
//! touches the index afterwards, once every worker has reported back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::Git;
use crate::layer::Layer;
use crate::worktree::WorkTree;

/// Fixed `format-patch` option set: deterministic diffs, zero-padded commit
/// ids suppressed, no binary stat summaries, so two rebuilds of identical
/// content produce byte-identical patch files.
const FORMAT_PATCH_ARGS: [&str; 6] = [
    "--diff-algorithm=myers",
    "--zero-commit",
    "--full-index",
    "--no-signature",
    "--no-stat",
    "-N",
];

/// Reverting no-op patches goes through the command line; chunking keeps it
/// bounded.
const REVERT_CHUNK_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    pub verbose: bool,
    /// Disable the no-op filter and keep every regenerated patch.
    pub no_filter: bool,
}

/// Counts for one layer rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Patch files regenerated by `format-patch`.
    pub regenerated: usize,
    /// Patch files kept after no-op filtering.
    pub kept: usize,
}

/// Rebuilds one layer's patch set from the working tree.
pub struct LayerRebuilder<'a> {
    tree: &'a WorkTree,
    config: &'a Config,
    options: RebuildOptions,
}

impl<'a> LayerRebuilder<'a> {
    pub fn new(tree: &'a WorkTree, config: &'a Config, options: RebuildOptions) -> Self {
        Self {
            tree,
            config,
            options,
        }
    }

    /// Regenerate the patch files for `layer`.
    pub fn rebuild(&self, layer: Layer) -> Result<RebuildReport> {
        let Some(patch_dir) = self.config.patch_dir(layer) else {
            log::info!("No patch directory configured for the {} layer", layer);
            return Ok(RebuildReport::default());
        };
        let git = self.tree.git();

        // The file layer is a bulk transformation sealed in one marker
        // commit, so there is no per-commit history to format; its patch
        // set is saved as one diff per changed file instead.
        if layer == Layer::File {
            return self.rebuild_file_layer(&git, patch_dir);
        }

        let range = match self.locate_range(&git, layer)? {
            Some(range) => range,
            None => {
                // zero matching marker commits: nothing to rebuild, not an
                // error
                log::info!("No {} marker commit found, nothing to rebuild", layer);
                return Ok(RebuildReport::default());
            }
        };

        // An empty range happens legitimately when a layer carries zero
        // patches. Check before touching the directory so an existing patch
        // set is never cleared for nothing.
        let count: usize = git
            .stdout(["rev-list", "--count", range.as_str()])?
            .trim()
            .parse()
            .unwrap_or(0);
        if count == 0 {
            log::info!("No commits to save for the {} layer", layer);
            return Ok(RebuildReport::default());
        }

        log::info!("Formatting patches for the {} layer...", layer);
        fs::create_dir_all(patch_dir)?;
        if self.tree.mid_rebase() {
            log::warn!("REBASE DETECTED - PARTIAL SAVE");
            self.partial_save(patch_dir)?;
        } else {
            fs::remove_dir_all(patch_dir)?;
            fs::create_dir_all(patch_dir)?;
        }

        git.run_silently(["fetch", "--all", "--prune"])?;

        let patch_dir_abs = absolutize(patch_dir)?;
        let mut args: Vec<&str> = vec!["format-patch"];
        args.extend(FORMAT_PATCH_ARGS);
        let out_arg = patch_dir_abs.to_string_lossy().into_owned();
        args.extend(["-o", out_arg.as_str(), range.as_str()]);
        git.execute_silently(&args)?;

        // The patch directory lives inside the repository that version
        // controls the patches; staging there gives the filter its
        // previous-state baseline.
        let patch_git = Git::new(patch_dir);
        patch_git.execute_silently(["add", "-A", "."])?;

        let patch_files = list_patch_files(patch_dir)?;
        let regenerated = patch_files.len();
        let kept = if self.options.no_filter || !self.config.filter_patches {
            regenerated
        } else {
            self.filter_noops(&patch_git, patch_dir, &patch_files)?
        };

        log::info!(
            "Saved modified patches ({}/{}) for the {} layer to {}",
            kept,
            regenerated,
            layer,
            patch_dir.display()
        );
        Ok(RebuildReport { regenerated, kept })
    }

    /// Save the file layer as one diff per file changed between the layer's
    /// bounding tags, mirroring each file's repository path under the patch
    /// directory. Runs the same marker validation and no-op filter as the
    /// commit layers.
    fn rebuild_file_layer(&self, git: &Git, patch_dir: &Path) -> Result<RebuildReport> {
        if self.locate_range(git, Layer::File)?.is_none() {
            log::info!("No file marker commit found, nothing to rebuild");
            return Ok(RebuildReport::default());
        }
        let lower = Layer::File.lower_tag();
        let changed = git.stdout(["diff", "--name-only", lower, "file"])?;
        let paths: Vec<&str> = changed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if paths.is_empty() {
            log::info!("No changes between {} and file, nothing to save", lower);
            return Ok(RebuildReport::default());
        }

        log::info!("Saving file patches for {} changed files...", paths.len());
        if patch_dir.exists() {
            fs::remove_dir_all(patch_dir)?;
        }
        fs::create_dir_all(patch_dir)?;
        for &path in &paths {
            let diff = git.stdout([
                "diff",
                "--diff-algorithm=myers",
                "--full-index",
                lower,
                "file",
                "--",
                path,
            ])?;
            let dest = patch_dir.join(format!("{}.patch", path));
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(dest, diff)?;
        }

        let patch_git = Git::new(patch_dir);
        patch_git.execute_silently(["add", "-A", "."])?;

        let patch_files = list_patch_files(patch_dir)?;
        let regenerated = patch_files.len();
        let kept = if self.options.no_filter || !self.config.filter_patches {
            regenerated
        } else {
            self.filter_noops(&patch_git, patch_dir, &patch_files)?
        };

        log::info!(
            "Saved modified patches ({}/{}) for the file layer to {}",
            kept,
            regenerated,
            patch_dir.display()
        );
        Ok(RebuildReport { regenerated, kept })
    }

    /// Validate marker uniqueness, re-point the layer tag, and return the
    /// commit range to format. `None` means there is nothing to rebuild.
    fn locate_range(&self, git: &Git, layer: Layer) -> Result<Option<String>> {
        let (Some(tag), Some(marker)) = (layer.tag(), layer.marker_message(&self.config.fork))
        else {
            // the feature layer's commits are the layer; its range is
            // everything above the file tag
            return Ok(Some(format!("{}..HEAD", layer.lower_tag())));
        };
        // fail fast if someone names a commit with the marker string to
        // avoid patch corruption
        let grep = format!("--grep={}", marker);
        let commits = git.stdout(["rev-list", grep.as_str(), "base..HEAD"])?;
        let matches: Vec<&str> = commits
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if matches.len() > 1 {
            return Err(Error::AmbiguousMarker {
                marker,
                count: matches.len(),
            });
        }
        let Some(&commit) = matches.first() else {
            return Ok(None);
        };

        // the marker may have moved under an interactive rewrite; follow it
        git.run_silently(["tag", "-f", tag, commit])?;

        // ~1 excludes the marker commit itself from the regenerated set
        Ok(Some(format!("{}..{}~1", layer.lower_tag(), tag)))
    }

    /// Mid-rebase save: the rebase has already replayed patches `1..next`,
    /// so their old files are stale and get removed (format-patch rewrites
    /// them from HEAD); the unprocessed tail is preserved as-is.
    fn partial_save(&self, patch_dir: &Path) -> Result<()> {
        let rebase_dir = self.tree.root().join(".git/rebase-apply");
        let next: usize = fs::read_to_string(rebase_dir.join("next"))?
            .trim()
            .parse()
            .map_err(|e| Error::Path {
                message: format!("unreadable rebase bookkeeping: {}", e),
            })?;

        let patch_files = list_patch_files(patch_dir)?;
        for patch in patch_files.iter().take(next.saturating_sub(1)) {
            fs::remove_file(patch)?;
        }
        Ok(())
    }

    /// Revert regenerated patches whose staged diff has no semantic change.
    /// Returns the number of patches kept.
    fn filter_noops(
        &self,
        patch_git: &Git,
        patch_root: &Path,
        patch_files: &[PathBuf],
    ) -> Result<usize> {
        if patch_files.is_empty() {
            return Ok(0);
        }

        let mut noops = classify_noops(patch_files, |patch| {
            let name = relative_name(patch, patch_root)?;
            patch_git.stdout(["diff", "--diff-algorithm=myers", "--staged", &name])
        });
        noops.sort();

        // Join barrier is behind us: only this thread mutates the index.
        for chunk in noops.chunks(REVERT_CHUNK_SIZE) {
            let names: Vec<String> = chunk
                .iter()
                .map(|p| relative_name(p, patch_root))
                .collect::<Result<_>>()?;
            let mut reset: Vec<&str> = vec!["reset", "-q", "HEAD"];
            reset.extend(names.iter().map(String::as_str));
            patch_git.execute_silently(&reset)?;
            let mut checkout: Vec<&str> = vec!["checkout", "-q", "--"];
            checkout.extend(names.iter().map(String::as_str));
            patch_git.execute_silently(&checkout)?;
        }

        Ok(patch_files.len() - noops.len())
    }
}

/// Classify patch files in parallel; `diff_for` supplies each file's staged
/// diff. A lookup failure keeps the patch (never silently discard a real
/// change). Workers only read; the shared queue is the only write target.
fn classify_noops<F>(patch_files: &[PathBuf], diff_for: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> Result<String> + Sync,
{
    let noops: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
    patch_files.par_iter().for_each(|patch| {
        match diff_for(patch) {
            Ok(diff) if is_noop_diff(&diff) => {
                noops.lock().unwrap().push(patch.clone());
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("keeping {} (classification failed: {})", patch.display(), e);
            }
        }
    });
    noops.into_inner().unwrap()
}

/// A diff is a no-op when every changed line, diff headers excluded, is
/// `index` blob metadata rather than content. The literal prefix test
/// matches what rebuilt histories were filtered with historically.
pub fn is_noop_diff(diff: &str) -> bool {
    diff.lines()
        .filter(|l| l.starts_with('+') || l.starts_with('-'))
        .filter(|l| !l.starts_with("+++") && !l.starts_with("---"))
        .all(|l| l.starts_with("+index") || l.starts_with("-index"))
}

/// `*.patch` files under `dir`, sorted. Commit-layer output is flat; the
/// file layer mirrors repository paths in subdirectories.
fn list_patch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut patches: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "patch"))
        .collect();
    patches.sort();
    Ok(patches)
}

fn relative_name(path: &Path, root: &Path) -> Result<String> {
    path.strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|_| Error::Path {
            message: format!("patch path escapes {}: {}", root.display(), path.display()),
        })
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
