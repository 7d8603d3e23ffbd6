//! # Working Tree Handle
//!
//! A [`WorkTree`] is the single-owner handle over the managed checkout. All
//! pipeline stages that touch the on-disk tree go through it, and none of
//! them cache tree state: every apply run resets to the relevant base tag
//! first, destroying uncommitted local changes on purpose.
//!
//! Concurrent runs against the same tree are not supported; the caller is
//! responsible for serializing them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::git::Git;

/// Hook installed into the tree so interactive rewrites re-tag correctly.
/// A fixed asset, not computed.
const POST_REWRITE_HOOK: &str = include_str!("../assets/post-rewrite.sh");

/// Name of the status marker file written on apply failure, relative to
/// `.git`. External tooling polls for it instead of parsing logs.
pub const APPLY_FAILED_MARKER: &str = "patch-apply-failed";

/// Exclusive handle over one managed working tree.
#[derive(Debug)]
pub struct WorkTree {
    root: PathBuf,
}

impl WorkTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root)
    }

    /// Ensure the target directory is a clean slate for a checkout.
    ///
    /// An existing git tree is cleaned and hard-reset so re-runs are
    /// idempotent and keep their object store; anything else is wiped and
    /// recreated empty.
    pub fn recreate(&self) -> Result<()> {
        if self.root.exists() {
            if self.root.join(".git").is_dir() {
                let git = self.git();
                git.run_silently(["clean", "-fxd"])?;
                git.run_silently(["reset", "--hard", "HEAD"])?;
            } else {
                for entry in fs::read_dir(&self.root)? {
                    let path = entry?.path();
                    if path.is_dir() {
                        fs::remove_dir_all(&path)?;
                    } else {
                        fs::remove_file(&path)?;
                    }
                }
            }
        } else {
            fs::create_dir_all(&self.root)?;
        }
        Ok(())
    }

    /// Check out `base_ref` from the upstream source into this tree,
    /// creating or advancing a local `main` branch.
    ///
    /// Uses a shallow fetch so large upstream histories stay cheap; the
    /// `upstream` remote is re-pointed on every run.
    pub fn checkout_from_upstream(&self, url: &str, base_ref: &str) -> Result<()> {
        let git = self.git();
        if !self.root.join(".git").is_dir() {
            git.execute_silently(["init", "-q", "--initial-branch=main"])?;
        }
        git.run_silently(["remote", "remove", "upstream"])?;
        git.execute_silently(["remote", "add", "upstream", url])?;
        git.execute_silently(["fetch", "--depth=1", "upstream", base_ref])?;
        git.execute_silently(["checkout", "-B", "main", "FETCH_HEAD"])?;
        Ok(())
    }

    /// Add (or replace) a supplemental remote and fetch it, so 3-way apply
    /// has blob objects that are not in the direct ancestor chain.
    pub fn fetch_additional_remote(&self, name: &str, url: &str) -> Result<()> {
        let git = self.git();
        git.run_silently(["remote", "remove", name])?;
        git.execute_silently(["remote", "add", name, url])?;
        git.execute_silently(["fetch", name])?;
        Ok(())
    }

    /// Install the post-rewrite hook asset. An existing hook file is
    /// overwritten silently.
    pub fn install_post_rewrite_hook(&self) -> Result<()> {
        let hook = self.root.join(".git/hooks/post-rewrite");
        if let Some(parent) = hook.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&hook, POST_REWRITE_HOOK)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&hook)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&hook, perms)?;
        }
        Ok(())
    }

    /// Force-tag the pristine checkout point.
    pub fn tag_base(&self) -> Result<()> {
        self.git().execute_silently(["tag", "-f", "base"])
    }

    /// Whether a previous apply left the tree in the needs-manual-resolution
    /// state.
    pub fn apply_failed_marker(&self) -> PathBuf {
        self.root.join(".git").join(APPLY_FAILED_MARKER)
    }

    /// Whether the tree is in the middle of a mailbox rebase.
    pub fn mid_rebase(&self) -> bool {
        self.root.join(".git/rebase-apply").exists()
    }
}
