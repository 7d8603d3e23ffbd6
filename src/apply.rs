//! # Patch Layer Applier
//!
//! Applies one layer's patch set onto the working tree and seals it with a
//! deterministic marker commit and boundary tag. The base layer also owns
//! the checkout: reset/recreate the tree, fetch the upstream base ref,
//! optionally fetch a supplemental remote for 3-way blob context, install
//! the post-rewrite hook, and tag the pristine state as `base`.
//!
//! Marker commits use a fixed author identity and a fixed historical
//! timestamp, so layer commits are content-addressed deterministically
//! across regenerations: applying the same patch set to the same base twice
//! produces an identical commit.
//!
//! Any apply failure is fatal for the layer. The tree keeps the conflict
//! state, a status marker file is written under `.git`, and the error tells
//! the operator to resolve manually and then persist the result with a
//! rebuild.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{Config, FileStrategy};
use crate::error::{Error, Result};
use crate::git::Git;
use crate::layer::{ApplyStrategy, Layer};
use crate::textpatch::{MatchMode, MatchSummary, TextPatcher};
use crate::worktree::WorkTree;

/// Fixed author email for synthetic layer commits.
const COMMIT_EMAIL: &str = "noreply+automated@patchstack.dev";

/// Fixed historical timestamp (1997-04-20T13:37:42Z) so marker commits hash
/// identically across regenerations.
const COMMIT_DATE: &str = "861543462 +0000";

/// `git am` command lines are built from a directory, but `git apply` takes
/// patch paths directly; chunking keeps those under platform limits.
const APPLY_CHUNK_SIZE: usize = 12;

/// Options threaded down from the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub verbose: bool,
    /// Escalate the file layer's matcher from offset to fuzzy.
    pub fuzzy: bool,
}

/// What one layer apply did.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub patches_applied: usize,
    /// Match-quality statistics when the fuzzy patcher ran.
    pub fuzzy_summary: Option<MatchSummary>,
    /// Patch files routed to the rejects directory.
    pub rejected: Vec<PathBuf>,
}

/// Applies a single layer onto the working tree.
pub struct LayerApplier<'a> {
    tree: &'a WorkTree,
    config: &'a Config,
    options: ApplyOptions,
}

impl<'a> LayerApplier<'a> {
    pub fn new(tree: &'a WorkTree, config: &'a Config, options: ApplyOptions) -> Self {
        Self {
            tree,
            config,
            options,
        }
    }

    /// Run the full apply state machine for `layer`.
    pub fn apply(&self, layer: Layer) -> Result<ApplyReport> {
        let git = self.tree.git();

        if layer == Layer::Base {
            self.prepare_base_checkout()?;
        } else {
            // Later layers always start from the previous layer's tag;
            // uncommitted local changes are destroyed by design.
            if git.run_silently(["checkout", "main"])? != 0 {
                git.run_silently(["checkout", "-b", "main"])?;
            }
            git.run_silently(["reset", "--hard", layer.lower_tag()])?;
        }

        // Clear stale failure state from a previous run.
        let marker_file = self.tree.apply_failed_marker();
        let _ = fs::remove_file(&marker_file);
        git.run_silently(["am", "--abort"])?;

        let patches = self
            .config
            .patch_dir(layer)
            .filter(|dir| dir.exists())
            .map(collect_patch_files)
            .transpose()?
            .unwrap_or_default();

        let report = if patches.is_empty() {
            log::info!("No patches found for the {} layer", layer);
            ApplyReport::default()
        } else {
            let strategy = match (layer.default_strategy(), self.config.strategy) {
                (ApplyStrategy::Fuzzy, FileStrategy::Git) => ApplyStrategy::ThreeWay,
                (strategy, _) => strategy,
            };
            match strategy {
                ApplyStrategy::Mailbox => self.apply_mailbox(layer, &patches)?,
                ApplyStrategy::ThreeWay => self.apply_three_way(layer, &patches)?,
                ApplyStrategy::Fuzzy => self.apply_fuzzy(layer)?,
            }
        };

        if layer.tag().is_some() {
            self.commit_marker(layer)?;
        }

        let _ = fs::remove_file(&marker_file);
        Ok(report)
    }

    /// Steps 1-5 of the base layer: clone/reset, checkout, remotes, hook,
    /// pristine tag.
    fn prepare_base_checkout(&self) -> Result<()> {
        self.tree.recreate()?;
        self.tree
            .checkout_from_upstream(&self.config.upstream.url, &self.config.upstream.r#ref)?;
        if let Some(remote) = &self.config.additional_remote {
            self.tree
                .fetch_additional_remote(&self.config.remote_name, remote)?;
        }
        self.tree.install_post_rewrite_hook()?;
        self.tree.tag_base()
    }

    /// `git am --3way` over the whole patch set, staged through a temp
    /// mailbox directory so the command line stays short.
    fn apply_mailbox(&self, layer: Layer, patches: &[PathBuf]) -> Result<ApplyReport> {
        let git = self.tree.git();
        let mail_dir = tempfile::Builder::new().prefix("patchstack").tempdir()?;
        // git reads a directory argument as a Maildir and only looks at its
        // new/ and cur/ subdirectories, so the patches must land in new/.
        let new_dir = mail_dir.path().join("new");
        fs::create_dir(&new_dir)?;
        for patch in patches {
            let file_name = patch.file_name().ok_or_else(|| Error::Path {
                message: format!("patch path has no file name: {}", patch.display()),
            })?;
            fs::copy(patch, new_dir.join(file_name))?;
        }

        let mail_path = mail_dir.path().to_string_lossy().into_owned();
        // Authorship comes from each patch's mail headers; pinning the
        // committer identity keeps replayed commit hashes reproducible.
        let output = git.run_with_env(
            ["am", "--3way", "--ignore-whitespace", mail_path.as_str()],
            committer_env(layer),
        )?;
        if !output.success() {
            fs::write(self.tree.apply_failed_marker(), "1")?;
            // surface git's own conflict report even in quiet runs
            log::error!("{}", output.combined());
            return Err(Error::PatchApply {
                layer: layer.to_string(),
                message: format!("git am exited with status {}", output.code),
            });
        }

        log::info!("{} patches applied cleanly to the {} layer", patches.len(), layer);
        Ok(ApplyReport {
            patches_applied: patches.len(),
            ..Default::default()
        })
    }

    /// `git apply --3way` per patch file. With reject routing enabled, a
    /// partial apply moves the source patch aside and rolls the touched file
    /// back, so a human can resolve that one patch without re-running the
    /// layer.
    fn apply_three_way(&self, layer: Layer, patches: &[PathBuf]) -> Result<ApplyReport> {
        let git = self.tree.git();
        let patch_root = self.config.patch_dir(layer).ok_or_else(|| Error::Path {
            message: format!("no patch directory configured for the {} layer", layer),
        })?;

        let mut report = ApplyReport::default();
        if self.config.move_failed_to_rejects {
            let rejects_dir = self.config.rejects.as_deref().ok_or_else(|| Error::Path {
                message: "reject routing enabled without a rejects directory".to_string(),
            })?;
            for patch in patches {
                match self.apply_one_three_way(&git, patch)? {
                    0 => report.patches_applied += 1,
                    1 => {
                        self.route_reject(&git, patch_root, patch, rejects_dir)?;
                        report.rejected.push(patch.clone());
                    }
                    code => {
                        fs::write(self.tree.apply_failed_marker(), "1")?;
                        return Err(Error::PatchApply {
                            layer: layer.to_string(),
                            message: format!(
                                "git apply --3way exited with status {} for {}",
                                code,
                                patch.display()
                            ),
                        });
                    }
                }
            }
        } else {
            for chunk in patches.chunks(APPLY_CHUNK_SIZE) {
                let mut args: Vec<String> = vec!["apply".into(), "--3way".into()];
                args.extend(chunk.iter().map(|p| p.to_string_lossy().into_owned()));
                if let Err(e) = git.execute_silently(&args) {
                    fs::write(self.tree.apply_failed_marker(), "1")?;
                    return Err(Error::PatchApply {
                        layer: layer.to_string(),
                        message: e.to_string(),
                    });
                }
                report.patches_applied += chunk.len();
            }
        }

        Ok(report)
    }

    fn apply_one_three_way(&self, git: &Git, patch: &Path) -> Result<i32> {
        let patch_arg = patch.to_string_lossy();
        let output = git.run([
            "-c",
            "rerere.enabled=false",
            "apply",
            "--3way",
            patch_arg.as_ref(),
        ])?;
        if self.options.verbose && !output.success() {
            log::warn!("{}", output.combined());
        }
        Ok(output.code)
    }

    /// Roll back the partially-applied target file and move the source
    /// patch into the rejects directory, mirroring its relative path.
    fn route_reject(
        &self,
        git: &Git,
        patch_root: &Path,
        patch: &Path,
        rejects_dir: &Path,
    ) -> Result<()> {
        let rel = patch.strip_prefix(patch_root).map_err(|_| Error::Path {
            message: format!(
                "{} is not under the patch root {}",
                patch.display(),
                patch_root.display()
            ),
        })?;

        // File patches are named after the file they change, so stripping
        // the .patch suffix yields the patched path inside the tree.
        let failed_file = rel.with_extension("");
        if self.tree.root().join(&failed_file).exists() {
            let failed = failed_file.to_string_lossy();
            git.run_silently(["reset", "--", failed.as_ref()])?;
            git.run_silently(["restore", failed.as_ref()])?;
        }

        let reject_path = rejects_dir.join(rel);
        if let Some(parent) = reject_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(patch, &reject_path).or_else(|_| -> Result<()> {
            // cross-device move falls back to copy+remove
            fs::copy(patch, &reject_path)?;
            fs::remove_file(patch)?;
            Ok(())
        })?;
        log::warn!(
            "Moved failed patch {} to {}",
            rel.display(),
            reject_path.display()
        );
        Ok(())
    }

    /// Delegate to the fuzzy text patcher; any failed hunk aborts the layer
    /// with the failure ratio.
    fn apply_fuzzy(&self, layer: Layer) -> Result<ApplyReport> {
        let patch_root = self.config.patch_dir(layer).ok_or_else(|| Error::Path {
            message: format!("no patch directory configured for the {} layer", layer),
        })?;

        let mode = if self.options.fuzzy {
            MatchMode::Fuzzy
        } else {
            MatchMode::Offset
        };
        let mut patcher = TextPatcher::new(self.tree.root())
            .mode(mode)
            .min_fuzz(self.config.min_fuzz);
        if let Some(rejects) = &self.config.rejects {
            patcher = patcher.rejects_dir(rejects);
        }

        let summary = patcher.apply_set(patch_root)?;
        if !summary.is_success() {
            fs::write(self.tree.apply_failed_marker(), "1")?;
            return Err(Error::FuzzyApply {
                failed: summary.failed,
                total: summary.total(),
                min_fuzz: self.config.min_fuzz,
            });
        }

        Ok(ApplyReport {
            patches_applied: summary.changed_files,
            fuzzy_summary: Some(summary),
            ..Default::default()
        })
    }

    /// Stage everything and seal the layer with its marker commit and tag.
    fn commit_marker(&self, layer: Layer) -> Result<()> {
        let git = self.tree.git();
        let (Some(message), Some(tag)) = (layer.marker_message(&self.config.fork), layer.tag())
        else {
            return Ok(());
        };

        git.execute_silently(["add", "-A", "."])?;
        let output = git.run_with_env(
            [
                "commit",
                "-q",
                "--allow-empty",
                "--no-gpg-sign",
                "-m",
                message.as_str(),
            ],
            commit_identity_env(layer),
        )?;
        if !output.success() {
            return Err(Error::GitCommand {
                command: "commit".to_string(),
                dir: self.tree.root().display().to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        git.execute_silently(["tag", "-f", tag])?;
        Ok(())
    }
}

/// Fixed committer identity for replayed and synthetic commits.
fn committer_env(layer: Layer) -> [(&'static str, &'static str); 3] {
    [
        ("GIT_COMMITTER_NAME", layer.commit_author()),
        ("GIT_COMMITTER_EMAIL", COMMIT_EMAIL),
        ("GIT_COMMITTER_DATE", COMMIT_DATE),
    ]
}

/// Author plus committer identity for a layer's synthetic commits. Also
/// used for git operations that rewrite layer commits, so the work tree
/// never depends on a configured user identity.
pub(crate) fn commit_identity_env(layer: Layer) -> [(&'static str, &'static str); 6] {
    let [c0, c1, c2] = committer_env(layer);
    [
        ("GIT_AUTHOR_NAME", layer.commit_author()),
        ("GIT_AUTHOR_EMAIL", COMMIT_EMAIL),
        ("GIT_AUTHOR_DATE", COMMIT_DATE),
        c0,
        c1,
        c2,
    ]
}

/// All `*.patch` files under a directory, lexicographically ordered so the
/// on-disk order is the application order.
pub fn collect_patch_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut patches: Vec<PathBuf> = WalkDir::new(dir.as_ref())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "patch"))
        .map(|e| e.into_path())
        .collect();
    patches.sort();
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) -> Git {
        let git = Git::new(dir);
        git.execute_silently(["init", "-q", "--initial-branch=main"])
            .unwrap();
        git.execute_silently(["config", "user.name", "test"]).unwrap();
        git.execute_silently(["config", "user.email", "test@example.org"])
            .unwrap();
        git
    }

    fn commit_all(git: &Git, message: &str) {
        git.execute_silently(["add", "-A", "."]).unwrap();
        git.execute_silently(["commit", "-q", "-m", message]).unwrap();
    }

    fn test_config(temp: &TempDir, patches: BTreeMap<Layer, PathBuf>) -> Config {
        Config {
            fork: "Example".to_string(),
            upstream: crate::config::Upstream {
                url: temp.path().join("upstream").to_string_lossy().into_owned(),
                r#ref: "main".to_string(),
            },
            work_dir: temp.path().join("work"),
            patches,
            rejects: None,
            strategy: FileStrategy::Fuzzy,
            move_failed_to_rejects: false,
            filter_patches: true,
            min_fuzz: 0.5,
            additional_remote: None,
            remote_name: "old".to_string(),
        }
    }

    fn setup_upstream(temp: &TempDir) {
        let upstream = temp.path().join("upstream");
        fs::create_dir_all(&upstream).unwrap();
        let git = init_repo(&upstream);
        fs::write(upstream.join("README.md"), "# upstream\n").unwrap();
        fs::write(upstream.join("src.txt"), "one\ntwo\nthree\n").unwrap();
        commit_all(&git, "upstream init");
    }

    #[test]
    fn test_collect_patch_files_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("0002-b.patch"), "").unwrap();
        fs::write(temp.path().join("0001-a.patch"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested/0003-c.patch"), "").unwrap();

        let patches = collect_patch_files(temp.path()).unwrap();
        let names: Vec<_> = patches
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0001-a.patch", "0002-b.patch", "nested/0003-c.patch"]);
    }

    #[test]
    fn test_empty_base_layer_still_tags() {
        let temp = TempDir::new().unwrap();
        setup_upstream(&temp);
        let config = test_config(&temp, BTreeMap::new());
        let tree = WorkTree::new(&config.work_dir);

        let applier = LayerApplier::new(&tree, &config, ApplyOptions::default());
        let report = applier.apply(Layer::Base).unwrap();
        assert_eq!(report.patches_applied, 0);

        let git = tree.git();
        assert_eq!(git.stdout(["tag", "-l", "base"]).unwrap().trim(), "base");
        assert_eq!(
            git.stdout(["tag", "-l", "patchedBase"]).unwrap().trim(),
            "patchedBase"
        );
        let subject = git.stdout(["log", "-1", "--format=%s"]).unwrap();
        assert_eq!(subject.trim(), "Example Base Patches");
    }

    #[test]
    fn test_marker_commit_is_deterministic() {
        let temp = TempDir::new().unwrap();
        setup_upstream(&temp);
        let config = test_config(&temp, BTreeMap::new());
        let tree = WorkTree::new(&config.work_dir);
        let applier = LayerApplier::new(&tree, &config, ApplyOptions::default());

        applier.apply(Layer::Base).unwrap();
        let first = tree.git().stdout(["rev-parse", "patchedBase"]).unwrap();

        // re-run from scratch; fixed identity and timestamp must reproduce
        // the same commit hash
        applier.apply(Layer::Base).unwrap();
        let second = tree.git().stdout(["rev-parse", "patchedBase"]).unwrap();
        assert_eq!(first.trim(), second.trim());
    }

    #[test]
    fn test_base_layer_mailbox_apply() {
        let temp = TempDir::new().unwrap();
        setup_upstream(&temp);

        // produce a mailbox patch against the upstream with format-patch
        let scratch = temp.path().join("scratch");
        let git = Git::new(&scratch);
        fs::create_dir_all(&scratch).unwrap();
        git.execute_silently([
            "clone",
            "-q",
            temp.path().join("upstream").to_str().unwrap(),
            ".",
        ])
        .unwrap();
        git.execute_silently(["config", "user.name", "test"]).unwrap();
        git.execute_silently(["config", "user.email", "test@example.org"])
            .unwrap();
        fs::write(scratch.join("src.txt"), "one\nTWO\nthree\n").unwrap();
        commit_all(&git, "uppercase two");
        let patch_dir = temp.path().join("patches/base");
        fs::create_dir_all(&patch_dir).unwrap();
        git.execute_silently([
            "format-patch",
            "-1",
            "-o",
            patch_dir.to_str().unwrap(),
            "HEAD",
        ])
        .unwrap();

        let mut patches = BTreeMap::new();
        patches.insert(Layer::Base, patch_dir);
        let config = test_config(&temp, patches);
        let tree = WorkTree::new(&config.work_dir);
        let applier = LayerApplier::new(&tree, &config, ApplyOptions::default());

        let report = applier.apply(Layer::Base).unwrap();
        assert_eq!(report.patches_applied, 1);
        assert_eq!(
            fs::read_to_string(tree.root().join("src.txt")).unwrap(),
            "one\nTWO\nthree\n"
        );
        // one replayed patch commit plus the marker commit
        let count = tree
            .git()
            .stdout(["rev-list", "--count", "base..patchedBase"])
            .unwrap();
        assert_eq!(count.trim(), "2");
        assert!(!tree.apply_failed_marker().exists());
    }

    #[test]
    fn test_file_layer_fuzzy_apply_failure_writes_marker() {
        let temp = TempDir::new().unwrap();
        setup_upstream(&temp);

        let patch_dir = temp.path().join("patches/file");
        fs::create_dir_all(&patch_dir).unwrap();
        fs::write(
            patch_dir.join("src.txt.patch"),
            "--- a/src.txt\n+++ b/src.txt\n@@ -1,1 +1,1 @@\n-does not exist anywhere\n+replacement\n",
        )
        .unwrap();

        let mut patches = BTreeMap::new();
        patches.insert(Layer::File, patch_dir);
        let config = test_config(&temp, patches);
        let tree = WorkTree::new(&config.work_dir);
        let applier = LayerApplier::new(&tree, &config, ApplyOptions::default());

        applier.apply(Layer::Base).unwrap();
        let err = applier.apply(Layer::File).unwrap_err();
        assert!(matches!(err, Error::FuzzyApply { failed: 1, .. }));
        assert!(tree.apply_failed_marker().exists());
    }

    #[test]
    fn test_three_way_fatal_failure_writes_marker() {
        let temp = TempDir::new().unwrap();
        setup_upstream(&temp);

        let patch_dir = temp.path().join("patches/file");
        fs::create_dir_all(&patch_dir).unwrap();
        fs::write(patch_dir.join("garbage.patch"), "this is not a patch\n").unwrap();

        let mut patches = BTreeMap::new();
        patches.insert(Layer::File, patch_dir);
        let mut config = test_config(&temp, patches);
        config.strategy = FileStrategy::Git;
        let tree = WorkTree::new(&config.work_dir);
        let applier = LayerApplier::new(&tree, &config, ApplyOptions::default());

        applier.apply(Layer::Base).unwrap();
        let err = applier.apply(Layer::File).unwrap_err();
        assert!(matches!(err, Error::PatchApply { .. }));
        assert!(tree.apply_failed_marker().exists());
    }

    #[test]
    fn test_file_layer_fuzzy_apply_and_tag() {
        let temp = TempDir::new().unwrap();
        setup_upstream(&temp);

        let patch_dir = temp.path().join("patches/file");
        fs::create_dir_all(&patch_dir).unwrap();
        fs::write(
            patch_dir.join("src.txt.patch"),
            "--- a/src.txt\n+++ b/src.txt\n@@ -1,3 +1,3 @@\n one\n-two\n+deux\n three\n",
        )
        .unwrap();

        let mut patches = BTreeMap::new();
        patches.insert(Layer::File, patch_dir);
        let config = test_config(&temp, patches);
        let tree = WorkTree::new(&config.work_dir);
        let applier = LayerApplier::new(&tree, &config, ApplyOptions::default());

        applier.apply(Layer::Base).unwrap();
        let report = applier.apply(Layer::File).unwrap();
        assert_eq!(report.fuzzy_summary.unwrap().exact, 1);

        let git = tree.git();
        assert_eq!(git.stdout(["tag", "-l", "file"]).unwrap().trim(), "file");
        assert_eq!(
            fs::read_to_string(tree.root().join("src.txt")).unwrap(),
            "one\ndeux\nthree\n"
        );
        let subject = git.stdout(["log", "-1", "--format=%s"]).unwrap();
        assert_eq!(subject.trim(), "Example File Patches");
    }
}
