//! Shared fixture for integration tests: a local upstream repository plus a
//! fork repository seeded with one patch per layer, and a configuration
//! file pointing at both with absolute paths.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Run git in `dir` with a fixed fixture identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Fixture")
        .env("GIT_AUTHOR_EMAIL", "fixture@example.org")
        .env("GIT_COMMITTER_NAME", "Fixture")
        .env("GIT_COMMITTER_EMAIL", "fixture@example.org")
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn git {:?}: {}", args, e));
    assert!(
        output.status.success(),
        "git {:?} in {} failed:\n{}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub struct Fixture {
    pub upstream: PathBuf,
    pub fork: PathBuf,
    pub work_dir: PathBuf,
    pub config_path: PathBuf,
}

impl Fixture {
    pub fn patch_dir(&self, layer: &str) -> PathBuf {
        self.fork.join("patches").join(layer)
    }

    pub fn rejects_dir(&self) -> PathBuf {
        self.fork.join("rejects")
    }
}

/// Build the standard fixture under `root`:
///
/// - `upstream/` with `greeting.txt` and `numbers.txt` on `main`
/// - `fork/patches/base/` with a mailbox patch adding `base.txt`
/// - `fork/patches/file/` with a unified diff editing `greeting.txt`
/// - `fork/patches/feature/` with a mailbox patch adding `feature.txt`
/// - `.patchstack.yaml` wired up with absolute paths
pub fn build(root: &Path) -> Fixture {
    let upstream = root.join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-q", "--initial-branch=main"]);
    fs::write(upstream.join("greeting.txt"), "hello\nworld\n").unwrap();
    fs::write(upstream.join("numbers.txt"), "one\ntwo\nthree\nfour\n").unwrap();
    git(&upstream, &["add", "-A", "."]);
    git(&upstream, &["commit", "-q", "-m", "upstream init"]);

    let fork = root.join("fork");
    for layer in ["base", "file", "feature"] {
        fs::create_dir_all(fork.join("patches").join(layer)).unwrap();
    }
    git(&fork, &["init", "-q", "--initial-branch=main"]);

    mailbox_patch(
        root,
        &upstream,
        &fork.join("patches/base"),
        "base.txt",
        "base layer notes\n",
        "Add base notes",
    );
    mailbox_patch(
        root,
        &upstream,
        &fork.join("patches/feature"),
        "feature.txt",
        "the feature\n",
        "Add the feature",
    );

    fs::write(
        fork.join("patches/file/greeting.txt.patch"),
        "--- a/greeting.txt\n\
         +++ b/greeting.txt\n\
         @@ -1,2 +1,2 @@\n \
         hello\n\
         -world\n\
         +patched world\n",
    )
    .unwrap();

    git(&fork, &["add", "-A", "."]);
    git(&fork, &["commit", "-q", "-m", "seed patch stack"]);

    let work_dir = root.join("work");
    let config_path = root.join(".patchstack.yaml");
    fs::write(&config_path, config_yaml(&upstream, &fork, &work_dir)).unwrap();

    Fixture {
        upstream,
        fork,
        work_dir,
        config_path,
    }
}

/// Default configuration body; tests that need another strategy append to
/// or rewrite this.
pub fn config_yaml(upstream: &Path, fork: &Path, work_dir: &Path) -> String {
    format!(
        "fork: Example\n\
         upstream:\n  url: {upstream}\n  ref: main\n\
         work_dir: {work}\n\
         patches:\n  base: {fork}/patches/base\n  file: {fork}/patches/file\n  feature: {fork}/patches/feature\n\
         rejects: {fork}/rejects\n",
        upstream = upstream.display(),
        fork = fork.display(),
        work = work_dir.display(),
    )
}

/// Produce one `format-patch` mailbox file in `out_dir` that creates
/// `file_name` with `content` on top of the upstream.
fn mailbox_patch(
    root: &Path,
    upstream: &Path,
    out_dir: &Path,
    file_name: &str,
    content: &str,
    subject: &str,
) {
    let scratch = root.join(format!("scratch-{}", file_name));
    fs::create_dir_all(&scratch).unwrap();
    git(&scratch, &["clone", "-q", upstream.to_str().unwrap(), "."]);
    fs::write(scratch.join(file_name), content).unwrap();
    git(&scratch, &["add", "-A", "."]);
    git(&scratch, &["commit", "-q", "-m", subject]);
    git(
        &scratch,
        &["format-patch", "-1", "-o", out_dir.to_str().unwrap(), "HEAD"],
    );
    fs::remove_dir_all(&scratch).unwrap();
}
