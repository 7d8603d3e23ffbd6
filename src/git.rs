//! # VCS Adapter
//!
//! A thin wrapper for issuing git subcommands against a working tree.
//!
//! This uses the system git command, which automatically handles:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Personal access tokens
//! - Any authentication configured in ~/.gitconfig
//!
//! There is deliberately no business logic here. Every call returns the raw
//! exit code and captured output; the caller decides the error policy. Two
//! relaxed modes exist alongside the strict one:
//!
//! - *silent* ([`Git::execute_silently`]): discard output unless the exit
//!   code is non-zero, in which case stderr is surfaced in the error.
//! - *silent-error* ([`Git::run_silently`]): never surface stderr or a
//!   non-zero exit as a failure, only report the exit code. Used for
//!   commands that are expected to fail in normal operation, such as
//!   `git am --abort` when no mailbox session exists.
//!
//! No retries anywhere. A failing command surfaces its exit code and the
//! caller decides what that means for the pipeline.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Captured result of a single git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Exit code; -1 when the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Combined stdout and stderr, for logging failed commands verbatim.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Handle for running git commands against one working directory.
#[derive(Debug, Clone)]
pub struct Git {
    work_dir: PathBuf,
}

impl Git {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Verify the git binary is discoverable.
    ///
    /// Absence is a fatal startup error; nothing in the pipeline can run
    /// without it, so this is checked once before any other operation.
    pub fn check_for_git() -> Result<()> {
        let result = Command::new("git").arg("--version").output();
        match result {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(Error::GitNotFound {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(e) => Err(Error::GitNotFound {
                message: e.to_string(),
            }),
        }
    }

    /// Run a git command, capturing exit code, stdout and stderr.
    ///
    /// Only a spawn failure is an error here; a non-zero exit code is data.
    pub fn run<I, S>(&self, args: I) -> Result<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_with_env(args, std::iter::empty::<(&str, &str)>())
    }

    /// Run a git command with extra environment variables set.
    ///
    /// Used for deterministic commits, where author and committer identity
    /// and timestamps are passed via `GIT_AUTHOR_*` / `GIT_COMMITTER_*`.
    pub fn run_with_env<I, S, E, K, V>(&self, args: I, env: E) -> Result<GitOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        E: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        log::debug!(
            "git {} (in {})",
            args.iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            self.work_dir.display()
        );

        let output = Command::new("git")
            .args(&args)
            .envs(env)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|e| Error::GitCommand {
                command: join_args(&args),
                dir: self.work_dir.display().to_string(),
                stderr: e.to_string(),
            })?;

        Ok(GitOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run a command in silent-error mode: output discarded, exit code
    /// returned, non-zero exit is not an error.
    pub fn run_silently<I, S>(&self, args: I) -> Result<i32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self.run(args)?.code)
    }

    /// Run a command in silent mode: output discarded on success, stderr
    /// surfaced as an error on a non-zero exit.
    pub fn execute_silently<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|a| a.as_ref().to_os_string())
            .collect();
        let output = self.run(&args)?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::GitCommand {
                command: join_args(&args),
                dir: self.work_dir.display().to_string(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Run a command and return its captured stdout, erroring on a
    /// non-zero exit.
    pub fn stdout<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|a| a.as_ref().to_os_string())
            .collect();
        let output = self.run(&args)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::GitCommand {
                command: join_args(&args),
                dir: self.work_dir.display().to_string(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

fn join_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
