//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `patchstack` application. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! The taxonomy splits into a few broad classes:
//!
//! - **Environment errors** (`GitNotFound`): fatal at startup, never retried.
//! - **Ambiguous history errors** (`AmbiguousMarker`): fatal, require manual
//!   history cleanup and are never auto-resolved.
//! - **Apply failures** (`PatchApply`, `FuzzyApply`): recoverable by design.
//!   Partially-applied changes are rolled back per file, the offending patch
//!   is preserved in a rejects location, and the pipeline halts with an
//!   actionable message rather than leaving a half-applied tree.
//! - **Everything else**: command failures, configuration problems, I/O.
//!
//! Each variant carries enough context (layer, command, stderr, counts) for
//! the operator to act without digging through logs.

use thiserror::Error;

/// Main error type for patchstack operations
#[derive(Error, Debug)]
pub enum Error {
    /// The `git` binary could not be found on the PATH.
    ///
    /// Checked once at startup; everything downstream assumes a working git.
    #[error("git binary not found on PATH: {message}\n  hint: install git or add it to your PATH")]
    GitNotFound { message: String },

    /// An error occurred while parsing the `.patchstack.yaml` configuration file.
    ///
    /// This error includes the specific parsing issue and optionally a hint
    /// about how to fix it.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A git command exited with a non-zero status.
    #[error("Git command failed in {dir}: git {command} - {stderr}")]
    GitCommand {
        command: String,
        dir: String,
        stderr: String,
    },

    /// More than one commit in `base..HEAD` carries a layer's marker message.
    ///
    /// The rebuilder relies on the marker being unique to locate the layer
    /// boundary; a duplicate means the history is corrupt and must be cleaned
    /// up by hand before any destructive step runs.
    #[error(
        "Exceeded the max amount of commits with the marker `{marker}`!\n\
         Got {count} commits, expected: 1\n  hint: clean up the duplicate marker commits manually, then retry"
    )]
    AmbiguousMarker { marker: String, count: usize },

    /// Applying a layer's patch set failed.
    ///
    /// The tree is left with the conflict state for manual resolution; the
    /// message tells the operator what to do next.
    #[error(
        "Failed to apply {layer} patches: {message}\n\
         ***   Please review the details above and finish the apply, then\n\
         ***   save the changes with `patchstack rebuild`"
    )]
    PatchApply { layer: String, message: String },

    /// The fuzzy patcher could not place one or more hunks.
    ///
    /// Reported with the failure ratio so an operator can judge whether to
    /// raise the fuzz tolerance or resolve manually.
    #[error("Failed to apply {failed}/{total} hunks (min fuzz: {min_fuzz})")]
    FuzzyApply {
        failed: usize,
        total: usize,
        min_fuzz: f32,
    },

    /// A single patch file is malformed and cannot be parsed.
    #[error("Malformed patch {patch}: {message}")]
    MalformedPatch { patch: String, message: String },

    /// A rebuild was requested on a read-only stack.
    #[error("Cannot rebuild patches: {fork} is configured read-only")]
    ReadOnlyStack { fork: String },

    /// An error occurred with a path-related operation.
    #[error("Path operation error: {message}")]
    Path { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
