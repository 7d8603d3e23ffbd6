//! # Patchstack Library
//!
//! Core functionality for maintaining a fork of an upstream repository as
//! an ordered stack of patch files. It backs the `patchstack` command-line
//! tool but can be embedded anywhere a fork needs to be reconstructed from,
//! or saved back to, version-controlled patch directories.
//!
//! ## Core Concepts
//!
//! - **Layers (`layer`)**: the stack has three tiers. The *base* layer is
//!   applied as one commit per patch via `git am`; the *file* layer is a
//!   bulk text transformation ending in a single marker commit; the
//!   *feature* layer is ordinary commits on top. Boundary tags (`base`,
//!   `patchedBase`, `file`) mark where each tier ends.
//! - **Working tree (`worktree`)**: a managed checkout of the upstream at a
//!   pinned ref, recreated or reset on demand. Treated as disposable; the
//!   patch directories are the source of truth.
//! - **Applying (`apply`)**: replays each layer's patches onto the tree,
//!   producing deterministic marker commits so a reapply over unchanged
//!   inputs reproduces identical hashes.
//! - **Rebuilding (`rebuild`)**: regenerates patch files from the tree with
//!   `git format-patch`, then discards regenerated patches whose only
//!   change is blob-hash churn.
//! - **Fuzzy patching (`textpatch`)**: an in-process unified-diff applier
//!   that tolerates hunk drift, used for the file layer where upstream
//!   churn would make exact offsets brittle.
//! - **Coordination (`stack`)**: whole-stack apply (bottom-up) and rebuild
//!   (top-down), with a read-only mode for consumer checkouts.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use patchstack::config;
//! use patchstack::stack::{Mode, Stack};
//! use patchstack::apply::ApplyOptions;
//!
//! let config = config::from_file(".patchstack.yaml".as_ref())?;
//! let stack = Stack::new(config, Mode::Writable);
//! stack.apply_all(ApplyOptions::default())?;
//! ```

pub mod apply;
pub mod config;
pub mod error;
pub mod git;
pub mod layer;
pub mod output;
pub mod rebuild;
pub mod stack;
pub mod textpatch;
pub mod worktree;
