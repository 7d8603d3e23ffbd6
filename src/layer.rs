//! # Patch Layers
//!
//! The stack is organized as three ordered layers, each with its own patch
//! directory, boundary tag and apply strategy. Layer names, tags and marker
//! commit messages are carried as data on the enum rather than built by
//! string concatenation, so there is exactly one place they can drift.
//!
//! The recognized boundary tags are:
//!
//! - `base` - the pristine checkout point, set before any layer applies
//! - `patchedBase` - after the base layer
//! - `file` - after the file layer
//!
//! The feature layer has no marker commit or tag of its own: its commits
//! *are* the layer, and its upper bound is simply `HEAD`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One tier of the patch stack. Declaration order matches apply order, so
/// the derived ordering sorts base before file before feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Base,
    File,
    Feature,
}

/// How a layer's patch set is applied to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStrategy {
    /// `git am --3way` over a mailbox of patch files; one commit per patch.
    Mailbox,
    /// `git apply --3way` per patch file, working tree only; the layer ends
    /// in a single marker commit.
    ThreeWay,
    /// The in-process fuzzy text patcher; the layer ends in a single marker
    /// commit.
    Fuzzy,
}

impl Layer {
    /// Apply order: base before file before feature.
    pub const APPLY_ORDER: [Layer; 3] = [Layer::Base, Layer::File, Layer::Feature];

    /// Rebuild order is the reverse of apply order.
    pub const REBUILD_ORDER: [Layer; 3] = [Layer::Feature, Layer::File, Layer::Base];

    /// The tag marking this layer's boundary commit, if it has one.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Layer::Base => Some("patchedBase"),
            Layer::File => Some("file"),
            Layer::Feature => None,
        }
    }

    /// The tag bounding this layer from below: the previous layer's tag, or
    /// `base` for the first layer.
    pub fn lower_tag(self) -> &'static str {
        match self {
            Layer::Base => "base",
            Layer::File => "patchedBase",
            Layer::Feature => "file",
        }
    }

    /// Marker commit message for this layer, embedding the fork identifier
    /// so the rebuilder can locate the boundary uniquely.
    pub fn marker_message(self, fork: &str) -> Option<String> {
        match self {
            Layer::Base => Some(format!("{} Base Patches", fork)),
            Layer::File => Some(format!("{} File Patches", fork)),
            Layer::Feature => None,
        }
    }

    /// Author name used for this layer's synthetic marker commit.
    pub fn commit_author(self) -> &'static str {
        match self {
            Layer::Base => "Patched Base",
            Layer::File => "File",
            Layer::Feature => "Feature",
        }
    }

    /// Default apply strategy; the file layer's can be overridden from
    /// configuration.
    pub fn default_strategy(self) -> ApplyStrategy {
        match self {
            Layer::Base | Layer::Feature => ApplyStrategy::Mailbox,
            Layer::File => ApplyStrategy::Fuzzy,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Base => "base",
            Layer::File => "file",
            Layer::Feature => "feature",
        };
        f.write_str(name)
    }
}
