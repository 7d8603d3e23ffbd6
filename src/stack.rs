//! # Stack Coordination
//!
//! Drives whole-stack operations over the three layers: applying runs
//! bottom-up (base, file, feature) so each layer lands on the boundary tag
//! the previous one produced; rebuilding runs top-down (feature, file,
//! base) so regenerating a lower layer never invalidates the commits an
//! upper layer was just saved from.
//!
//! A stack opened read-only can apply but never rebuild; consumer checkouts
//! use this to guarantee the patch directories stay authoritative.

use crate::apply::{commit_identity_env, ApplyOptions, ApplyReport, LayerApplier};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::rebuild::{LayerRebuilder, RebuildOptions, RebuildReport};
use crate::worktree::WorkTree;

/// Whether a stack may write back to its patch directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Apply only. Rebuilding is refused.
    ReadOnly,
    /// Apply and rebuild.
    #[default]
    Writable,
}

/// Per-layer outcome of a whole-stack apply.
#[derive(Debug, Default)]
pub struct StackApplyReport {
    pub layers: Vec<(Layer, ApplyReport)>,
}

impl StackApplyReport {
    pub fn patches_applied(&self) -> usize {
        self.layers.iter().map(|(_, r)| r.patches_applied).sum()
    }

    pub fn rejected(&self) -> usize {
        self.layers.iter().map(|(_, r)| r.rejected.len()).sum()
    }
}

/// Per-layer outcome of a whole-stack rebuild.
#[derive(Debug, Default)]
pub struct StackRebuildReport {
    pub layers: Vec<(Layer, RebuildReport)>,
}

impl StackRebuildReport {
    pub fn regenerated(&self) -> usize {
        self.layers.iter().map(|(_, r)| r.regenerated).sum()
    }

    pub fn kept(&self) -> usize {
        self.layers.iter().map(|(_, r)| r.kept).sum()
    }
}

/// One fork's patch stack: configuration, managed working tree, and the
/// read-only/writable mode it was opened in.
pub struct Stack {
    config: Config,
    tree: WorkTree,
    mode: Mode,
}

impl Stack {
    pub fn new(config: Config, mode: Mode) -> Self {
        let tree = WorkTree::new(config.work_dir.clone());
        Self { config, tree, mode }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tree(&self) -> &WorkTree {
        &self.tree
    }

    /// Apply a single layer. Lower layers must already be applied; the
    /// applier resets onto the layer's lower tag before it starts.
    pub fn apply_layer(&self, layer: Layer, options: ApplyOptions) -> Result<ApplyReport> {
        LayerApplier::new(&self.tree, &self.config, options).apply(layer)
    }

    /// Apply the whole stack bottom-up. Stops at the first failing layer so
    /// its failure state (marker file, conflict markers, rejects) is
    /// preserved for inspection.
    pub fn apply_all(&self, options: ApplyOptions) -> Result<StackApplyReport> {
        let mut report = StackApplyReport::default();
        for layer in Layer::APPLY_ORDER {
            log::info!("Applying the {} layer...", layer);
            let layer_report = self.apply_layer(layer, options)?;
            report.layers.push((layer, layer_report));
        }
        Ok(report)
    }

    /// Rebuild a single layer's patch directory from the working tree.
    pub fn rebuild_layer(&self, layer: Layer, options: RebuildOptions) -> Result<RebuildReport> {
        self.ensure_writable()?;
        LayerRebuilder::new(&self.tree, &self.config, options).rebuild(layer)
    }

    /// Rebuild the whole stack top-down.
    pub fn rebuild_all(&self, options: RebuildOptions) -> Result<StackRebuildReport> {
        self.ensure_writable()?;
        let mut report = StackRebuildReport::default();
        for layer in Layer::REBUILD_ORDER {
            log::info!("Rebuilding the {} layer...", layer);
            let layer_report = self.rebuild_layer(layer, options)?;
            report.layers.push((layer, layer_report));
        }
        Ok(report)
    }

    /// Fold tracked working-tree edits back into the file layer's marker
    /// commit: a `--fixup` commit targeting the `file` tag, then an
    /// autosquash rebase onto `patchedBase` with the sequence editor
    /// disabled so it runs unattended. The rebuilder picks the folded
    /// result up on the next save.
    pub fn fixup_file_layer(&self) -> Result<()> {
        self.ensure_writable()?;
        let git = self.tree.git();
        // pinned identity: the managed tree has no user config of its own
        let identity = commit_identity_env(Layer::File);
        let commit = git.run_with_env(
            ["commit", "-a", "--no-gpg-sign", "--fixup", "file"],
            identity,
        )?;
        if !commit.success() {
            return Err(Error::GitCommand {
                command: "commit --fixup file".to_string(),
                dir: self.tree.root().display().to_string(),
                stderr: commit.stderr.trim().to_string(),
            });
        }
        let mut env: Vec<(&str, &str)> = vec![("GIT_SEQUENCE_EDITOR", ":")];
        env.extend(identity);
        let rebase = git.run_with_env(
            ["rebase", "--interactive", "--autosquash", "patchedBase"],
            env,
        )?;
        if !rebase.success() {
            return Err(Error::GitCommand {
                command: "rebase --interactive --autosquash patchedBase".to_string(),
                dir: self.tree.root().display().to_string(),
                stderr: rebase.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            Mode::Writable => Ok(()),
            Mode::ReadOnly => Err(Error::ReadOnlyStack {
                fork: self.config.fork.clone(),
            }),
        }
    }
}
