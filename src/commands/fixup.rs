//! Fixup command implementation
//!
//! Shortcut for the edit-save loop on the file layer: instead of rebuilding
//! the whole stack after touching bulk-transformed files, tracked edits in
//! the working tree are folded straight into the file layer's marker commit
//! with an autosquash rebase. A `rebuild` afterwards persists them.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use patchstack::output::{emoji, OutputConfig};
use patchstack::stack::{Mode, Stack};

/// Arguments for the fixup command
#[derive(Args, Debug)]
pub struct FixupArgs {
    /// Path to config file
    #[arg(short, long, value_name = "PATH", env = "PATCHSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the fixup command
pub fn execute(args: FixupArgs, output: &OutputConfig) -> Result<()> {
    let config = super::load_config(args.config)?;
    let stack = Stack::new(config, Mode::Writable);

    stack.fixup_file_layer()?;

    if !args.quiet {
        println!(
            "{} Edits folded into the file layer; run `patchstack rebuild` to save them",
            emoji(output, "🧵", "[FIXUP]")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_missing_config() {
        let args = FixupArgs {
            config: Some(PathBuf::from("/nonexistent/.patchstack.yaml")),
            quiet: true,
        };
        let result = execute(args, &OutputConfig::without_color());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Configuration file not found"));
    }
}
