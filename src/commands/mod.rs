//! # CLI Command Implementations
//!
//! One module per subcommand of the `patchstack` command-line tool. Each
//! module defines an `Args` struct derived with `clap` and an `execute`
//! function that loads the configuration, opens the stack, and calls into
//! the `patchstack` library for the actual work.

pub mod apply;
pub mod completions;
pub mod fixup;
pub mod rebuild;

use std::path::PathBuf;

use anyhow::Result;
use patchstack::config::{self, Config};

/// Resolve `--config` with its `.patchstack.yaml` default and load it.
pub(crate) fn load_config(config_arg: Option<PathBuf>) -> Result<Config> {
    let config_path = config_arg.unwrap_or_else(|| PathBuf::from(".patchstack.yaml"));
    if !config_path.exists() {
        anyhow::bail!("Configuration file not found: {}", config_path.display());
    }
    Ok(config::from_file(&config_path)?)
}
