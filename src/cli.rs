//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use patchstack::git::Git;

use crate::commands;

/// Patchstack - Maintain a fork as layered patches against its upstream
#[derive(Parser, Debug)]
#[command(name = "patchstack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check out the upstream and apply all patch layers onto it
    Apply(commands::apply::ApplyArgs),

    /// Regenerate the patch directories from the working tree
    Rebuild(commands::rebuild::RebuildArgs),

    /// Fold tracked working-tree edits back into the file layer
    Fixup(commands::fixup::FixupArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = patchstack::output::OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            // the patching commands shell out to git, so fail fast before
            // any of them runs; completion generation stays git-free
            Commands::Apply(args) => {
                Git::check_for_git()?;
                commands::apply::execute(args, &output)
            }
            Commands::Rebuild(args) => {
                Git::check_for_git()?;
                commands::rebuild::execute(args, &output)
            }
            Commands::Fixup(args) => {
                Git::check_for_git()?;
                commands::fixup::execute(args, &output)
            }
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    // RUST_LOG still wins when set, matching env_logger conventions
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_apply_with_globals() {
        let cli = Cli::try_parse_from([
            "patchstack",
            "--color",
            "never",
            "--log-level",
            "debug",
            "apply",
            "--read-only",
        ])
        .unwrap();
        assert_eq!(cli.color, "never");
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Apply(_)));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["patchstack"]).is_err());
    }

    #[test]
    fn test_cli_parses_rebuild_layer() {
        let cli =
            Cli::try_parse_from(["patchstack", "rebuild", "--layer", "file", "--no-filter"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Rebuild(_)));
    }
}
