//! # Patchstack CLI
//!
//! Binary entry point for the `patchstack` command-line tool.
//!
//! Its responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Executing the appropriate subcommand.
//! - Translating top-level errors into user-facing output.
//!
//! All real logic lives in the library crate; the binary is a thin wrapper.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
