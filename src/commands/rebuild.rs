//! Rebuild command implementation
//!
//! Saves the working tree's commits back into the patch directories,
//! rebuilding top-down (feature, file, base) so a lower layer's
//! regeneration never runs with an upper layer's commits still unsaved.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use patchstack::output::{emoji, OutputConfig};
use patchstack::rebuild::RebuildOptions;
use patchstack::stack::{Mode, Stack};

use super::apply::CliLayer;

/// Arguments for the rebuild command
#[derive(Args, Debug)]
pub struct RebuildArgs {
    /// Path to config file
    #[arg(short, long, value_name = "PATH", env = "PATCHSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Rebuild a single layer instead of the whole stack
    #[arg(long, value_name = "LAYER", value_enum)]
    pub layer: Option<CliLayer>,

    /// Keep every regenerated patch, skipping the no-op filter
    #[arg(long)]
    pub no_filter: bool,

    /// Show detailed progress information
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the rebuild command
pub fn execute(args: RebuildArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();
    let config = super::load_config(args.config)?;

    if !args.quiet {
        println!(
            "{} Rebuilding {} patch stack",
            emoji(output, "💾", "[REBUILD]"),
            config.fork
        );
        println!();
    }

    let stack = Stack::new(config, Mode::Writable);
    let options = RebuildOptions {
        verbose: args.verbose,
        no_filter: args.no_filter,
    };

    let result = match args.layer {
        Some(layer) => stack.rebuild_layer(layer.into(), options).map(|report| {
            let mut stack_report = patchstack::stack::StackRebuildReport::default();
            stack_report.layers.push((layer.into(), report));
            stack_report
        }),
        None => stack.rebuild_all(options),
    };

    match result {
        Ok(report) => {
            if !args.quiet {
                let duration = start_time.elapsed();
                println!(
                    "{}",
                    output.success(&format!(
                        "✔ Saved {}/{} patches in {:.2}s",
                        report.kept(),
                        report.regenerated(),
                        duration.as_secs_f64()
                    ))
                );
                if args.verbose {
                    for (layer, layer_report) in &report.layers {
                        println!(
                            "   {} layer: {}/{} patches kept",
                            layer, layer_report.kept, layer_report.regenerated
                        );
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            if !args.quiet {
                println!("{}", output.failure("✘ Rebuild failed"));
                println!();
            }
            Err(e.into())
        }
    }
}
