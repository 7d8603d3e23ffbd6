//! Apply command implementation
//!
//! Checks out the configured upstream into the managed working tree and
//! applies the patch layers in stack order: base, then file, then feature.
//! With `--layer` only the named layer is applied, on top of whatever the
//! lower layers' tags already point at.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use patchstack::apply::ApplyOptions;
use patchstack::layer::Layer;
use patchstack::output::{emoji, OutputConfig};
use patchstack::stack::{Mode, Stack};

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to config file
    #[arg(short, long, value_name = "PATH", env = "PATCHSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Apply a single layer instead of the whole stack
    #[arg(long, value_name = "LAYER", value_enum)]
    pub layer: Option<CliLayer>,

    /// Open the stack read-only (consumer checkout; rebuilding refused)
    #[arg(long)]
    pub read_only: bool,

    /// Escalate the file layer's matcher from offset search to fuzzy
    #[arg(long)]
    pub fuzzy: bool,

    /// Show detailed progress information
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Layer names as accepted on the command line.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliLayer {
    Base,
    File,
    Feature,
}

impl From<CliLayer> for Layer {
    fn from(layer: CliLayer) -> Self {
        match layer {
            CliLayer::Base => Layer::Base,
            CliLayer::File => Layer::File,
            CliLayer::Feature => Layer::Feature,
        }
    }
}

/// Execute the apply command
pub fn execute(args: ApplyArgs, output: &OutputConfig) -> Result<()> {
    let start_time = Instant::now();
    let config = super::load_config(args.config)?;

    if !args.quiet {
        println!(
            "{} Applying {} patch stack",
            emoji(output, "🩹", "[APPLY]"),
            config.fork
        );
        println!();
    }

    let mode = if args.read_only {
        Mode::ReadOnly
    } else {
        Mode::Writable
    };
    let stack = Stack::new(config, mode);
    let options = ApplyOptions {
        verbose: args.verbose,
        fuzzy: args.fuzzy,
    };

    let result = match args.layer {
        Some(layer) => stack.apply_layer(layer.into(), options).map(|report| {
            let mut stack_report = patchstack::stack::StackApplyReport::default();
            stack_report.layers.push((layer.into(), report));
            stack_report
        }),
        None => stack.apply_all(options),
    };

    match result {
        Ok(report) => {
            if !args.quiet {
                let duration = start_time.elapsed();
                println!(
                    "{}",
                    output.success(&format!(
                        "✔ Applied {} patches in {:.2}s",
                        report.patches_applied(),
                        duration.as_secs_f64()
                    ))
                );
                for (layer, layer_report) in &report.layers {
                    if let Some(summary) = &layer_report.fuzzy_summary {
                        println!(
                            "   {} layer: {} files changed ({} exact, {} offset, {} fuzzy)",
                            layer, summary.changed_files, summary.exact, summary.offset,
                            summary.fuzzy
                        );
                    } else if args.verbose {
                        println!(
                            "   {} layer: {} patches",
                            layer, layer_report.patches_applied
                        );
                    }
                }
                let rejected = report.rejected();
                if rejected > 0 {
                    println!(
                        "{}",
                        output.warning(&format!(
                            "   {} patches moved to the rejects directory",
                            rejected
                        ))
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            if !args.quiet {
                println!("{}", output.failure("✘ Apply failed"));
                println!();
            }
            Err(e.into())
        }
    }
}
