//! panoremap: remap panoptic annotation sets across category taxonomies
//! and apply validated delta correction batches.
//!
//! Three subcommands drive the batch jobs in `panoremap-io`:
//!
//! - `remap` translates a panoptic document onto a target taxonomy from a
//!   unified label policy, consolidating stuff segments and rewriting the
//!   id masks to match;
//! - `apply-delta` applies a correction batch to a consolidated panoptic
//!   file or a directory of per-image polygon files, cross-validating
//!   each change against the current geometry;
//! - `export-segmaps` derives semantic/instance label PNGs from a
//!   panoptic document and its id masks.
//!
//! Exit codes: 0 on success (per-record errors are reported, not fatal),
//! 2 for configuration errors, 1 for I/O failures.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use panoremap_io::{
    DeltaOptions, IoError, RemapOptions, SegmapOptions, run_delta, run_remap, run_segmaps,
};

/// Remap panoptic annotation sets and apply delta correction batches.
#[derive(Parser)]
#[command(name = "panoremap", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print the full job report as JSON instead of a summary line.
    #[arg(long, global = true)]
    json: bool,

    /// Print accumulated warnings and errors after the summary.
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true, conflicts_with = "verbose")]
    silent: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Remap a panoptic annotation set onto a target taxonomy.
    Remap(RemapArgs),
    /// Apply a delta correction batch to an annotation store.
    ApplyDelta(DeltaArgs),
    /// Export semantic/instance label maps from panoptic annotations.
    ExportSegmaps(SegmapArgs),
}

#[derive(Args)]
struct RemapArgs {
    /// Source panoptic annotation JSON file.
    #[arg(long)]
    input: PathBuf,

    /// Output JSON file path for the remapped annotation set.
    #[arg(long)]
    output: PathBuf,

    /// Unified label policy JSON file.
    #[arg(long, default_value = "unified_label_policy.json")]
    policy: PathBuf,

    /// Target dataset name within the policy.
    #[arg(long)]
    target_dataset: String,

    /// Source dataset name within the policy.
    #[arg(long, default_value = panoremap_core::mapping::DEFAULT_SOURCE_DATASET)]
    source_dataset: String,

    /// Category name absorbing unmapped sources.
    #[arg(long, default_value = panoremap_core::mapping::DEFAULT_FALLBACK_NAME)]
    fallback_name: String,

    /// Annotation mask root directory (default: input path without its
    /// extension).
    #[arg(long)]
    mask_root: Option<PathBuf>,

    /// Skip consolidation of stuff segments; only create a new JSON file.
    #[arg(long)]
    skip_masks: bool,
}

#[derive(Args)]
struct DeltaArgs {
    /// Store to change in place: a panoptic JSON file, or a directory of
    /// per-image polygon JSON files.
    #[arg(long)]
    change_path: PathBuf,

    /// Delta correction batch JSON file.
    #[arg(long)]
    delta_path: PathBuf,

    /// Cross-check tolerance in pixels; corrections whose recorded
    /// geometry is further from the current segment are rejected.
    /// Negative disables cross-checking.
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    tolerance: i64,
}

#[derive(Args)]
struct SegmapArgs {
    /// Panoptic annotation JSON file.
    #[arg(long)]
    input: PathBuf,

    /// Target directory for semantic 8-bit label PNGs.
    #[arg(long)]
    semantic_dir: Option<PathBuf>,

    /// Target directory for instance 16-bit label PNGs.
    #[arg(long)]
    instance_dir: Option<PathBuf>,

    /// Directory of the panoptic id masks (default: input path without
    /// its extension).
    #[arg(long)]
    mask_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let (label, result) = match &cli.command {
        Command::Remap(args) => (
            "remap",
            run_remap(&RemapOptions {
                input: args.input.clone(),
                output: args.output.clone(),
                policy: args.policy.clone(),
                mask_root: args.mask_root.clone(),
                source_dataset: args.source_dataset.clone(),
                target_dataset: args.target_dataset.clone(),
                fallback_name: args.fallback_name.clone(),
                skip_masks: args.skip_masks,
            }),
        ),
        Command::ApplyDelta(args) => (
            "delta remapping",
            run_delta(&DeltaOptions {
                change_path: args.change_path.clone(),
                delta_path: args.delta_path.clone(),
                tolerance: args.tolerance,
            }),
        ),
        Command::ExportSegmaps(args) => (
            "segmentation export",
            run_segmaps(&SegmapOptions {
                json_path: args.input.clone(),
                semantic_dir: args.semantic_dir.clone(),
                instance_dir: args.instance_dir.clone(),
                mask_dir: args.mask_dir.clone(),
            }),
        ),
    };

    match result {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(err) => {
                        eprintln!("Error: failed to serialize report: {err}");
                        return ExitCode::FAILURE;
                    }
                }
            } else if !cli.silent {
                println!(
                    "Finished {label} operation with {} successes, {} warnings, and {} errors.",
                    report.success_count,
                    report.warnings.len(),
                    report.errors.len(),
                );
                if cli.verbose {
                    for warning in &report.warnings {
                        println!("warning: {}: {}", warning.key, warning.reason);
                    }
                    for error in &report.errors {
                        match error.id {
                            Some(id) => {
                                println!("error: {}: segment {id}: {}", error.key, error.reason);
                            }
                            None => println!("error: {}: {}", error.key, error.reason),
                        }
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            match err {
                IoError::Remap(_) | IoError::MissingMaskRoot(_) | IoError::NothingToExport => {
                    ExitCode::from(2)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.silent {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
