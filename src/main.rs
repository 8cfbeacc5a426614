use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::{error, info, warn, Level, LevelFilter};
use paste_patch::{
    apply_patch_to_file, is_patch_like, ApplyError, ApplyOptions, ApplyReport, EmptyContextPolicy,
    MatchType, PatchError,
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

// --- Main Application Entry Point ---

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        // {:?} prints the full `anyhow` chain, down to the hunk failure reason.
        eprintln!("{} {:?}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Contains the primary logic of the application.
fn run(args: Args) -> Result<()> {
    setup_logging(args.verbose);

    if args.search_window == Some(0) {
        return Err(anyhow!("Search window must be at least one line."));
    }

    let patch_text = read_patch(args.patch.as_deref())?;
    if !is_patch_like(&patch_text) {
        // Nothing to do; this is a notice, not a failure.
        println!("Input does not contain a valid diff patch.");
        return Ok(());
    }

    let options = ApplyOptions::builder()
        .dry_run(args.dry_run)
        .empty_context(if args.insert_at_cursor {
            EmptyContextPolicy::InsertAtCursor
        } else {
            EmptyContextPolicy::Fail
        })
        .verify_deletions(args.verify_deletions)
        .search_window(args.search_window)
        .build();
    info!("Options: {:?}", options);

    let result = match apply_patch_to_file(&args.target, &patch_text, options) {
        Ok(result) => result,
        Err(PatchError::TargetNotFound(path)) => {
            return Err(anyhow!(
                "No target document found at '{}'.",
                path.display()
            ));
        }
        Err(e) => {
            if let PatchError::Apply(ApplyError::Hunk { index, hunk, .. }) = &e {
                error!("Hunk {} could not be located:\n{}", index, hunk.trim_end());
            }
            return Err(e).with_context(|| {
                format!(
                    "Failed to apply diff patch to '{}'",
                    args.target.display()
                )
            });
        }
    };

    log_report(&result.report);

    if let Some(diff) = result.diff {
        println!("----- Proposed Changes for {} -----", args.target.display());
        print!("{}", diff);
        println!("------------------------------------");
        info!("DRY RUN completed. No files were modified.");
    } else {
        println!("Diff patch applied successfully.");
    }

    Ok(())
}

// --- Helper Structs and Functions ---

/// Reads the patch from a file, or from standard input when no path (or `-`)
/// is given.
fn read_patch(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("Failed to read patch file '{}'", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read patch from standard input")?;
            Ok(text)
        }
    }
}

/// Logs where each hunk landed, warning about partial context matches.
fn log_report(report: &ApplyReport) {
    for (i, hunk) in report.hunks.iter().enumerate() {
        match hunk.match_type {
            MatchType::Exact => info!("  Hunk {} applied at {}.", i + 1, hunk.location),
            MatchType::Cursor => info!(
                "  Hunk {} has no context; inserted at {}.",
                i + 1,
                hunk.location
            ),
            MatchType::Partial { .. } => {}
        }
    }
    for (index, hunk) in report.partial_matches() {
        if let MatchType::Partial { score, total } = hunk.match_type {
            warn!(
                "Hunk {} applied at {} with only {}/{} context lines matching. Review the result.",
                index, hunk.location, score, total
            );
        }
    }
}

/// Defines the command-line arguments for the application.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Apply a pasted unified diff to a document, locating hunks by context instead of line numbers.",
    long_about = "Reads a unified diff (from a file or standard input) and applies its hunks in order to the target document. Hunks are seated by their context lines, tolerating stale line numbers and small drift. The document is only written when every hunk applies."
)]
struct Args {
    /// Path to the document to patch.
    target: PathBuf,
    /// Path to the patch. Reads standard input when omitted or '-'.
    patch: Option<PathBuf>,
    /// If set, show what would be done, but don't modify the document.
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Insert hunks that have no context lines at the current position instead
    /// of rejecting them.
    #[arg(long)]
    insert_at_cursor: bool,
    /// Require deleted lines to match the document before removing them.
    #[arg(long)]
    verify_deletions: bool,
    /// Only search this many lines past the previous hunk.
    #[arg(long, value_name = "LINES")]
    search_window: Option<usize>,
    /// Increase logging verbosity. Can be used multiple times.
    /// -v for info, -vv for debug, -vvv for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Sets up the global logger from the verbosity count.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "{} {}", "error:".red().bold(), record.args()),
            Level::Warn => writeln!(buf, "{} {}", "warning:".yellow().bold(), record.args()),
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Debug => writeln!(buf, "{} {}", "debug:".blue().bold(), record.args()),
            Level::Trace => writeln!(buf, "{} {}", "trace:".cyan().bold(), record.args()),
        })
        .init();
}
