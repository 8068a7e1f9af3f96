//! # CLI Module
//!
//! Command-line interface over the declutter engine.
//!
//! ## Usage
//! ```bash
//! # Find duplicate files
//! declutter duplicates ~/Pictures ~/Downloads
//!
//! # Stricter visual matching
//! declutter duplicates ~/Pictures --threshold 2
//!
//! # Classify junk with a 250 MiB large-file bar
//! declutter junk ~/storage --large-file-mb 250
//!
//! # JSON output for scripting
//! declutter duplicates ~/Pictures --json
//! ```

use clap::{Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use disk_declutter::core::classifier::{
    ClassifierConfig, DirectoryClassifier, NoopArchiveInspector, PermissiveSafety,
    StaticPackageRegistry,
};
use disk_declutter::core::scanner::{collect_inventory, InventoryOptions};
use disk_declutter::core::{
    CancelToken, ClassifyResult, DetectionPipeline, HashCache, HashService, PipelineResult,
};
use disk_declutter::events::{EventChannel, EventReceiver};
use disk_declutter::Result;

/// Disk Declutter - find duplicates and junk without deleting anything
#[derive(Parser, Debug)]
#[command(name = "declutter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find duplicate and visually similar files
    Duplicates {
        /// Directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Visual similarity threshold in hash bits (lower = stricter)
        #[arg(short, long, default_value = "5")]
        threshold: u32,

        /// Fingerprint files above this size with the bounded quick hash
        #[arg(long)]
        quick_hash_over_mb: Option<u64>,

        /// Include hidden files
        #[arg(long)]
        include_hidden: bool,

        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,
    },

    /// Classify files into junk categories
    Junk {
        /// Directories to walk
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Large-file threshold in MiB
        #[arg(long, default_value = "100")]
        large_file_mb: u64,

        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Duplicates {
            paths,
            threshold,
            quick_hash_over_mb,
            include_hidden,
            json,
        } => run_duplicates(paths, threshold, quick_hash_over_mb, include_hidden, json),
        Commands::Junk {
            paths,
            large_file_mb,
            json,
        } => run_junk(paths, large_file_mb, json),
    }
}

/// Drive an indicatif bar from the event stream on its own thread.
fn spawn_progress_thread(
    receiver: EventReceiver,
    quiet: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let bar = if quiet {
            None
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")
                    .unwrap()
                    .progress_chars("█▓░"),
            );
            Some(bar)
        };

        for event in receiver.iter() {
            if let Some(ref bar) = bar {
                bar.set_position(event.percent as u64);
                bar.set_message(event.message.clone());
                if event.is_terminal {
                    bar.finish_and_clear();
                }
            }
        }
    })
}

fn run_duplicates(
    paths: Vec<PathBuf>,
    threshold: u32,
    quick_hash_over_mb: Option<u64>,
    include_hidden: bool,
    json: bool,
) -> Result<()> {
    let term = Term::stderr();

    if !json {
        term.write_line(&format!(
            "{} {}",
            style("Disk Declutter").bold().cyan(),
            style("duplicate scan").dim()
        ))
        .ok();
    }

    let options = InventoryOptions {
        include_hidden,
        ..Default::default()
    };
    let inventory = collect_inventory(&paths, &options);

    let service = Arc::new(HashService::new(Arc::new(HashCache::new())));
    let mut builder = DetectionPipeline::builder()
        .similarity_threshold(threshold)
        .hash_service(service);
    if let Some(mb) = quick_hash_over_mb {
        builder = builder.quick_hash_over(mb * 1024 * 1024);
    }
    let pipeline = builder.build();

    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress_thread(receiver, json);

    let result = pipeline.run_with_events(&inventory.files, &sender, &CancelToken::new());

    drop(sender);
    progress.join().ok();

    if json {
        print_duplicates_json(&result, inventory.errors.len());
    } else {
        print_duplicates_pretty(&term, &result, inventory.errors.len());
    }

    Ok(())
}

fn run_junk(paths: Vec<PathBuf>, large_file_mb: u64, json: bool) -> Result<()> {
    let term = Term::stderr();

    if !json {
        term.write_line(&format!(
            "{} {}",
            style("Disk Declutter").bold().cyan(),
            style("junk scan").dim()
        ))
        .ok();
    }

    let config = ClassifierConfig {
        large_file_bytes: large_file_mb * 1024 * 1024,
        ..Default::default()
    };

    let safety = PermissiveSafety;
    let registry = StaticPackageRegistry::empty();
    let inspector = NoopArchiveInspector;
    let classifier = DirectoryClassifier::new(config, &safety, &registry, &inspector);

    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress_thread(receiver, json);

    let result = classifier.classify(&paths, &sender, &CancelToken::new());

    drop(sender);
    progress.join().ok();

    if json {
        print_junk_json(&result);
    } else {
        print_junk_pretty(&term, &result);
    }

    Ok(())
}

fn print_duplicates_pretty(term: &Term, result: &PipelineResult, scan_errors: usize) {
    term.write_line("").ok();
    term.write_line(&format!("{} Scan Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} files scanned in {:.1}s",
        style(result.total_files).cyan(),
        result.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} duplicate groups, {} duplicate files",
        style(result.groups.len()).cyan(),
        style(result.duplicate_count()).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} reclaimable",
        style(format_bytes(result.reclaimable_bytes())).yellow()
    ))
    .ok();

    let total_errors = result.error_count + scan_errors;
    if total_errors > 0 {
        term.write_line(&format!(
            "  {} files skipped due to errors",
            style(total_errors).red()
        ))
        .ok();
    }
    term.write_line("").ok();

    for (i, group) in result.groups.iter().enumerate() {
        term.write_line(&format!(
            "  {} {} ({} files, {})",
            style(format!("Group {}:", i + 1)).bold(),
            style(&group.match_key).yellow(),
            group.files.len(),
            format_bytes(group.total_size)
        ))
        .ok();

        for file in &group.files {
            let marker = if file.path == group.keep_file {
                style("★ keep").green().to_string()
            } else {
                style("○").dim().to_string()
            };
            term.write_line(&format!("    {} {}", marker, file.path.display()))
                .ok();
        }
        term.write_line("").ok();
    }

    term.write_line(&format!(
        "{}",
        style("No files were deleted. Review before acting.").dim()
    ))
    .ok();
}

fn print_duplicates_json(result: &PipelineResult, scan_errors: usize) {
    let output = serde_json::json!({
        "total_files": result.total_files,
        "duplicate_groups": result.groups.len(),
        "duplicate_count": result.duplicate_count(),
        "reclaimable_bytes": result.reclaimable_bytes(),
        "error_count": result.error_count + scan_errors,
        "cancelled": result.cancelled,
        "duration_ms": result.duration_ms,
        "groups": &result.groups,
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}

fn print_junk_pretty(term: &Term, result: &ClassifyResult) {
    term.write_line("").ok();
    term.write_line(&format!("{} Scan Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} files scanned in {:.1}s, {} junk",
        style(result.scanned_files).cyan(),
        result.duration_ms as f64 / 1000.0,
        style(format_bytes(result.total_junk_bytes())).yellow()
    ))
    .ok();
    if result.error_count > 0 {
        term.write_line(&format!(
            "  {} entries skipped due to errors",
            style(result.error_count).red()
        ))
        .ok();
    }
    term.write_line("").ok();

    for category in &result.categories {
        let auto = if category.can_auto_clean {
            style("auto-cleanable").green()
        } else {
            style("review required").yellow()
        };
        term.write_line(&format!(
            "  {} ({} files, {}) {}",
            style(category.kind.name()).bold(),
            category.files.len(),
            format_bytes(category.total_size),
            auto
        ))
        .ok();

        for file in &category.files {
            let when = chrono::DateTime::from_timestamp_millis(file.modified_ms)
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            term.write_line(&format!(
                "    {} {} ({}, {})",
                if file.can_delete {
                    style("•").dim()
                } else {
                    style("🔒").red()
                },
                file.path.display(),
                format_bytes(file.size),
                when
            ))
            .ok();
        }
        term.write_line("").ok();
    }

    term.write_line(&format!(
        "{}",
        style("No files were deleted. Review before acting.").dim()
    ))
    .ok();
}

fn print_junk_json(result: &ClassifyResult) {
    let output = serde_json::json!({
        "scanned_files": result.scanned_files,
        "total_junk_bytes": result.total_junk_bytes(),
        "error_count": result.error_count,
        "cancelled": result.cancelled,
        "duration_ms": result.duration_ms,
        "categories": &result.categories,
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
