use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use std::time::Instant;
use vfs_snapshot::logging::{init_logging, init_logging_with_profile, LogLevel};
use vfs_snapshot::util::format_duration;
use vfs_snapshot::{
    anyhow_loc, timed_span, AbsolutePath, CaseSensitivity, DirectorySnapshotter, HashMode, VfsConfig,
    VirtualFileSystem,
};

/// Snapshot files and directories through the virtual file system cache and
/// print their hashes.
#[derive(Debug, Parser)]
#[command(name = "vfs-snapshot")]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Overrides the configured hash mode
    #[arg(long, value_enum)]
    hash_mode: Option<HashMode>,

    /// Compare paths case-insensitively
    #[arg(long)]
    case_insensitive: bool,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Write a chrome trace to this file
    #[arg(long)]
    profile: Option<Utf8PathBuf>,

    /// Files or directories to snapshot
    #[arg(required = true)]
    paths: Vec<Utf8PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VfsConfig::load(path)?,
        None => VfsConfig::default(),
    };
    if let Some(hash_mode) = args.hash_mode {
        config.hash_mode = hash_mode;
    }
    if args.case_insensitive {
        config.case_sensitivity = CaseSensitivity::CaseInsensitive;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    let _log_guard = match &args.profile {
        Some(trace_path) => init_logging_with_profile(&config.logging, trace_path)?,
        None => init_logging(&config.logging)?,
    };

    let vfs = VirtualFileSystem::new(&config);
    let snapshotter = DirectorySnapshotter::from_config(&config);
    let cwd = Utf8PathBuf::try_from(std::env::current_dir()?)
        .map_err(|e| anyhow_loc!("Working directory is not UTF-8: {}", e))?;

    let start = Instant::now();
    for raw in &args.paths {
        let path = AbsolutePath::from_utf8_path(&cwd.join(raw))?;
        let _span = timed_span!(tracing::Level::INFO, "snapshot", path = %path);

        let snapshot = vfs.read(&path, |p| snapshotter.snapshot(p))?;
        let cached = vfs.read(&path, |p| Err(anyhow_loc!("[{}] was not served from the cache", p)))?;
        if cached != snapshot {
            tracing::warn!("Cached snapshot of [{}] differs from the scan", path);
        }

        println!("{}  {}", snapshot.hash(), path);
    }

    let stats = vfs.statistics();
    tracing::info!(
        "Virtual file system retained information about {} files, {} directories and {} missing files in {}",
        stats.retained_regular_files,
        stats.retained_directories,
        stats.retained_missing_files,
        format_duration(start.elapsed())
    );

    Ok(())
}
