//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use media_relay_common::default_journal_path;
use media_relay_filesystem::{discover_archives, ArchiveInput, ArchiveOpener, MediaFilter};
use media_relay_storage::{Journal, JournalSettings, JournalStats};
use media_relay_storage_s3::S3ObjectStore;
use media_relay_transfer::{megabytes, ArchiveScheduler, RunSummary, SchedulerError};
use tokio_util::sync::CancellationToken;

use crate::args::{JournalArgs, JournalCommand, UploadArgs};
use crate::config::Config;
use crate::logging::LogHandle;

/// Exit code after an interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

/// Run the `upload` command.
///
/// File and archive failures are reported but exit with success; only setup
/// errors are returned.
pub async fn upload(args: UploadArgs, log: &LogHandle, level_from_flag: bool) -> Result<ExitCode> {
    let config: Config = Config::from_args(&args)?;
    if let Some(level) = &config.log_level {
        if !level_from_flag && std::env::var_os("RUST_LOG").is_none() {
            log.set_level(level)?;
        }
    }

    let filter: MediaFilter = config.media_filter()?;
    let archives: Vec<ArchiveInput> =
        discover_archives(&args.inputs, args.glob).context("failed to discover archives")?;
    if archives.is_empty() {
        tracing::warn!("No archives to upload");
        return Ok(ExitCode::SUCCESS);
    }

    let store: S3ObjectStore = S3ObjectStore::connect(config.s3.clone())
        .await
        .context("failed to connect to object store")?;
    tracing::info!(
        bucket = %store.bucket(),
        archives = archives.len(),
        dry_run = config.upload.dry_run,
        "Connected to object store"
    );

    let cancel: CancellationToken = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let scheduler: ArchiveScheduler = ArchiveScheduler::new(
        Arc::new(store),
        Arc::new(ArchiveOpener::new(filter)),
        config.upload.clone(),
    );

    let summary: RunSummary = match scheduler.run(archives, &cancel).await {
        Ok(summary) => summary,
        Err(SchedulerError::ArchivesFailed { failures, summary }) => {
            for failure in &failures {
                tracing::error!("{}", failure);
            }
            summary
        }
        Err(e) => return Err(e).context("upload could not start"),
    };
    print_summary(&summary);

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{:<32} {:>9} {:>9} {:>9} {:>12}", "ARCHIVE", "UPLOADED", "SKIPPED", "FAILED", "MB");
    for archive in &summary.archives {
        let stats = &archive.statistics;
        println!(
            "{:<32} {:>9} {:>9} {:>9} {:>12.2}",
            archive.name,
            stats.uploaded,
            stats.skipped,
            stats.failed,
            megabytes(stats.uploaded_bytes)
        );
        if let Some(error) = &archive.error {
            let first_line: &str = error.lines().next().unwrap_or_default();
            println!("  error: {}", first_line);
        }
    }
    let totals = &summary.totals;
    println!(
        "{:<32} {:>9} {:>9} {:>9} {:>12.2}",
        "TOTAL",
        totals.uploaded,
        totals.skipped,
        totals.failed,
        megabytes(totals.uploaded_bytes)
    );
    println!("Elapsed: {}s", summary.elapsed.as_secs());
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => return,
    }
    tracing::warn!("Shutdown requested, stopping after in-flight uploads are cancelled");
    cancel.cancel();
}

/// Run a `journal` subcommand.
pub async fn journal(command: JournalCommand) -> Result<ExitCode> {
    let args: &JournalArgs = match &command {
        JournalCommand::Stats(args) | JournalCommand::List(args) | JournalCommand::Clear(args) => args,
    };
    let paths: Vec<PathBuf> = journal_files(args)?;
    if paths.is_empty() {
        println!("No journals found");
        return Ok(ExitCode::SUCCESS);
    }

    for path in paths {
        let journal: Journal = Journal::new(path.clone(), JournalSettings::default());
        journal
            .load()
            .await
            .with_context(|| format!("failed to load journal {}", path.display()))?;

        match &command {
            JournalCommand::Stats(_) => {
                let stats: JournalStats = journal.stats();
                println!("Journal:  {}", path.display());
                println!("Entries:  {}", stats.total);
                println!("Uploaded: {}", stats.uploaded);
            }
            JournalCommand::List(_) => {
                for uploaded in journal.list_completed() {
                    println!("{}", uploaded);
                }
            }
            JournalCommand::Clear(_) => {
                journal
                    .clear()
                    .await
                    .with_context(|| format!("failed to clear journal {}", path.display()))?;
                println!("Cleared {}", path.display());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Journal files named by `args`.
///
/// A directory yields every `.json` in it. A `.json` path yields the file and
/// the per-archive journals derived from it (`run.json` and `run-*.json`).
/// Paths that do not exist are left out.
fn journal_files(args: &JournalArgs) -> Result<Vec<PathBuf>> {
    let path: PathBuf = match &args.journal {
        Some(path) => path.clone(),
        None => default_journal_path()?,
    };
    if path.is_dir() {
        return json_files_in(&path, |_| true);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        files.push(path.clone());
    }

    let stem: Option<String> = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    let parent: PathBuf = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let (true, Some(stem)) = (is_json_name(&path), stem) {
        if parent.is_dir() {
            let prefix: String = format!("{}-", stem);
            files.extend(json_files_in(&parent, |name: &str| name.starts_with(&prefix))?);
        }
    }
    Ok(files)
}

/// Sorted `.json` files in `dir` whose file name passes `select`.
fn json_files_in(dir: &Path, select: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read journal directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p: &PathBuf| p.is_file() && is_json_name(p))
        .filter(|p: &PathBuf| {
            p.file_name()
                .map(|name| select(&name.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn is_json_name(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
