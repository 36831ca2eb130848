//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "media-relay",
    version,
    about = "Resumable concurrent upload of exported media archives to S3-compatible storage"
)]
pub struct Cli {
    /// Log level or filter directive (`RUST_LOG` takes precedence)
    #[arg(long, global = true, env = "MEDIA_RELAY_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload archives to a bucket
    Upload(UploadArgs),
    /// Inspect or reset an upload journal
    #[command(subcommand)]
    Journal(JournalCommand),
}

#[derive(Args, Debug, Default)]
pub struct UploadArgs {
    /// Archive directories, directories of archives, or patterns with --glob
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// TOML configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Treat inputs as glob patterns
    #[arg(long)]
    pub glob: bool,

    /// S3-compatible endpoint (host:port or URL)
    #[arg(long, env = "MEDIA_RELAY_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "MEDIA_RELAY_REGION")]
    pub region: Option<String>,

    #[arg(short, long, env = "MEDIA_RELAY_BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix for every uploaded object
    #[arg(long, env = "MEDIA_RELAY_PREFIX")]
    pub prefix: Option<String>,

    #[arg(long, env = "MEDIA_RELAY_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "MEDIA_RELAY_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[arg(long, env = "MEDIA_RELAY_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Use plain HTTP for an endpoint without a scheme
    #[arg(long)]
    pub no_ssl: bool,

    /// Concurrent file uploads per archive
    #[arg(long, value_name = "N")]
    pub file_concurrency: Option<usize>,

    /// Archives processed at the same time
    #[arg(long, value_name = "N")]
    pub max_concurrent_archives: Option<usize>,

    /// Walk every file without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore existing journals and start over
    #[arg(long)]
    pub no_resume: bool,

    /// Upload without asking the bucket whether the object exists
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Do not attach side-car metadata to objects
    #[arg(long)]
    pub no_metadata: bool,

    /// Upload every file, not only images and videos
    #[arg(long)]
    pub all_files: bool,

    /// Only upload paths matching this pattern (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Skip paths matching this pattern (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Skip directories with this exact name, at any depth (repeatable)
    #[arg(long, value_name = "NAME")]
    pub skip_dir: Vec<String>,

    /// Per-archive journal directory or `.json` file template
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Upper bound on one file's upload, in seconds
    #[arg(long, value_name = "SECS")]
    pub file_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum JournalCommand {
    /// Show entry counts
    Stats(JournalArgs),
    /// List uploaded paths
    List(JournalArgs),
    /// Forget every entry
    Clear(JournalArgs),
}

#[derive(Args, Debug)]
pub struct JournalArgs {
    /// Journal file, or a directory of per-archive journals
    /// (defaults to the shared journal in the home directory)
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        let cli: Cli = Cli::try_parse_from([
            "media-relay",
            "upload",
            "--bucket",
            "photos",
            "--file-concurrency",
            "8",
            "--exclude",
            "Trash/**",
            "--exclude",
            "**/.*",
            "--dry-run",
            "/data/takeout-001",
            "/data/takeout-002",
        ])
        .unwrap();

        match cli.command {
            Command::Upload(args) => {
                assert_eq!(args.bucket.as_deref(), Some("photos"));
                assert_eq!(args.file_concurrency, Some(8));
                assert_eq!(args.exclude.len(), 2);
                assert!(args.dry_run);
                assert_eq!(args.inputs.len(), 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_upload_requires_inputs() {
        assert!(Cli::try_parse_from(["media-relay", "upload"]).is_err());
    }

    #[test]
    fn test_parse_journal_stats() {
        let cli: Cli =
            Cli::try_parse_from(["media-relay", "--log-level", "debug", "journal", "stats", "--journal", "/tmp/j.json"])
                .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Journal(JournalCommand::Stats(JournalArgs { journal: Some(_) }))
        ));
    }
}
