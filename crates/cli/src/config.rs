//! Run configuration: an optional TOML file overlaid with command-line flags.
//!
//! ```toml
//! log_level = "info"
//!
//! [s3]
//! endpoint = "localhost:9000"
//! bucket = "photos"
//! use_ssl = false
//!
//! [upload]
//! file_concurrency = 8
//! journal_path = "/var/lib/media-relay/journals"
//!
//! [upload.retry]
//! max_retries = 3
//!
//! [filter]
//! exclude = ["**/*.gif"]
//! skip_dirs = ["Trash", "Album [2019]"]
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use media_relay_filesystem::MediaFilter;
use media_relay_storage_s3::S3Settings;
use media_relay_transfer::UploadOptions;
use serde::Deserialize;

use crate::args::UploadArgs;

/// File selection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Upload only images and videos.
    pub media_only: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Literal directory names skipped at any depth.
    pub skip_dirs: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            media_only: true,
            include: Vec::new(),
            exclude: Vec::new(),
            skip_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub s3: S3Settings,
    pub upload: UploadOptions,
    pub filter: FilterConfig,
}

impl Config {
    /// Read a TOML configuration file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text: String = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build the configuration for an `upload` invocation.
    ///
    /// # Errors
    /// Returns error if the config file is unreadable or the result is invalid.
    pub fn from_args(args: &UploadArgs) -> Result<Self> {
        let mut config: Config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Overlay flags that were given on the command line.
    pub fn apply_args(&mut self, args: &UploadArgs) {
        let s3: &mut S3Settings = &mut self.s3;
        if let Some(endpoint) = &args.endpoint {
            s3.endpoint = Some(endpoint.clone());
        }
        if let Some(region) = &args.region {
            s3.region = region.clone();
        }
        if let Some(bucket) = &args.bucket {
            s3.bucket = bucket.clone();
        }
        if let Some(prefix) = &args.prefix {
            s3.prefix = prefix.clone();
        }
        if args.access_key.is_some() {
            s3.access_key = args.access_key.clone();
        }
        if args.secret_key.is_some() {
            s3.secret_key = args.secret_key.clone();
        }
        if args.session_token.is_some() {
            s3.session_token = args.session_token.clone();
        }
        if args.no_ssl {
            s3.use_ssl = false;
        }

        let upload: &mut UploadOptions = &mut self.upload;
        if let Some(n) = args.file_concurrency {
            upload.file_concurrency = n;
        }
        if let Some(n) = args.max_concurrent_archives {
            upload.max_concurrent_archives = n;
        }
        if let Some(n) = args.max_retries {
            upload.retry.max_retries = n;
        }
        if let Some(secs) = args.file_timeout {
            upload.file_timeout_secs = secs;
        }
        if let Some(journal) = &args.journal {
            upload.journal_path = Some(journal.clone());
        }
        upload.dry_run |= args.dry_run;
        if args.no_resume {
            upload.resume = false;
        }
        if args.no_skip_existing {
            upload.skip_existing = false;
        }
        if args.no_metadata {
            upload.preserve_metadata = false;
        }

        if args.all_files {
            self.filter.media_only = false;
        }
        self.filter.include.extend(args.include.iter().cloned());
        self.filter.exclude.extend(args.exclude.iter().cloned());
        self.filter.skip_dirs.extend(args.skip_dir.iter().cloned());
    }

    /// # Errors
    /// Returns error on a missing bucket or a zero concurrency limit.
    pub fn validate(&self) -> Result<()> {
        if self.s3.bucket.trim().is_empty() {
            bail!("no bucket configured (use --bucket, MEDIA_RELAY_BUCKET, or [s3] bucket)");
        }
        if self.upload.file_concurrency == 0 {
            bail!("file_concurrency must be at least 1");
        }
        if self.upload.max_concurrent_archives == 0 {
            bail!("max_concurrent_archives must be at least 1");
        }
        if self.s3.access_key.is_some() != self.s3.secret_key.is_some() {
            bail!("access key and secret key must be given together");
        }
        Ok(())
    }

    /// # Errors
    /// Returns error if an include or exclude pattern is invalid.
    pub fn media_filter(&self) -> Result<MediaFilter> {
        let base: MediaFilter = if self.filter.media_only {
            MediaFilter::new()
        } else {
            MediaFilter::all_files()
        };
        base.with_patterns(self.filter.include.clone(), self.filter.exclude.clone())
            .and_then(|filter: MediaFilter| filter.with_skipped_dirs(&self.filter.skip_dirs))
            .context("invalid file pattern")
    }
}
