//! Logger setup.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Handle to the process-wide subscriber. Created once in `main`.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Install the global subscriber.
    ///
    /// `RUST_LOG` wins over `level` when set.
    ///
    /// # Errors
    /// Returns error if `level` is not a valid filter or a subscriber is already installed.
    pub fn init(level: &str) -> Result<Self> {
        let filter: EnvFilter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?,
        };
        let (layer, handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(layer)
            .with(fmt::layer().with_target(false))
            .try_init()
            .context("failed to install log subscriber")?;

        Ok(Self { filter: handle })
    }

    /// Replace the active filter.
    ///
    /// # Errors
    /// Returns error if `level` is not a valid filter.
    pub fn set_level(&self, level: &str) -> Result<()> {
        let filter: EnvFilter =
            EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?;
        self.filter
            .reload(filter)
            .context("failed to change log level")?;
        tracing::debug!(level, "Log level changed");
        Ok(())
    }
}
