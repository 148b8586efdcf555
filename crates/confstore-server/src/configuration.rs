//! Application configuration loaded from config files and environment
//!
//! Sources, lowest precedence first:
//! 1. The YAML file named by `--config` (optional)
//! 2. `CONFSTORE_*` environment variables, `__` separating nested keys
//!    (e.g. `CONFSTORE_STORAGE__MAX_CONNECTIONS=10`)
//! 3. `--db-url` / `DATABASE_URL`

use std::path::PathBuf;

use anyhow::Context;
use config::{Config, ConfigError, Environment};
use confstore_persistence::StorageConfig;

use crate::cli::Cli;
use crate::logging::{LogRotation, LoggingConfig};

#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(config::File::from(cli.config.as_path()).required(false))
            .add_source(
                Environment::with_prefix("CONFSTORE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(url) = &cli.database_url {
            builder = builder
                .set_override("storage.url", url.as_str())
                .context("Failed to set storage url override")?;
        }

        let config = builder.build().with_context(|| {
            format!(
                "Failed to build configuration - check {}",
                cli.config.display()
            )
        })?;
        Ok(Configuration { config })
    }

    pub fn storage_config(&self) -> anyhow::Result<StorageConfig> {
        match self.config.get::<StorageConfig>("storage") {
            Ok(storage) => Ok(storage),
            Err(ConfigError::NotFound(_)) => Ok(StorageConfig::default()),
            Err(e) => Err(e).context("Invalid storage configuration"),
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok().map(PathBuf::from),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or_else(|_| "info".to_string()),
            self.config
                .get_string("logging.rotation")
                .map(|value| LogRotation::parse(&value))
                .unwrap_or(LogRotation::Daily),
        )
    }
}
