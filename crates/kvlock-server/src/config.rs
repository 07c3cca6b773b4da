//! Configuration management for kvlock
//!
//! Sources, later ones overriding earlier ones:
//! 1. `conf/kvlock.yml` (or the file given with `--config`)
//! 2. `KVLOCK_<SECTION>__<KEY>` environment variables, e.g. `KVLOCK_STORE__URL`
//! 3. command line overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment};
use kvlock_common::{
    DEFAULT_LOCK_TTL_MS, DEFAULT_LOCK_WAIT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STORE_URL,
};
use kvlock_core::LockOptions;
use tracing::Level;

use crate::startup::LoggingConfig;

const DEFAULT_CONFIG_FILE: &str = "conf/kvlock";

const STORE_URL: &str = "store.url";
const LOCK_KEY_PREFIX: &str = "lock.key_prefix";
const LOCK_POLL_INTERVAL_MS: &str = "lock.poll_interval_ms";
const LOCK_DEFAULT_TTL_MS: &str = "lock.default_ttl_ms";
const LOCK_DEFAULT_WAIT_MS: &str = "lock.default_wait_ms";
const LOG_LEVEL: &str = "log.level";
const LOG_DIR: &str = "log.dir";
const LOG_CONSOLE: &str = "log.console";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "kvlock", version, about = "Mutual exclusion locks held in a shared key-value store")]
pub struct Cli {
    /// Configuration file (default: conf/kvlock.yml, if present)
    #[arg(short = 'c', long = "config", env = "KVLOCK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Store endpoint, overrides `store.url`
    #[arg(long = "store-url")]
    pub store_url: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire a lock and print its owner token
    Acquire(AcquireArgs),
    /// Release a lock held by the given owner token
    Release(ReleaseArgs),
    /// Run a command while holding a lock
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct AcquireArgs {
    #[arg(short = 'k', long = "key")]
    pub key: String,
    /// Owner token (default: random UUID)
    #[arg(short = 't', long = "token")]
    pub token: Option<String>,
    #[arg(long = "ttl-ms")]
    pub ttl_ms: Option<u64>,
    #[arg(long = "wait-ms")]
    pub wait_ms: Option<u64>,
    /// Print the outcome as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    #[arg(short = 'k', long = "key")]
    pub key: String,
    #[arg(short = 't', long = "token")]
    pub token: String,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(short = 'k', long = "key")]
    pub key: String,
    #[arg(long = "ttl-ms")]
    pub ttl_ms: Option<u64>,
    #[arg(long = "wait-ms")]
    pub wait_ms: Option<u64>,
    /// Program and arguments, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        Self::from_sources(cli.config.as_deref(), cli.store_url.as_deref())
    }

    pub fn from_sources(config_file: Option<&Path>, store_url: Option<&str>) -> anyhow::Result<Self> {
        let mut config_builder = Config::builder();

        config_builder = match config_file {
            Some(path) => config_builder.add_source(config::File::from(path)),
            None => config_builder
                .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        config_builder = config_builder.add_source(
            Environment::with_prefix("KVLOCK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = store_url {
            config_builder = config_builder.set_override(STORE_URL, url)?;
        }

        Ok(Self {
            config: config_builder.build()?,
        })
    }

    pub fn store_url(&self) -> String {
        self.config
            .get_string(STORE_URL)
            .unwrap_or_else(|_| DEFAULT_STORE_URL.to_string())
    }

    pub fn key_prefix(&self) -> String {
        self.config.get_string(LOCK_KEY_PREFIX).unwrap_or_default()
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.get_u64(LOCK_POLL_INTERVAL_MS)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }

    pub fn default_ttl_ms(&self) -> u64 {
        self.get_u64(LOCK_DEFAULT_TTL_MS)
            .unwrap_or(DEFAULT_LOCK_TTL_MS)
    }

    pub fn default_wait_ms(&self) -> u64 {
        self.get_u64(LOCK_DEFAULT_WAIT_MS)
            .unwrap_or(DEFAULT_LOCK_WAIT_MS)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms()))
            .with_key_prefix(self.key_prefix())
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let level = self
            .config
            .get_string(LOG_LEVEL)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::WARN);

        LoggingConfig {
            log_dir: self.config.get_string(LOG_DIR).ok().map(PathBuf::from),
            console_output: self.config.get_bool(LOG_CONSOLE).unwrap_or(true),
            level,
            ..Default::default()
        }
    }

    // Negative values fall back to the default
    fn get_u64(&self, key: &str) -> Option<u64> {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
    }
}
