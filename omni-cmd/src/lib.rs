//! Command implementations for the omni CLI.
//!
//! Provides subcommands for browsing report suites and their catalogs and
//! for running saved query descriptors, one at a time or as a batch.

use clap::{Args, Subcommand};
use omni_api::config::DEFAULT_ENDPOINT;
use omni_api::{AccountConfig, CacheConfig, Credentials};
use std::path::PathBuf;

pub mod catalog;
pub mod report;
pub mod rows;

/// Connection settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct Connection {
    /// API username (`user:Company`); read from the environment when omitted
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Shared secret; read from the environment when omitted
    #[arg(long, global = true)]
    pub secret: Option<String>,

    /// Prefix of the credential environment keys (e.g. ACME for ACME_OMNITURE_SECRET)
    #[arg(long, global = true, default_value = "")]
    pub env_prefix: String,

    /// Suffix of the credential environment keys
    #[arg(long, global = true, default_value = "")]
    pub env_suffix: String,

    /// REST endpoint of the reporting API
    #[arg(long, global = true, env = "OMNITURE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Directory for cached catalog listings
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Cache generation key (defaults to today's date)
    #[arg(long, global = true, requires = "cache_dir")]
    pub cache_key: Option<String>,
}

impl Connection {
    pub fn config(&self) -> anyhow::Result<AccountConfig> {
        let credentials = match (&self.username, &self.secret) {
            (Some(username), Some(secret)) => Credentials::new(username, secret),
            _ => Credentials::from_env(&self.env_prefix, &self.env_suffix)?,
        };
        let mut config = AccountConfig::new(credentials).with_endpoint(&self.endpoint);
        if let Some(dir) = &self.cache_dir {
            let cache = match &self.cache_key {
                Some(key) => CacheConfig::with_key(dir, key),
                None => CacheConfig::daily(dir),
            };
            config = config.with_cache(cache);
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the report suites visible to the account
    Suites,

    /// List the metrics of a report suite
    Metrics {
        /// Report suite id, title or position
        #[arg(short, long)]
        suite: String,
    },

    /// List the elements (dimensions) of a report suite
    Elements {
        /// Report suite id, title or position
        #[arg(short, long)]
        suite: String,
    },

    /// List the shared segments available to a report suite
    Segments {
        /// Report suite id, title or position
        #[arg(short, long)]
        suite: String,
    },

    /// Run one saved query descriptor
    Run {
        /// Path to a descriptor JSON file
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Write rows to this CSV file instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// First poll interval in seconds
        #[arg(long, default_value_t = 1)]
        interval: u64,

        /// Give up after this many seconds of polling
        #[arg(long)]
        deadline: Option<u64>,
    },

    /// Run several descriptors concurrently, one CSV per descriptor
    Batch {
        /// Paths to descriptor JSON files
        #[arg(short, long, required = true)]
        descriptor: Vec<PathBuf>,

        /// Directory receiving `<descriptor name>.csv` files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// First poll interval in seconds
        #[arg(long, default_value_t = 1)]
        interval: u64,

        /// Give up after this many seconds of polling
        #[arg(long)]
        deadline: Option<u64>,
    },
}

pub async fn run(connection: &Connection, command: Command) -> anyhow::Result<()> {
    let config = connection.config()?;
    match command {
        Command::Suites => catalog::list_suites(&config).await,
        Command::Metrics { suite } => {
            catalog::list_catalog(&config, &suite, omni_api::CatalogKind::Metrics).await
        }
        Command::Elements { suite } => {
            catalog::list_catalog(&config, &suite, omni_api::CatalogKind::Elements).await
        }
        Command::Segments { suite } => {
            catalog::list_catalog(&config, &suite, omni_api::CatalogKind::Segments).await
        }
        Command::Run {
            descriptor,
            output,
            interval,
            deadline,
        } => {
            let options = report::poll_options(interval, deadline);
            report::run_descriptor(&config, &descriptor, output.as_deref(), &options).await
        }
        Command::Batch {
            descriptor,
            output_dir,
            interval,
            deadline,
        } => {
            let options = report::poll_options(interval, deadline);
            report::run_batch(&config, &descriptor, &output_dir, &options).await
        }
    }
}
