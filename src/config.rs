//! Configuration loading from TOML and the command line.
//!
//! `config.toml` holds endpoints, file paths and the *names* of the
//! environment variables carrying secrets. The secrets themselves are
//! resolved at runtime. Per-run switches (`--buy`, `--no-simulation`,
//! `--money-per-transaction`) come from the command line and are handed to
//! the pipeline as an explicit [`RunOptions`] value.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::types::Ntd;

/// Default spend cap for a single order.
pub const DEFAULT_MONEY_PER_TRANSACTION: Ntd = 10_000;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Watch the SFB convertible-bond bulletin and optionally buy new issues.
#[derive(Parser, Debug, Clone)]
#[command(name = "cbat")]
#[command(version)]
pub struct CliArgs {
    /// Trade against the live brokerage instead of the simulation environment
    #[arg(long, default_value_t = false)]
    pub no_simulation: bool,

    /// Maximum NTD spent on one bond
    #[arg(
        long,
        default_value_t = DEFAULT_MONEY_PER_TRANSACTION,
        value_parser = clap::value_parser!(i64).range(1..)
    )]
    pub money_per_transaction: Ntd,

    /// Place buy orders for newly announced bonds
    #[arg(long, default_value_t = false)]
    pub buy: bool,

    /// Path to the TOML configuration file
    #[arg(long, env = "CBAT_CONFIG", default_value = "config.toml")]
    pub config: String,
}

/// Switches for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub buy: bool,
    pub simulation: bool,
    pub per_order_cap: Ntd,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            buy: false,
            simulation: true,
            per_order_cap: DEFAULT_MONEY_PER_TRANSACTION,
        }
    }
}

impl From<&CliArgs> for RunOptions {
    fn from(args: &CliArgs) -> Self {
        Self {
            buy: args.buy,
            simulation: !args.no_simulation,
            per_order_cap: args.money_per_transaction,
        }
    }
}

// ---------------------------------------------------------------------------
// config.toml
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bulletin: BulletinConfig,
    pub market: MarketConfig,
    pub broker: BrokerConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BulletinConfig {
    pub page_url: String,
}

impl Default for BulletinConfig {
    fn default() -> Self {
        Self {
            page_url: "https://www.sfb.gov.tw/ch/home.jsp?id=1016&parentpath=0,6,52".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    pub price_api_url: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_api_url: "https://stock-api.seriaati.xyz".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    /// Base URL of the brokerage session bridge.
    pub bridge_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    pub ca_path_env: String,
    pub ca_passwd_env: String,
    pub person_id_env: String,
    /// Balance assumed when trading in the simulation environment.
    pub simulation_balance: Ntd,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:8080".to_string(),
            api_key_env: "API_KEY".to_string(),
            api_secret_env: "API_SECRET".to_string(),
            ca_path_env: "CA_PATH".to_string(),
            ca_passwd_env: "CA_PASSWD".to_string(),
            person_id_env: "PERSON_ID".to_string(),
            simulation_balance: 100_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub line_notify_token_env: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            line_notify_token_env: "LINE_NOTIFY_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: "saved.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            warn!(path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value, treating an
    /// empty value as unset.
    pub fn resolve_env(env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|v| !v.trim().is_empty())
    }
}
