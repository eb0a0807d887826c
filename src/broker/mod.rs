//! Brokerage integration.
//!
//! Defines the traits the purchase loop and the pipeline talk to:
//! - `OrderGateway`: places limit buy orders on an authenticated session
//! - `Brokerage`: a session that can also report the account balance
//! - `BrokerConnector`: performs login and certificate activation
//!
//! plus the credential bundle read from the environment.

pub mod bridge;

use async_trait::async_trait;
use secrecy::SecretString;
use std::path::PathBuf;

use crate::config::{AppConfig, BrokerConfig};
use crate::types::{CbatError, Ntd, OrderReceipt};

/// Order entry on an already authenticated session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a limit buy order. Failures are [`CbatError::OrderPlacement`].
    async fn place_limit_buy(
        &self,
        stock_id: &str,
        price: Ntd,
        quantity: i64,
    ) -> Result<OrderReceipt, CbatError>;
}

/// An authenticated brokerage session.
#[async_trait]
pub trait Brokerage: OrderGateway {
    /// Cash available for new orders, in whole NTD.
    async fn account_balance(&self) -> Result<Ntd, CbatError>;
}

/// Opens a brokerage session (login + certificate activation).
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, simulation: bool) -> Result<Box<dyn Brokerage>, CbatError>;
}

/// Everything needed to log in and sign orders.
pub struct BrokerCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
    pub ca_path: PathBuf,
    pub ca_passwd: SecretString,
    pub person_id: String,
}

impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("api_key", &"***")
            .field("ca_path", &self.ca_path)
            .field("person_id", &"***")
            .finish()
    }
}

impl BrokerCredentials {
    /// Read credentials from the environment variables named in `cfg`.
    /// The first missing variable is reported by name.
    pub fn from_env(cfg: &BrokerConfig) -> Result<Self, CbatError> {
        Self::from_lookup(cfg, AppConfig::resolve_env)
    }

    /// Same as [`BrokerCredentials::from_env`] with an arbitrary lookup.
    pub fn from_lookup<F>(cfg: &BrokerConfig, lookup: F) -> Result<Self, CbatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name).ok_or_else(|| CbatError::MissingCredential(name.to_string()))
        };

        Ok(Self {
            api_key: get(&cfg.api_key_env)?,
            api_secret: SecretString::new(get(&cfg.api_secret_env)?),
            ca_path: PathBuf::from(get(&cfg.ca_path_env)?),
            ca_passwd: SecretString::new(get(&cfg.ca_passwd_env)?),
            person_id: get(&cfg.person_id_env)?,
        })
    }
}
