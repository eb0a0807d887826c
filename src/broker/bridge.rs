//! Brokerage session bridge client.
//!
//! The brokerage has no Rust SDK, so orders go through a small
//! HTTP service that holds the SDK session. Endpoints:
//!
//! - `POST /login` `{api_key, secret_key, simulation}` → `{token}`
//! - `POST /activate_ca` `{ca_path, ca_passwd, person_id}`
//! - `GET  /account_balance` → `{acc_balance}`
//! - `POST /orders` → `{order_id}`
//!
//! Everything after `/login` carries `Authorization: Bearer {token}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{BrokerConnector, BrokerCredentials, Brokerage, OrderGateway};
use crate::config::BrokerConfig;
use crate::types::{CbatError, Ntd, OrderReceipt};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    api_key: &'a str,
    secret_key: &'a str,
    simulation: bool,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct ActivateCaRequest<'a> {
    ca_path: &'a str,
    ca_passwd: &'a str,
    person_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    acc_balance: f64,
}

/// Intraday odd-lot limit buy, rest-of-day.
#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    client_order_id: String,
    stock_id: &'a str,
    price: Ntd,
    quantity: i64,
    action: &'static str,
    price_type: &'static str,
    order_type: &'static str,
    order_lot: &'static str,
}

impl<'a> OrderRequest<'a> {
    fn limit_buy(stock_id: &'a str, price: Ntd, quantity: i64) -> Self {
        Self {
            client_order_id: format!("cbat-{}", uuid::Uuid::new_v4()),
            stock_id,
            price,
            quantity,
            action: "Buy",
            price_type: "LMT",
            order_type: "ROD",
            order_lot: "IntradayOdd",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_id: String,
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens sessions against the bridge using credentials from the environment.
pub struct BridgeConnector {
    http: Client,
    base_url: String,
    config: BrokerConfig,
}

impl BridgeConnector {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("CBAT/0.1.0 (convertible-bond-watcher)")
            .build()
            .context("Failed to build HTTP client for brokerage bridge")?;

        Ok(Self {
            http,
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    async fn login(&self, creds: &BrokerCredentials, simulation: bool) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest {
                api_key: &creds.api_key,
                secret_key: creds.api_secret.expose_secret(),
                simulation,
            })
            .send()
            .await
            .context("Login request failed")?;
        let body: LoginResponse = check(resp).await?.json().await.context("Bad login response")?;
        Ok(body.token)
    }

    async fn activate_ca(&self, token: &SecretString, creds: &BrokerCredentials) -> Result<()> {
        let ca_path = creds.ca_path.to_string_lossy();
        let resp = self
            .http
            .post(format!("{}/activate_ca", self.base_url))
            .bearer_auth(token.expose_secret())
            .json(&ActivateCaRequest {
                ca_path: &ca_path,
                ca_passwd: creds.ca_passwd.expose_secret(),
                person_id: &creds.person_id,
            })
            .send()
            .await
            .context("Certificate activation request failed")?;
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for BridgeConnector {
    async fn connect(&self, simulation: bool) -> Result<Box<dyn Brokerage>, CbatError> {
        let creds = BrokerCredentials::from_env(&self.config)?;

        info!(simulation, "Logging in to brokerage");
        let token = self
            .login(&creds, simulation)
            .await
            .map(SecretString::new)
            .map_err(|e| CbatError::BrokerLogin(format!("{e:#}")))?;

        info!("Activating certificate");
        self.activate_ca(&token, &creds)
            .await
            .map_err(|e| CbatError::CertificateActivation(format!("{e:#}")))?;

        Ok(Box::new(BridgeSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token,
        }))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Authenticated bridge session.
pub struct BridgeSession {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl BridgeSession {
    async fn fetch_balance(&self) -> Result<f64> {
        let resp = self
            .http
            .get(format!("{}/account_balance", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .context("Balance request failed")?;
        let body: BalanceResponse = check(resp).await?.json().await.context("Bad balance response")?;
        Ok(body.acc_balance)
    }

    async fn submit(&self, order: &OrderRequest<'_>) -> Result<String> {
        debug!(client_order_id = %order.client_order_id, "Submitting order");
        let resp = self
            .http
            .post(format!("{}/orders", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(order)
            .send()
            .await
            .context("Order request failed")?;
        let body: OrderResponse = check(resp).await?.json().await.context("Bad order response")?;
        Ok(body.order_id)
    }
}

#[async_trait]
impl OrderGateway for BridgeSession {
    async fn place_limit_buy(
        &self,
        stock_id: &str,
        price: Ntd,
        quantity: i64,
    ) -> Result<OrderReceipt, CbatError> {
        let order = OrderRequest::limit_buy(stock_id, price, quantity);
        let order_id = self
            .submit(&order)
            .await
            .map_err(|e| CbatError::OrderPlacement {
                stock_id: stock_id.to_string(),
                message: format!("{e:#}"),
            })?;

        Ok(OrderReceipt {
            order_id,
            stock_id: stock_id.to_string(),
            price,
            quantity,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl Brokerage for BridgeSession {
    async fn account_balance(&self) -> Result<Ntd, CbatError> {
        self.fetch_balance()
            .await
            .map(|b| b.floor() as Ntd)
            .map_err(|e| CbatError::AccountBalance(format!("{e:#}")))
    }
}

/// Turn a non-2xx response into an error carrying the body.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("Brokerage bridge error {status}: {body}")
}
