//! History-trades price API.
//!
//! Endpoint: `GET {base}/history_trades/{stock_id}?limit=1`
//! Returns a JSON array of daily trade rows; the last row carries the most
//! recent `close_price`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::PriceSource;
use crate::types::{CbatError, Ntd};

#[derive(Debug, Deserialize)]
struct TradeRow {
    close_price: f64,
}

/// Client for the history-trades API.
pub struct HistoryTradesClient {
    http: Client,
    base_url: String,
}

impl HistoryTradesClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("CBAT/0.1.0 (convertible-bond-watcher)")
            .build()
            .context("Failed to build HTTP client for price API")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_rows(&self, stock_id: &str) -> Result<Vec<TradeRow>> {
        let url = format!(
            "{}/history_trades/{}?limit=1",
            self.base_url,
            urlencoding::encode(stock_id)
        );
        debug!(url = %url, "Fetching latest trade");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Price API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Price API error {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse history_trades response")
    }
}

/// Pick the latest close from a history_trades payload, rounded up to a
/// whole NTD.
fn latest_close(rows: &[TradeRow]) -> Result<Ntd> {
    let row = rows.last().context("no trades returned")?;
    if !row.close_price.is_finite() || row.close_price <= 0.0 {
        anyhow::bail!("non-positive close price {}", row.close_price);
    }
    Ok(row.close_price.ceil() as Ntd)
}

#[async_trait]
impl PriceSource for HistoryTradesClient {
    async fn latest_price(&self, stock_id: &str) -> Result<Ntd, CbatError> {
        let rows = self
            .fetch_rows(stock_id)
            .await
            .and_then(|rows| latest_close(&rows));

        rows.map_err(|e| CbatError::PriceLookup {
            stock_id: stock_id.to_string(),
            message: format!("{e:#}"),
        })
    }
}
