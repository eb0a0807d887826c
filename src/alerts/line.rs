//! LINE Notify integration.
//!
//! API: `POST https://notify-api.line.me/api/notify`
//! Auth: `Authorization: Bearer {token}`; body is a form with `message`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::Notifier;

const NOTIFY_URL: &str = "https://notify-api.line.me/api/notify";

/// LINE Notify client. Without a token every call is a no-op.
pub struct LineNotifier {
    http: Client,
    token: Option<SecretString>,
    endpoint: String,
}

impl LineNotifier {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_endpoint(token, NOTIFY_URL)
    }

    /// Point the client somewhere other than the public endpoint.
    pub fn with_endpoint(token: Option<String>, endpoint: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("CBAT/0.1.0 (convertible-bond-watcher)")
            .build()
            .context("Failed to build HTTP client for LINE Notify")?;

        Ok(Self {
            http,
            token: token.map(SecretString::new),
            endpoint: endpoint.to_string(),
        })
    }

    async fn send(&self, token: &SecretString, message: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token.expose_secret())
            .form(&[("message", message)])
            .send()
            .await
            .context("LINE Notify request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("LINE Notify error {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    async fn notify(&self, message: &str) {
        let Some(token) = &self.token else {
            debug!("LINE Notify disabled, dropping message");
            return;
        };

        if let Err(e) = self.send(token, message).await {
            warn!(error = %format!("{e:#}"), "Failed to deliver LINE notification");
        }
    }

    fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_token() {
        let notifier = LineNotifier::new(None).unwrap();
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn test_enabled_with_token() {
        let notifier = LineNotifier::new(Some("abc".into())).unwrap();
        assert!(notifier.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_notify_is_noop() {
        // An unroutable endpoint proves no request is attempted.
        let notifier = LineNotifier::with_endpoint(None, "http://127.0.0.1:1/notify").unwrap();
        notifier.notify("hello").await;
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier =
            LineNotifier::with_endpoint(Some("abc".into()), "http://127.0.0.1:1/notify").unwrap();
        notifier.notify("hello").await;
    }
}
