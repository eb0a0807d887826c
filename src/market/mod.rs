//! Market data.
//!
//! Defines the `PriceSource` trait used by the order executor to price a
//! bond before sizing the order, and the HTTP implementation backed by the
//! public history-trades API.

pub mod history;

use async_trait::async_trait;

use crate::types::{CbatError, Ntd};

/// Latest traded price lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Most recent traded price in whole NTD.
    ///
    /// A fractional close is rounded up, so the value can sit above any
    /// price that actually traded. The executor sizes the order and sends
    /// the limit price with this rounded value, not the raw close.
    ///
    /// Failures are reported as [`CbatError::PriceLookup`].
    async fn latest_price(&self, stock_id: &str) -> Result<Ntd, CbatError>;
}
