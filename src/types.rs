//! Shared types for CBAT.
//!
//! The bond record, the persisted checkpoint, per-order attempt records
//! and the domain error taxonomy. Every other module depends on these;
//! nothing here performs I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whole New Taiwan dollars. The brokerage never deals in fractions here.
pub type Ntd = i64;

/// Offset between the ROC (Minguo) calendar year and the Gregorian year.
pub const ROC_YEAR_OFFSET: i32 = 1911;

/// The two case categories that count as convertible-bond issues.
pub const QUALIFYING_CATEGORIES: &[&str] = &["轉換公司債(無擔保)", "轉換公司債(有擔保)"];

// ---------------------------------------------------------------------------
// BondRecord
// ---------------------------------------------------------------------------

/// One convertible-bond case from the regulator bulletin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRecord {
    pub stock_id: String,
    pub stock_name: String,
    /// `None` until the filing takes legal effect.
    pub effective_date: Option<NaiveDate>,
    pub case_category: String,
}

impl BondRecord {
    /// Build a record, rejecting an empty stock id.
    pub fn new(
        stock_id: impl Into<String>,
        stock_name: impl Into<String>,
        effective_date: Option<NaiveDate>,
        case_category: impl Into<String>,
    ) -> Result<Self, CbatError> {
        let stock_id = stock_id.into().trim().to_string();
        if stock_id.is_empty() {
            return Err(CbatError::SpreadsheetParse(
                "row has an empty stock id".to_string(),
            ));
        }
        Ok(Self {
            stock_id,
            stock_name: stock_name.into(),
            effective_date,
            case_category: case_category.into(),
        })
    }

    /// Yahoo Finance TW chart page for the underlying stock.
    pub fn yahoo_url(&self) -> String {
        format!("https://tw.stock.yahoo.com/q/ta?s={}", self.stock_id)
    }

    pub fn is_qualifying_category(category: &str) -> bool {
        QUALIFYING_CATEGORIES.contains(&category.trim())
    }
}

impl fmt::Display for BondRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let effective = self
            .effective_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "[{}] {}: effective {}, category {}",
            self.stock_id, self.stock_name, effective, self.case_category
        )
    }
}

/// Convert an ROC calendar date packed as `YYYMMDD` (e.g. `1130105`) into
/// a Gregorian date.
pub fn roc_to_gregorian(packed: i64) -> Option<NaiveDate> {
    if packed <= 0 {
        return None;
    }
    let roc_year = i32::try_from(packed / 10_000).ok()?;
    let month = u32::try_from((packed / 100) % 100).ok()?;
    let day = u32::try_from(packed % 100).ok()?;
    NaiveDate::from_ymd_opt(roc_year + ROC_YEAR_OFFSET, month, day)
}

// ---------------------------------------------------------------------------
// VersionedState
// ---------------------------------------------------------------------------

/// Durable checkpoint: the last bulletin version seen and every bond it held.
///
/// Serialized as `{"version": "...", "cbs": {stock_id: BondRecord}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionedState {
    /// Empty string means no bulletin has been recorded yet.
    pub version: String,
    #[serde(rename = "cbs")]
    pub known_bonds: BTreeMap<String, BondRecord>,
}

impl VersionedState {
    /// Snapshot of a bulletin revision, keyed by stock id.
    pub fn from_bonds(version: impl Into<String>, bonds: &[BondRecord]) -> Self {
        Self {
            version: version.into(),
            known_bonds: bonds
                .iter()
                .map(|b| (b.stock_id.clone(), b.clone()))
                .collect(),
        }
    }

    pub fn knows(&self, stock_id: &str) -> bool {
        self.known_bonds.contains_key(stock_id)
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_empty() && self.known_bonds.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Broker acknowledgement for a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub stock_id: String,
    pub price: Ntd,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

/// How a single purchase attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Filled { order_id: String },
    PriceLookupFailed { reason: String },
    /// Price above the per-order cap; nothing sent to the broker.
    SkippedZeroQuantity,
    PlacementFailed { reason: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Filled { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Filled { order_id } => write!(f, "filled ({order_id})"),
            AttemptOutcome::PriceLookupFailed { reason } => {
                write!(f, "price lookup failed: {reason}")
            }
            AttemptOutcome::SkippedZeroQuantity => write!(f, "skipped (zero quantity)"),
            AttemptOutcome::PlacementFailed { reason } => write!(f, "placement failed: {reason}"),
        }
    }
}

/// One step of the purchase loop. Not persisted.
#[derive(Debug, Clone)]
pub struct OrderAttempt {
    pub bond: BondRecord,
    /// `None` when the price lookup failed.
    pub price: Option<Ntd>,
    pub quantity: i64,
    pub spend: Ntd,
    pub balance_after: Ntd,
    pub outcome: AttemptOutcome,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for CBAT.
#[derive(Debug, thiserror::Error)]
pub enum CbatError {
    #[error("Failed to fetch bulletin: {0}")]
    BulletinFetch(String),

    #[error("Malformed bulletin version: {0:?}")]
    MalformedVersion(String),

    #[error("Failed to download spreadsheet: {0}")]
    SpreadsheetDownload(String),

    #[error("Failed to parse spreadsheet: {0}")]
    SpreadsheetParse(String),

    #[error("Failed to load state: {0}")]
    StateLoad(String),

    #[error("Failed to save state: {0}")]
    StateSave(String),

    #[error("Missing brokerage environment variable: {0}")]
    MissingCredential(String),

    #[error("Brokerage login failed: {0}")]
    BrokerLogin(String),

    #[error("Certificate activation failed: {0}")]
    CertificateActivation(String),

    #[error("Failed to fetch account balance: {0}")]
    AccountBalance(String),

    #[error("Price lookup failed for {stock_id}: {message}")]
    PriceLookup { stock_id: String, message: String },

    #[error("Order placement failed for {stock_id}: {message}")]
    OrderPlacement { stock_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CbatError {
    /// Whether this error ends the whole run (as opposed to one bond).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CbatError::PriceLookup { .. } | CbatError::OrderPlacement { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
