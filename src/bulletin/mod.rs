//! Regulator bulletin access.
//!
//! Defines the `BulletinSource` trait: where the current bulletin version
//! comes from and how its spreadsheet becomes a list of qualifying
//! [`BondRecord`]s. The SFB implementation lives in `crawl`, the
//! spreadsheet decoding in `spreadsheet`.

pub mod crawl;
pub mod spreadsheet;

use async_trait::async_trait;

use crate::types::{BondRecord, CbatError};

/// The bulletin's current revision and where to download it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bulletin {
    pub version: String,
    pub file_url: String,
}

#[async_trait]
pub trait BulletinSource: Send + Sync {
    /// Fetch the current version token and spreadsheet link.
    async fn fetch_bulletin(&self) -> Result<Bulletin, CbatError>;

    /// Download the spreadsheet and return the qualifying bonds, in sheet
    /// order.
    async fn fetch_bonds(&self, file_url: &str) -> Result<Vec<BondRecord>, CbatError>;
}
