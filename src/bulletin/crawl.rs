//! SFB bulletin page crawler.
//!
//! Page: `https://www.sfb.gov.tw/ch/home.jsp?id=1016&parentpath=0,6,52`
//! The first `table.table01.table02` lists the case spreadsheet. Its second
//! row holds the version token in the fourth cell and the download links in
//! the fifth; the second link is the spreadsheet.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::spreadsheet;
use super::{Bulletin, BulletinSource};
use crate::types::{BondRecord, CbatError};

lazy_static! {
    /// Version tokens look like `113.01.05` (ROC year, month, day).
    static ref VERSION_RE: Regex =
        Regex::new(r"^\d{3}\.\d{2}\.\d{2}$").expect("version pattern compiles");
}

/// Whether `version` has the fixed bulletin token shape.
pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

fn selector(css: &str) -> Result<Selector, CbatError> {
    Selector::parse(css)
        .map_err(|e| CbatError::BulletinFetch(format!("invalid selector {css}: {e:?}")))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Extract the bulletin version and spreadsheet URL from the page HTML.
pub fn parse_bulletin_page(html: &str, page_url: &str) -> Result<Bulletin, CbatError> {
    let missing = |what: &str| CbatError::BulletinFetch(format!("page layout changed: {what}"));

    let doc = Html::parse_document(html);
    let table = doc
        .select(&selector("table.table01.table02")?)
        .next()
        .ok_or_else(|| missing("no case table"))?;
    let row = table
        .select(&selector("tr")?)
        .nth(1)
        .ok_or_else(|| missing("case table has no data row"))?;
    let cells: Vec<ElementRef<'_>> = row.select(&selector("td")?).collect();
    if cells.len() < 5 {
        return Err(missing("data row has fewer than five cells"));
    }

    let version = cell_text(&cells[3]);
    if !is_valid_version(&version) {
        return Err(CbatError::MalformedVersion(version));
    }

    let href = cells[4]
        .select(&selector("a")?)
        .nth(1)
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| missing("no spreadsheet link"))?;

    let file_url = Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map_err(|e| CbatError::BulletinFetch(format!("bad spreadsheet link {href}: {e}")))?;

    Ok(Bulletin {
        version,
        file_url: file_url.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Live SFB bulletin client.
pub struct SfbClient {
    http: Client,
    page_url: String,
}

impl SfbClient {
    pub fn new(page_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("CBAT/0.1.0 (convertible-bond-watcher)")
            .build()
            .context("Failed to build HTTP client for SFB")?;

        Ok(Self {
            http,
            page_url: page_url.to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("GET {url} returned {status}");
        }
        Ok(resp)
    }

    async fn fetch_page(&self) -> Result<String> {
        let resp = self.get(&self.page_url).await?;
        resp.text().await.context("Failed to read bulletin page body")
    }

    async fn download(&self, file_url: &str) -> Result<Vec<u8>> {
        let resp = self.get(file_url).await?;
        let bytes = resp.bytes().await.context("Failed to read spreadsheet body")?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl BulletinSource for SfbClient {
    async fn fetch_bulletin(&self) -> Result<Bulletin, CbatError> {
        debug!(url = %self.page_url, "Fetching bulletin page");
        let html = self
            .fetch_page()
            .await
            .map_err(|e| CbatError::BulletinFetch(format!("{e:#}")))?;
        parse_bulletin_page(&html, &self.page_url)
    }

    async fn fetch_bonds(&self, file_url: &str) -> Result<Vec<BondRecord>, CbatError> {
        info!(url = %file_url, "Downloading spreadsheet");
        let bytes = self
            .download(file_url)
            .await
            .map_err(|e| CbatError::SpreadsheetDownload(format!("{e:#}")))?;
        debug!(bytes = bytes.len(), "Spreadsheet downloaded");
        spreadsheet::parse_workbook(bytes)
    }
}
