//! One watch-and-buy run.
//!
//! fetch bulletin → compare with checkpoint → persist → notify → buy.
//!
//! The checkpoint is written as soon as the new bulletin is parsed, before
//! any notification or order. A crash afterwards loses that run's alerts
//! and orders, but the same bulletin version is never processed twice.
//!
//! Fatal errors are logged, sent as a single alert, and end the run with
//! [`RunOutcome::Aborted`]. They never escape as `Err`.

use tracing::{error, info, warn};

use super::detector::ChangeDetector;
use super::executor::{BudgetedOrderExecutor, ExecutionReport};
use crate::alerts::Notifier;
use crate::broker::BrokerConnector;
use crate::bulletin::BulletinSource;
use crate::config::RunOptions;
use crate::market::PriceSource;
use crate::storage::StateStore;
use crate::types::{BondRecord, CbatError, Ntd};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Bulletin version unchanged; the spreadsheet was not downloaded.
    NoNewVersion { version: String },
    /// Version changed but every bond was already known.
    NoNewBonds { version: String },
    /// Every bond looked new, which is what an empty checkpoint produces.
    /// Nothing was sent or bought.
    FirstRunSuppressed { version: String, count: usize },
    /// New bonds announced; buying not requested.
    Notified { version: String, new_bonds: Vec<BondRecord> },
    /// New bonds announced and the purchase loop ran.
    Executed {
        version: String,
        new_bonds: Vec<BondRecord>,
        report: ExecutionReport,
    },
    Aborted { error: CbatError },
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunOutcome::Aborted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::NoNewVersion { .. } => "no-new-version",
            RunOutcome::NoNewBonds { .. } => "no-new-bonds",
            RunOutcome::FirstRunSuppressed { .. } => "first-run-suppressed",
            RunOutcome::Notified { .. } => "notified",
            RunOutcome::Executed { .. } => "executed",
            RunOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// Collaborators and switches for a run.
pub struct Pipeline<'a> {
    pub bulletin: &'a dyn BulletinSource,
    pub store: &'a dyn StateStore,
    pub notifier: &'a dyn Notifier,
    pub prices: &'a dyn PriceSource,
    pub broker: &'a dyn BrokerConnector,
    pub options: RunOptions,
    /// Starting balance used instead of the account's when simulating.
    pub simulation_balance: Ntd,
}

impl Pipeline<'_> {
    pub async fn run(&self) -> RunOutcome {
        match self.try_run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Run aborted");
                self.notifier.notify(&format!("\n[Error] {e}")).await;
                RunOutcome::Aborted { error: e }
            }
        }
    }

    async fn try_run(&self) -> Result<RunOutcome, CbatError> {
        info!("Fetching bulletin version and spreadsheet link");
        let bulletin = self.bulletin.fetch_bulletin().await?;

        let previous = self.store.load()?;
        if !ChangeDetector::is_new_version(&bulletin.version, &previous) {
            info!(version = %bulletin.version, "No new bulletin version");
            return Ok(RunOutcome::NoNewVersion {
                version: bulletin.version,
            });
        }
        info!(
            version = %bulletin.version,
            previous = %previous.version,
            "New bulletin version"
        );

        let bonds = self.bulletin.fetch_bonds(&bulletin.file_url).await?;
        info!(count = bonds.len(), "Convertible bonds in spreadsheet");

        let detection = ChangeDetector::detect(&bulletin.version, &bonds, &previous);

        info!("Saving bulletin version and bonds");
        self.store.save(&detection.next_state)?;

        let version = bulletin.version;
        if detection.new_bonds.is_empty() {
            info!(version = %version, "No new convertible bonds");
            return Ok(RunOutcome::NoNewBonds { version });
        }

        info!(count = detection.new_bonds.len(), "New convertible bonds found");
        if detection.all_new() {
            warn!(
                count = detection.new_bonds.len(),
                "Every bond is new, treating as first run and staying quiet"
            );
            return Ok(RunOutcome::FirstRunSuppressed {
                version,
                count: detection.new_bonds.len(),
            });
        }

        for bond in &detection.new_bonds {
            self.notifier
                .notify(&format!("\n[New CB] {bond}\n[yahoo] {}", bond.yahoo_url()))
                .await;
        }

        if !self.options.buy {
            info!("Buying not requested, done");
            return Ok(RunOutcome::Notified {
                version,
                new_bonds: detection.new_bonds,
            });
        }

        let session = self.broker.connect(self.options.simulation).await?;

        info!("Fetching account balance");
        let account_balance = session.account_balance().await?;
        let starting_balance = if self.options.simulation {
            self.simulation_balance
        } else {
            account_balance
        };
        info!(
            balance = starting_balance,
            simulation = self.options.simulation,
            "Account balance"
        );

        let executor = BudgetedOrderExecutor::new(self.options.per_order_cap);
        let report = executor
            .execute(
                &detection.new_bonds,
                starting_balance,
                self.prices,
                &*session,
                self.notifier,
            )
            .await;

        Ok(RunOutcome::Executed {
            version,
            new_bonds: detection.new_bonds,
            report,
        })
    }
}
