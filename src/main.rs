//! CBAT: convertible-bond bulletin watcher and auto-trader
//!
//! Entry point. Parses flags, loads configuration, initialises structured
//! logging, wires the live collaborators and performs a single run. Meant
//! to be invoked by an external scheduler; one instance at a time.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use cbat::alerts::line::LineNotifier;
use cbat::alerts::Notifier;
use cbat::broker::bridge::BridgeConnector;
use cbat::bulletin::crawl::SfbClient;
use cbat::config::{AppConfig, CliArgs, RunOptions};
use cbat::engine::pipeline::{Pipeline, RunOutcome};
use cbat::market::history::HistoryTradesClient;
use cbat::storage::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = CliArgs::parse();
    init_logging();

    let cfg = AppConfig::load_or_default(&args.config)?;
    let options = RunOptions::from(&args);

    info!(
        buy = options.buy,
        simulation = options.simulation,
        money_per_transaction = options.per_order_cap,
        config = %args.config,
        "cbat starting"
    );

    let notifier = LineNotifier::new(AppConfig::resolve_env(&cfg.alerts.line_notify_token_env))?;
    if !notifier.is_enabled() {
        warn!(
            env = %cfg.alerts.line_notify_token_env,
            "No LINE Notify token found, notifications are disabled"
        );
    }

    let bulletin = SfbClient::new(&cfg.bulletin.page_url)?;
    let store = JsonFileStore::new(&cfg.storage.state_file);
    let prices = HistoryTradesClient::new(&cfg.market.price_api_url)?;
    let broker = BridgeConnector::new(&cfg.broker)?;

    let pipeline = Pipeline {
        bulletin: &bulletin,
        store: &store,
        notifier: &notifier,
        prices: &prices,
        broker: &broker,
        options,
        simulation_balance: cfg.broker.simulation_balance,
    };

    tokio::select! {
        outcome = pipeline.run() => log_outcome(&outcome),
        _ = tokio::signal::ctrl_c() => info!("Interrupted by user"),
    }

    info!("cbat exited");
    Ok(())
}

/// Log a one-line summary of the run.
fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Executed { report, .. } => info!(
            outcome = outcome.label(),
            filled = report.filled(),
            failed = report.failed(),
            skipped = report.skipped(),
            spent = report.total_spent(),
            balance = report.remaining_balance,
            halted = report.halted,
            "Run complete"
        ),
        RunOutcome::Notified { new_bonds, .. } => info!(
            outcome = outcome.label(),
            new_bonds = new_bonds.len(),
            "Run complete"
        ),
        RunOutcome::Aborted { error } => error!(
            outcome = outcome.label(),
            error = %error,
            "Run complete"
        ),
        _ => info!(outcome = outcome.label(), "Run complete"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cbat=info"));

    let json_logging = std::env::var("CBAT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
