//! Budgeted order executor.
//!
//! Buys newly announced bonds one at a time against a running balance.
//! Each bond gets at most `per_order_cap` NTD; quantity is the whole number
//! of shares the cap buys at the latest close. A failed price lookup or
//! order placement costs that bond its turn but never ends the run. The run
//! ends early only when the remaining balance can no longer cover a full
//! cap.

use tracing::{info, warn};

use crate::alerts::Notifier;
use crate::broker::OrderGateway;
use crate::market::PriceSource;
use crate::types::{AttemptOutcome, BondRecord, Ntd, OrderAttempt};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// Result of running the purchase loop over a list of bonds.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// One entry per bond actually tried, in order. Bonds after a hard stop
    /// are absent.
    pub attempts: Vec<OrderAttempt>,
    pub starting_balance: Ntd,
    pub remaining_balance: Ntd,
    /// The balance fell below the cap while bonds were still queued.
    pub halted: bool,
}

impl ExecutionReport {
    pub fn filled(&self) -> usize {
        self.attempts.iter().filter(|a| a.outcome.is_success()).count()
    }

    /// Price lookups and placements that went wrong.
    pub fn failed(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| {
                matches!(
                    a.outcome,
                    AttemptOutcome::PriceLookupFailed { .. } | AttemptOutcome::PlacementFailed { .. }
                )
            })
            .count()
    }

    /// Bonds priced above the per-order cap.
    pub fn skipped(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::SkippedZeroQuantity)
            .count()
    }

    pub fn total_spent(&self) -> Ntd {
        self.starting_balance - self.remaining_balance
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct BudgetedOrderExecutor {
    per_order_cap: Ntd,
}

impl BudgetedOrderExecutor {
    pub fn new(per_order_cap: Ntd) -> Self {
        Self { per_order_cap }
    }

    pub fn per_order_cap(&self) -> Ntd {
        self.per_order_cap
    }

    /// Whole shares the cap buys at `price`. Floor division, never negative.
    pub fn quantity_for(&self, price: Ntd) -> i64 {
        if price <= 0 || self.per_order_cap <= 0 {
            return 0;
        }
        self.per_order_cap / price
    }

    /// Try to buy each bond in order.
    ///
    /// Strictly sequential: bond N+1 is not looked at until bond N's attempt
    /// is resolved, and the balance only moves after a confirmed placement.
    pub async fn execute<P, G, N>(
        &self,
        bonds: &[BondRecord],
        starting_balance: Ntd,
        prices: &P,
        gateway: &G,
        notifier: &N,
    ) -> ExecutionReport
    where
        P: PriceSource + ?Sized,
        G: OrderGateway + ?Sized,
        N: Notifier + ?Sized,
    {
        let mut report = ExecutionReport {
            attempts: Vec::with_capacity(bonds.len()),
            starting_balance,
            remaining_balance: starting_balance,
            halted: false,
        };

        info!(
            count = bonds.len(),
            balance = starting_balance,
            per_order_cap = self.per_order_cap,
            "Buying new bonds"
        );

        for bond in bonds {
            if report.remaining_balance < self.per_order_cap {
                info!(
                    balance = report.remaining_balance,
                    per_order_cap = self.per_order_cap,
                    remaining_bonds = bonds.len() - report.attempts.len(),
                    "Balance below per-order cap, stopping"
                );
                report.halted = true;
                break;
            }

            let attempt = self
                .attempt(bond, report.remaining_balance, prices, gateway, notifier)
                .await;
            report.remaining_balance = attempt.balance_after;
            report.attempts.push(attempt);
        }

        info!(
            filled = report.filled(),
            failed = report.failed(),
            skipped = report.skipped(),
            spent = report.total_spent(),
            balance = report.remaining_balance,
            halted = report.halted,
            "Purchase loop complete"
        );

        report
    }

    async fn attempt<P, G, N>(
        &self,
        bond: &BondRecord,
        balance: Ntd,
        prices: &P,
        gateway: &G,
        notifier: &N,
    ) -> OrderAttempt
    where
        P: PriceSource + ?Sized,
        G: OrderGateway + ?Sized,
        N: Notifier + ?Sized,
    {
        let unchanged = |price: Option<Ntd>, quantity: i64, outcome: AttemptOutcome| OrderAttempt {
            bond: bond.clone(),
            price,
            quantity,
            spend: 0,
            balance_after: balance,
            outcome,
        };

        info!(stock_id = %bond.stock_id, "Placing order for {bond}");

        let lookup = match prices.latest_price(&bond.stock_id).await {
            Ok(price) if price > 0 => Ok(price),
            Ok(price) => Err(format!("non-positive price {price}")),
            Err(e) => Err(e.to_string()),
        };
        let price = match lookup {
            Ok(price) => price,
            Err(reason) => {
                warn!(stock_id = %bond.stock_id, reason = %reason, "Price lookup failed");
                notifier
                    .notify(&format!("\n[Error] Failed to get latest price for {bond}"))
                    .await;
                return unchanged(None, 0, AttemptOutcome::PriceLookupFailed { reason });
            }
        };

        let quantity = self.quantity_for(price);
        if quantity == 0 {
            warn!(
                stock_id = %bond.stock_id,
                price,
                per_order_cap = self.per_order_cap,
                "Price exceeds per-order cap, skipping"
            );
            notifier
                .notify(&format!(
                    "\n[Skipped] {bond}\nPrice {price} exceeds NTD${} per order",
                    self.per_order_cap
                ))
                .await;
            return unchanged(Some(price), 0, AttemptOutcome::SkippedZeroQuantity);
        }

        match gateway.place_limit_buy(&bond.stock_id, price, quantity).await {
            Ok(receipt) => {
                let spend = quantity * price;
                let balance_after = balance - spend;
                info!(
                    stock_id = %bond.stock_id,
                    order_id = %receipt.order_id,
                    quantity,
                    price,
                    spend,
                    balance = balance_after,
                    "Order placed"
                );
                notifier
                    .notify(&format!(
                        "\n[Order placed] {bond}\n\nQuantity: {quantity} shares\nClose price: {price}\nSpent: NTD${spend}\nBalance: NTD${balance_after}"
                    ))
                    .await;
                OrderAttempt {
                    bond: bond.clone(),
                    price: Some(price),
                    quantity,
                    spend,
                    balance_after,
                    outcome: AttemptOutcome::Filled {
                        order_id: receipt.order_id,
                    },
                }
            }
            Err(e) => {
                warn!(stock_id = %bond.stock_id, error = %e, "Order placement failed");
                notifier
                    .notify(&format!("\n[Error] Order failed for {bond}"))
                    .await;
                unchanged(
                    Some(price),
                    quantity,
                    AttemptOutcome::PlacementFailed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::MockNotifier;
    use crate::broker::MockOrderGateway;
    use crate::market::MockPriceSource;
    use crate::types::{CbatError, OrderReceipt};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn bond(id: &str) -> BondRecord {
        BondRecord::new(id, format!("name-{id}"), None, "轉換公司債(無擔保)").unwrap()
    }

    fn prices(table: &[(&str, Ntd)]) -> MockPriceSource {
        let table: HashMap<String, Ntd> =
            table.iter().map(|(id, p)| (id.to_string(), *p)).collect();
        let mut mock = MockPriceSource::new();
        mock.expect_latest_price().returning(move |id| {
            table.get(id).copied().ok_or_else(|| CbatError::PriceLookup {
                stock_id: id.to_string(),
                message: "no trades returned".into(),
            })
        });
        mock
    }

    /// Gateway that accepts everything except `reject`, recording orders.
    fn gateway(reject: &[&str], placed: Arc<Mutex<Vec<(String, Ntd, i64)>>>) -> MockOrderGateway {
        let reject: Vec<String> = reject.iter().map(|s| s.to_string()).collect();
        let mut mock = MockOrderGateway::new();
        mock.expect_place_limit_buy().returning(move |id, price, qty| {
            placed.lock().unwrap().push((id.to_string(), price, qty));
            if reject.iter().any(|r| r == id) {
                return Err(CbatError::OrderPlacement {
                    stock_id: id.to_string(),
                    message: "rejected by exchange".into(),
                });
            }
            Ok(OrderReceipt {
                order_id: format!("ord-{id}"),
                stock_id: id.to_string(),
                price,
                quantity: qty,
                timestamp: Utc::now(),
            })
        });
        mock
    }

    fn notifier(messages: Arc<Mutex<Vec<String>>>) -> MockNotifier {
        let mut mock = MockNotifier::new();
        mock.expect_notify().returning(move |m| messages.lock().unwrap().push(m.to_string()));
        mock.expect_is_enabled().return_const(true);
        mock
    }

    #[test]
    fn test_quantity_is_floor_division() {
        let exec = BudgetedOrderExecutor::new(10_000);
        assert_eq!(exec.quantity_for(37), 270);
        assert_eq!(exec.quantity_for(10_000), 1);
        assert_eq!(exec.quantity_for(10_001), 0);
        assert_eq!(exec.quantity_for(0), 0);
    }

    #[tokio::test]
    async fn test_single_order_spend_and_balance() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let exec = BudgetedOrderExecutor::new(10_000);

        let report = exec
            .execute(
                &[bond("A")],
                50_000,
                &prices(&[("A", 37)]),
                &gateway(&[], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert_eq!(report.attempts.len(), 1);
        let a = &report.attempts[0];
        assert_eq!(a.price, Some(37));
        assert_eq!(a.quantity, 270);
        assert_eq!(a.spend, 9_990);
        assert_eq!(a.balance_after, 50_000 - 9_990);
        assert_eq!(a.outcome, AttemptOutcome::Filled { order_id: "ord-A".into() });
        assert_eq!(report.remaining_balance, 40_010);
        assert_eq!(report.total_spent(), 9_990);
        assert!(!report.halted);

        assert_eq!(*placed.lock().unwrap(), vec![("A".to_string(), 37, 270)]);
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("[Order placed] [A]"));
        assert!(messages[0].contains("Quantity: 270 shares"));
        assert!(messages[0].contains("Spent: NTD$9990"));
        assert!(messages[0].contains("Balance: NTD$40010"));
    }

    #[tokio::test]
    async fn test_hard_stop_when_balance_below_cap() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let exec = BudgetedOrderExecutor::new(10_000);

        // 3 x 3000 = 9000, 2 x 4250 = 8500, leaving 7500.
        let report = exec
            .execute(
                &[bond("A"), bond("B"), bond("C")],
                25_000,
                &prices(&[("A", 3_000), ("B", 4_250), ("C", 10)]),
                &gateway(&[], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].spend, 9_000);
        assert_eq!(report.attempts[1].spend, 8_500);
        assert_eq!(report.remaining_balance, 7_500);
        assert!(report.halted);
        assert_eq!(placed.lock().unwrap().len(), 2);
        // The stop itself is not an error and sends nothing.
        assert_eq!(messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_attempt_when_starting_balance_too_low() {
        let mut price_source = MockPriceSource::new();
        price_source.expect_latest_price().never();
        let mut gw = MockOrderGateway::new();
        gw.expect_place_limit_buy().never();
        let mut n = MockNotifier::new();
        n.expect_notify().never();

        let report = BudgetedOrderExecutor::new(10_000)
            .execute(&[bond("A")], 9_999, &price_source, &gw, &n)
            .await;

        assert!(report.attempts.is_empty());
        assert!(report.halted);
        assert_eq!(report.remaining_balance, 9_999);
    }

    #[tokio::test]
    async fn test_price_failure_skips_bond_only() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let exec = BudgetedOrderExecutor::new(10_000);

        let report = exec
            .execute(
                &[bond("A"), bond("B")],
                10_000,
                &prices(&[("B", 100)]),
                &gateway(&[], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert_eq!(report.attempts.len(), 2);
        let first = &report.attempts[0];
        assert!(matches!(first.outcome, AttemptOutcome::PriceLookupFailed { .. }));
        assert_eq!(first.price, None);
        assert_eq!(first.balance_after, 10_000);
        assert!(report.attempts[1].outcome.is_success());
        assert_eq!(report.remaining_balance, 0);
        assert_eq!(*placed.lock().unwrap(), vec![("B".to_string(), 100, 100)]);

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("[Error] Failed to get latest price for [A]"));
    }

    #[tokio::test]
    async fn test_non_positive_price_is_lookup_failure() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let report = BudgetedOrderExecutor::new(10_000)
            .execute(
                &[bond("A")],
                10_000,
                &prices(&[("A", 0)]),
                &gateway(&[], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert!(matches!(
            report.attempts[0].outcome,
            AttemptOutcome::PriceLookupFailed { ref reason } if reason.contains("non-positive")
        ));
        assert!(placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_placement_failure_continues() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let report = BudgetedOrderExecutor::new(10_000)
            .execute(
                &[bond("A"), bond("B")],
                15_000,
                &prices(&[("A", 50), ("B", 50)]),
                &gateway(&["A"], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert_eq!(report.attempts.len(), 2);
        let first = &report.attempts[0];
        assert!(matches!(first.outcome, AttemptOutcome::PlacementFailed { .. }));
        assert_eq!(first.quantity, 200);
        assert_eq!(first.spend, 0);
        assert_eq!(first.balance_after, 15_000);
        assert!(report.attempts[1].outcome.is_success());
        assert_eq!(report.remaining_balance, 5_000);
        assert_eq!(report.filled(), 1);
        assert_eq!(report.failed(), 1);

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("[Error] Order failed for [A]"));
    }

    #[tokio::test]
    async fn test_zero_quantity_skips_gateway() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let report = BudgetedOrderExecutor::new(10_000)
            .execute(
                &[bond("A"), bond("B")],
                20_000,
                &prices(&[("A", 12_000), ("B", 1_000)]),
                &gateway(&[], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert_eq!(report.attempts[0].outcome, AttemptOutcome::SkippedZeroQuantity);
        assert_eq!(report.attempts[0].price, Some(12_000));
        assert_eq!(report.attempts[0].balance_after, 20_000);
        assert_eq!(*placed.lock().unwrap(), vec![("B".to_string(), 1_000, 10)]);
        assert_eq!(report.remaining_balance, 10_000);
        assert!(messages.lock().unwrap()[0].contains("[Skipped] [A]"));
        assert_eq!(report.filled(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn test_non_positive_cap_buys_nothing() {
        assert_eq!(BudgetedOrderExecutor::new(-100).quantity_for(37), 0);
        assert_eq!(BudgetedOrderExecutor::new(0).quantity_for(37), 0);
    }

    #[tokio::test]
    async fn test_negative_cap_never_places_orders() {
        let placed = Arc::new(Mutex::new(Vec::new()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let report = BudgetedOrderExecutor::new(-100)
            .execute(
                &[bond("A")],
                50_000,
                &prices(&[("A", 37)]),
                &gateway(&[], placed.clone()),
                &notifier(messages.clone()),
            )
            .await;

        assert!(placed.lock().unwrap().is_empty());
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::SkippedZeroQuantity);
        assert_eq!(report.attempts[0].quantity, 0);
        assert_eq!(report.attempts[0].spend, 0);
        assert_eq!(report.remaining_balance, 50_000);
    }

    #[tokio::test]
    async fn test_empty_bond_list() {
        let mut price_source = MockPriceSource::new();
        price_source.expect_latest_price().never();
        let mut gw = MockOrderGateway::new();
        gw.expect_place_limit_buy().never();
        let mut n = MockNotifier::new();
        n.expect_notify().never();

        let report = BudgetedOrderExecutor::new(10_000)
            .execute(&[], 50_000, &price_source, &gw, &n)
            .await;
        assert!(report.attempts.is_empty());
        assert!(!report.halted);
        assert_eq!(report.total_spent(), 0);
    }
}
