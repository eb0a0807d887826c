//! Outbound human notifications.
//!
//! Delivery is fire-and-forget: a notifier never reports failure to the
//! caller, and a notifier without credentials silently does nothing.

pub mod line;

use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message. Must not fail the run.
    async fn notify(&self, message: &str);

    /// Whether messages actually leave the process.
    fn is_enabled(&self) -> bool;
}
