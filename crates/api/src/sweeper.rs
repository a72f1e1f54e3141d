//! Background task that cancels orders whose payment window has closed.

use std::time::Duration;

use chrono::Utc;
use domain::OrderService;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs [`OrderService::expire_overdue_orders`] every `period` until aborted.
///
/// A failed sweep is logged; the next tick tries again.
pub fn spawn_expiry_sweep(orders: OrderService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match orders.expire_overdue_orders(Utc::now()).await {
                Ok(report) if report.failed > 0 => {
                    tracing::warn!(
                        expired = report.expired.len(),
                        failed = report.failed,
                        "expiry sweep incomplete"
                    );
                }
                Ok(report) => {
                    tracing::debug!(expired = report.expired.len(), "expiry sweep done");
                }
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
    })
}
