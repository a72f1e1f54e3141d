//! Order state machine, queries and expiry.

mod service;
pub(crate) mod transition;

pub use service::OrderService;

use common::{OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use store::{Order, OrderItem, Payment, StatusHistoryEntry};

/// An order with its items and payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

/// Current status of an order and how it got there.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    /// Oldest first.
    pub history: Vec<StatusHistoryEntry>,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub expired: Vec<OrderId>,
    /// Orders that could not be cancelled this sweep and will be retried.
    pub failed: usize,
}
