//! Persisted record shapes.

use chrono::{DateTime, Utc};
use common::{
    CartLineId, HistoryId, Money, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentStatus,
    ProductId, UserId,
};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Stock ledger row for a catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    /// Units on hand; never negative.
    pub stock: i64,
    pub is_active: bool,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
            is_active: true,
        }
    }
}

/// Largest quantity a cart line or order item can hold. Quantities are
/// stored in a 32-bit signed column.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// Converts a line quantity to its column type.
pub(crate) fn quantity_column(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| {
        StoreError::OutOfRange(format!(
            "quantity {quantity} exceeds {MAX_LINE_QUANTITY}"
        ))
    })
}

/// A quantity of one product in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

/// Link from an order to its payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "payment_id", rename_all = "snake_case")]
pub enum PaymentLink {
    #[default]
    Unlinked,
    Linked(PaymentId),
}

impl PaymentLink {
    pub fn payment_id(&self) -> Option<PaymentId> {
        match self {
            PaymentLink::Unlinked => None,
            PaymentLink::Linked(id) => Some(*id),
        }
    }
}

/// Order header (the aggregate root).
///
/// `total_amount` is fixed at creation as `subtotal + shipping_cost` and is
/// never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
    pub shipping: ShippingAddress,
    pub notes: Option<String>,
    pub payment: PaymentLink,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Price and quantity snapshot of one product at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_subtotal: Money,
    pub created_at: DateTime<Utc>,
}

/// One row of the append-only order audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: HistoryId,
    pub order_id: OrderId,
    /// `None` only for the creation row.
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub note: String,
    /// `None` when the system made the change (gateway callback, expiry).
    pub actor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        order_id: OrderId,
        from_status: Option<OrderStatus>,
        to_status: OrderStatus,
        note: impl Into<String>,
        actor_id: Option<UserId>,
    ) -> Self {
        Self {
            id: HistoryId::new(),
            order_id,
            from_status,
            to_status,
            note: note.into(),
            actor_id,
            created_at: Utc::now(),
        }
    }
}

/// Payment record, 1:1 with its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: String,
    pub status: PaymentStatus,
    /// Gateway transaction id, assigned after checkout.
    pub external_reference: Option<String>,
    pub payment_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything checkout writes in one unit of work.
#[derive(Debug, Clone)]
pub struct NewOrderAggregate {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: StatusHistoryEntry,
    pub payment: Payment,
    /// Cart lines deleted by the same commit.
    pub consumed_cart_lines: Vec<CartLineId>,
}
