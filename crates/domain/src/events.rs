//! Integration events published after a unit of work commits.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, PaymentId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker topics.
pub mod topics {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_STATUS_CHANGED: &str = "order.status_changed";
    pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";
    pub const PAYMENT_FAILED: &str = "payment.failed";
}

/// Events emitted by the order lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// Checkout committed a new order.
    OrderCreated(OrderCreatedData),

    /// An order moved along the state machine.
    StatusChanged(StatusChangedData),

    /// A gateway callback marked the payment paid.
    PaymentSucceeded(PaymentSucceededData),

    /// A gateway callback marked the payment failed.
    PaymentFailed(PaymentFailedData),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => "OrderCreated",
            DomainEvent::StatusChanged(_) => "StatusChanged",
            DomainEvent::PaymentSucceeded(_) => "PaymentSucceeded",
            DomainEvent::PaymentFailed(_) => "PaymentFailed",
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => topics::ORDER_CREATED,
            DomainEvent::StatusChanged(_) => topics::ORDER_STATUS_CHANGED,
            DomainEvent::PaymentSucceeded(_) => topics::PAYMENT_SUCCEEDED,
            DomainEvent::PaymentFailed(_) => topics::PAYMENT_FAILED,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            DomainEvent::OrderCreated(data) => data.order_id,
            DomainEvent::StatusChanged(data) => data.order_id,
            DomainEvent::PaymentSucceeded(data) => data.order_id,
            DomainEvent::PaymentFailed(data) => data.order_id,
        }
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: String,
    /// `None` for system changes.
    pub actor_id: Option<UserId>,
}

/// Data for PaymentSucceeded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
}

/// Data for PaymentFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub reason: String,
}

/// Broker envelope around a [`DomainEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event_id: Uuid,
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub data: DomainEvent,
}

impl EventMessage {
    pub fn new(service: impl Into<String>, event: DomainEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_name: event.topic().to_string(),
            timestamp: Utc::now(),
            service: service.into(),
            data: event,
        }
    }
}
