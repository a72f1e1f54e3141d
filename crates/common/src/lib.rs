//! Shared types for the order engine.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, PaymentStatus, UnknownStatus};
pub use types::{CartLineId, HistoryId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
