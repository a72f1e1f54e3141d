//! Order lifecycle services.
//!
//! This crate holds the business rules of the order engine:
//! - Carts that merge repeated adds into one line
//! - Checkout that reserves stock and creates the order, items and payment atomically
//! - The order state machine with its append-only status history
//! - Payment reconciliation for late, duplicate and out-of-order gateway callbacks
//! - Expiry of orders whose payment window has closed
//!
//! Services share a [`Context`] holding the store and the cache, event
//! publisher and shipping policy. Events are published only after the
//! writes they describe have committed.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod context;
pub mod error;
pub mod events;
pub mod order;
pub mod payment;
pub mod services;
pub mod viewer;

#[cfg(test)]
mod test_support;

pub use cart::{CartLineView, CartService, CartView, ProductSnapshot};
pub use catalog::{CatalogService, ProductInput};
pub use checkout::{CheckoutRequest, CheckoutService};
pub use context::{CommerceSettings, Context};
pub use error::{DomainError, Result};
pub use events::{DomainEvent, EventMessage};
pub use order::{ExpiryReport, OrderDetails, OrderService, OrderStatusView};
pub use payment::{CallbackOutcome, GatewayStatus, PaymentCallback, PaymentReconciler};
pub use services::cache::{Cache, CacheError, InMemoryCache};
pub use services::messaging::{EventPublisher, InMemoryPublisher, PublishError, TracingPublisher};
pub use services::shipping::{FlatRateShipping, ShippingPolicy};
pub use viewer::Viewer;
