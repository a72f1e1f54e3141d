//! Transactional storage for the order engine.
//!
//! The relational store is the single source of truth for carts, orders,
//! order items, status history, payments and product stock. Writes that span
//! more than one entity go through a [`UnitOfWork`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{OrderQuery, Page, PageRequest};
pub use records::{
    CartLine, MAX_LINE_QUANTITY, NewOrderAggregate, Order, OrderItem, Payment, PaymentLink,
    Product, ShippingAddress, StatusHistoryEntry,
};
pub use store::{Catalog, Store, UnitOfWork};
