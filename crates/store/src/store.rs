use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartLineId, OrderId, OrderStatus, PaymentId, ProductId, UserId};

use crate::{
    CartLine, NewOrderAggregate, Order, OrderItem, OrderQuery, Page, PageRequest, Payment,
    Product, Result, StatusHistoryEntry,
};

/// Product lookups and stock adjustments outside of an order transaction.
///
/// Checkout and cancellation adjust stock through [`UnitOfWork::adjust_stock`]
/// instead, so the change commits or rolls back with the order.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the current product row, if any.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product row.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Adds `delta` to the product's stock and returns the new level.
    ///
    /// Fails with `InsufficientStock` if the result would be negative.
    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<i64>;
}

/// Core trait for store implementations.
///
/// Single-row operations are exposed directly. Anything that writes more
/// than one entity goes through [`Store::begin`].
#[async_trait]
pub trait Store: Catalog {
    /// Starts a unit of work. Dropping it without [`UnitOfWork::commit`]
    /// discards every write made through it.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Adds `quantity` to the user's line for the product, creating it if needed.
    ///
    /// The increment is atomic: concurrent adds never lose an update.
    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// Returns the user's cart lines, oldest first.
    async fn get_cart(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Sets a line's quantity. Returns `None` if the line is not the user's.
    async fn update_cart_line(
        &self,
        line_id: CartLineId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Option<CartLine>>;

    /// Deletes a line. Deleting an absent line is not an error.
    async fn remove_cart_line(&self, line_id: CartLineId, user_id: UserId) -> Result<()>;

    /// Deletes all of the user's lines.
    async fn clear_cart(&self, user_id: UserId) -> Result<()>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Returns the order's history, oldest first.
    async fn get_status_history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>>;

    /// Lists non-deleted orders, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    async fn get_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Lists a user's payments, newest first.
    async fn list_user_payments(&self, user_id: UserId, page: PageRequest)
    -> Result<Page<Payment>>;

    /// Returns pending orders whose pending payment expired before `now`.
    async fn find_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>>;
}

/// A single atomic transaction over carts, orders, payments and stock.
///
/// Rows returned by the `lock_*` methods stay locked until the unit of work
/// ends, so the caller can validate against them and write without a gap.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks and returns the order row.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Locks the order owning the payment with this gateway reference and
    /// returns both rows.
    async fn lock_payment_by_reference(
        &mut self,
        external_reference: &str,
    ) -> Result<Option<(Order, Payment)>>;

    /// Returns the payment of an order locked in this unit of work.
    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Returns and locks the user's cart lines, restricted to `line_ids` when given.
    async fn cart_lines(
        &mut self,
        user_id: UserId,
        line_ids: Option<&[CartLineId]>,
    ) -> Result<Vec<CartLine>>;

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Adds `delta` to a product's stock with a floor of zero.
    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<i64>;

    /// Writes order, items, first history row and payment, and deletes the
    /// consumed cart lines.
    async fn insert_order_aggregate(&mut self, aggregate: &NewOrderAggregate) -> Result<()>;

    /// Sets the order's status. Pair with [`UnitOfWork::append_history`].
    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn append_history(&mut self, entry: &StatusHistoryEntry) -> Result<()>;

    /// Writes the payment's mutable fields and mirrors its status onto
    /// `orders.payment_status`.
    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Makes every write visible atomically and releases the locks.
    async fn commit(&mut self) -> Result<()>;
}
