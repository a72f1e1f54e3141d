use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartLineId, OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    CartLine, NewOrderAggregate, Order, OrderItem, OrderQuery, Page, PageRequest, Payment,
    Product, Result, StatusHistoryEntry, StoreError,
    records::quantity_column,
    store::{Catalog, Store, UnitOfWork},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    cart_lines: Vec<CartLine>,
    orders: HashMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    history: Vec<StatusHistoryEntry>,
    payments: HashMap<PaymentId, Payment>,
}

impl MemoryState {
    fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<i64> {
        let product = self
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;

        let new_stock = product.stock.checked_add(delta).ok_or_else(|| {
            StoreError::OutOfRange(format!("stock of product {product_id} would overflow"))
        })?;
        if new_stock < 0 {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: delta.saturating_neg(),
                available: product.stock,
            });
        }
        product.stock = new_stock;
        Ok(new_stock)
    }

    fn payment_for_order(&self, order_id: OrderId) -> Option<&Payment> {
        self.payments.values().find(|p| p.order_id == order_id)
    }

    fn insert_order_aggregate(&mut self, aggregate: &NewOrderAggregate) -> Result<()> {
        let order = &aggregate.order;
        if self
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::Conflict(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        if self.payment_for_order(order.id).is_some() {
            return Err(StoreError::Conflict(format!(
                "order {} already has a payment",
                order.id
            )));
        }

        self.orders.insert(order.id, order.clone());
        self.order_items.extend(aggregate.items.iter().cloned());
        self.history.push(aggregate.history.clone());
        self.payments
            .insert(aggregate.payment.id, aggregate.payment.clone());
        self.cart_lines
            .retain(|line| !aggregate.consumed_cart_lines.contains(&line.id));
        Ok(())
    }
}

/// In-memory store implementation for tests and local runs.
///
/// Units of work hold one store-wide lock and write to a staged copy of the
/// state that replaces the live state on commit. That serializes every
/// transaction, which is stronger than per-order locking.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    /// Returns the number of history rows across all orders.
    pub async fn history_count(&self) -> usize {
        self.state.lock().await.history.len()
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        self.state.lock().await.products.insert(product.id, product);
        Ok(())
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<i64> {
        self.state.lock().await.adjust_stock(product_id, delta)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard: Some(guard),
            staged,
        }))
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        quantity_column(quantity)?;
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(line) = state
            .cart_lines
            .iter_mut()
            .find(|l| l.user_id == user_id && l.product_id == product_id)
        {
            let merged = line.quantity.checked_add(quantity).ok_or_else(|| {
                StoreError::OutOfRange(format!("cart quantity for product {product_id} overflows"))
            })?;
            quantity_column(merged)?;
            line.quantity = merged;
            line.updated_at = now;
            return Ok(line.clone());
        }

        let line = CartLine {
            id: CartLineId::new(),
            user_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        };
        state.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let state = self.state.lock().await;
        Ok(state
            .cart_lines
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_cart_line(
        &self,
        line_id: CartLineId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Option<CartLine>> {
        quantity_column(quantity)?;
        let mut state = self.state.lock().await;
        Ok(state
            .cart_lines
            .iter_mut()
            .find(|l| l.id == line_id && l.user_id == user_id)
            .map(|line| {
                line.quantity = quantity;
                line.updated_at = Utc::now();
                line.clone()
            }))
    }

    async fn remove_cart_line(&self, line_id: CartLineId, user_id: UserId) -> Result<()> {
        self.state
            .lock()
            .await
            .cart_lines
            .retain(|l| !(l.id == line_id && l.user_id == user_id));
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        self.state
            .lock()
            .await
            .cart_lines
            .retain(|l| l.user_id != user_id);
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .get(&order_id)
            .filter(|o| o.deleted_at.is_none())
            .cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let state = self.state.lock().await;
        Ok(state
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn get_status_history(&self, order_id: OrderId) -> Result<Vec<StatusHistoryEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.deleted_at.is_none())
            .filter(|o| query.user_id.is_none_or(|id| o.user_id == id))
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();

        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.order_number.cmp(&a.order_number))
        });

        Ok(Page::from_sorted(orders, query.page))
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(&payment_id).cloned())
    }

    async fn get_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.state.lock().await.payment_for_order(order_id).cloned())
    }

    async fn list_user_payments(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_sorted(payments, page))
    }

    async fn find_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let state = self.state.lock().await;
        let mut overdue: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.expires_at < now)
            .filter(|p| {
                state
                    .orders
                    .get(&p.order_id)
                    .is_some_and(|o| o.status == OrderStatus::Pending && o.deleted_at.is_none())
            })
            .map(|p| (p.expires_at, p.order_id))
            .collect();
        overdue.sort();
        Ok(overdue.into_iter().map(|(_, id)| id).collect())
    }
}

struct InMemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
}

impl InMemoryUnitOfWork {
    fn staged(&mut self) -> Result<&mut MemoryState> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.staged)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.staged()?;
        Ok(state
            .orders
            .get(&order_id)
            .filter(|o| o.deleted_at.is_none())
            .cloned())
    }

    async fn lock_payment_by_reference(
        &mut self,
        external_reference: &str,
    ) -> Result<Option<(Order, Payment)>> {
        let state = self.staged()?;
        let Some(payment) = state
            .payments
            .values()
            .find(|p| p.external_reference.as_deref() == Some(external_reference))
        else {
            return Ok(None);
        };
        let order = state
            .orders
            .get(&payment.order_id)
            .ok_or_else(|| StoreError::not_found("order", payment.order_id))?;
        Ok(Some((order.clone(), payment.clone())))
    }

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.staged()?.payment_for_order(order_id).cloned())
    }

    async fn cart_lines(
        &mut self,
        user_id: UserId,
        line_ids: Option<&[CartLineId]>,
    ) -> Result<Vec<CartLine>> {
        let state = self.staged()?;
        Ok(state
            .cart_lines
            .iter()
            .filter(|l| l.user_id == user_id)
            .filter(|l| line_ids.is_none_or(|ids| ids.contains(&l.id)))
            .cloned()
            .collect())
    }

    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.staged()?.products.get(&product_id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let state = self.staged()?;
        Ok(state
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<i64> {
        self.staged()?.adjust_stock(product_id, delta)
    }

    async fn insert_order_aggregate(&mut self, aggregate: &NewOrderAggregate) -> Result<()> {
        self.staged()?.insert_order_aggregate(aggregate)
    }

    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self
            .staged()?
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.status = status;
        order.updated_at = at;
        Ok(())
    }

    async fn append_history(&mut self, entry: &StatusHistoryEntry) -> Result<()> {
        self.staged()?.history.push(entry.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let state = self.staged()?;
        if let Some(reference) = payment.external_reference.as_deref()
            && state.payments.values().any(|p| {
                p.id != payment.id && p.external_reference.as_deref() == Some(reference)
            })
        {
            return Err(StoreError::Conflict(format!(
                "external reference {reference} already in use"
            )));
        }

        let stored = state
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| StoreError::not_found("payment", payment.id))?;
        *stored = payment.clone();

        let order = state
            .orders
            .get_mut(&payment.order_id)
            .ok_or_else(|| StoreError::not_found("order", payment.order_id))?;
        order.payment_status = payment.status;
        order.updated_at = payment.updated_at;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}
