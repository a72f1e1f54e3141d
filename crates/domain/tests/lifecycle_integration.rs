//! Integration tests for the order lifecycle.
//!
//! These run the services together over the in-memory store and check the
//! invariants that span modules: stock conservation, atomic checkout,
//! history completeness, callback idempotency and publish-after-commit.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{Money, OrderId, OrderStatus, PaymentStatus, ProductId, UserId};
use domain::{
    CartService, CheckoutRequest, CheckoutService, CommerceSettings, Context, DomainError,
    EventPublisher, InMemoryCache, InMemoryPublisher, OrderDetails, OrderService, PaymentCallback,
    PaymentReconciler, PublishError, Viewer, events::topics,
};
use futures_util::future::join_all;
use store::{Catalog, InMemoryStore, Product, ShippingAddress, Store};

struct Fixture {
    ctx: Context,
    store: InMemoryStore,
    publisher: InMemoryPublisher,
}

impl Fixture {
    fn new() -> Self {
        Self::with_shipping_cents(200)
    }

    fn with_shipping_cents(cents: i64) -> Self {
        let store = InMemoryStore::new();
        let publisher = InMemoryPublisher::new();
        let settings = CommerceSettings {
            shipping_flat_rate: Money::from_cents(cents),
            ..Default::default()
        };
        let ctx = Context::new(Arc::new(store.clone()), settings)
            .with_cache(Arc::new(InMemoryCache::new()))
            .with_publisher(Arc::new(publisher.clone()));
        Self {
            ctx,
            store,
            publisher,
        }
    }

    fn cart(&self) -> CartService {
        CartService::new(self.ctx.clone())
    }

    fn checkout_service(&self) -> CheckoutService {
        CheckoutService::new(self.ctx.clone())
    }

    fn orders(&self) -> OrderService {
        OrderService::new(self.ctx.clone())
    }

    fn payments(&self) -> PaymentReconciler {
        PaymentReconciler::new(self.ctx.clone())
    }

    async fn product(&self, name: &str, price_cents: i64, stock: i64) -> Product {
        let product = Product::new(name, Money::from_cents(price_cents), stock);
        self.store.upsert_product(product.clone()).await.unwrap();
        product
    }

    async fn stock(&self, product_id: ProductId) -> i64 {
        self.store.get_product(product_id).await.unwrap().unwrap().stock
    }

    async fn checkout(&self, user: UserId) -> Result<OrderDetails, DomainError> {
        self.checkout_service()
            .checkout(CheckoutRequest::new(user, address()))
            .await
    }

    async fn order_with_reference(&self, user: UserId, reference: &str) -> OrderDetails {
        let product = self.product("Widget", 1000, 10).await;
        self.cart().add_to_cart(user, product.id, 1).await.unwrap();
        let details = self.checkout(user).await.unwrap();
        self.payments()
            .attach_gateway_reference(details.order.id, user, reference, None)
            .await
            .unwrap();
        details
    }

    async fn assert_history_complete(&self, order_id: OrderId) {
        let order = self.store.get_order(order_id).await.unwrap().unwrap();
        let history = self.store.get_status_history(order_id).await.unwrap();

        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, OrderStatus::Pending);
        for pair in history.windows(2) {
            assert_eq!(pair[1].from_status, Some(pair[0].to_status));
        }
        assert_eq!(history.last().unwrap().to_status, order.status);
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        address: "42 Harbour Rd".to_string(),
        city: "Portsmouth".to_string(),
        province: "NH".to_string(),
        postal_code: "03801".to_string(),
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn two_product_order_reserves_stock() {
        let f = Fixture::new();
        let a = f.product("A", 1000, 5).await;
        let b = f.product("B", 500, 1).await;
        let user = UserId::new();
        f.cart().add_to_cart(user, a.id, 2).await.unwrap();
        f.cart().add_to_cart(user, b.id, 1).await.unwrap();

        let details = f.checkout(user).await.unwrap();

        assert_eq!(details.order.subtotal, Money::from_cents(2500));
        assert_eq!(details.order.shipping_cost, Money::from_cents(200));
        assert_eq!(details.order.total_amount, Money::from_cents(2700));
        assert_eq!(details.order.status, OrderStatus::Pending);
        assert_eq!(details.items.len(), 2);
        assert_eq!(f.stock(a.id).await, 3);
        assert_eq!(f.stock(b.id).await, 0);
        assert!(f.store.get_cart(user).await.unwrap().is_empty());

        let payment = details.payment.unwrap();
        assert_eq!(payment.amount, Money::from_cents(2700));
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.expires_at > details.order.created_at);

        f.assert_history_complete(details.order.id).await;
    }

    #[tokio::test]
    async fn second_checkout_of_sold_out_product_changes_nothing() {
        let f = Fixture::new();
        let a = f.product("A", 1000, 5).await;
        let b = f.product("B", 500, 1).await;
        let first = UserId::new();
        f.cart().add_to_cart(first, a.id, 2).await.unwrap();
        f.cart().add_to_cart(first, b.id, 1).await.unwrap();
        f.checkout(first).await.unwrap();

        let second = UserId::new();
        f.cart().add_to_cart(second, a.id, 1).await.unwrap();
        f.cart().add_to_cart(second, b.id, 1).await.unwrap();
        let err = f.checkout(second).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::InsufficientStock { product_id, available: 0, .. } if product_id == b.id
        ));
        assert_eq!(f.stock(a.id).await, 3);
        assert_eq!(f.store.order_count().await, 1);
        assert_eq!(f.store.get_cart(second).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn last_unit_is_sold_exactly_once() {
        let f = Fixture::new();
        let product = f.product("Last", 1000, 1).await;

        let mut users = Vec::new();
        for _ in 0..8 {
            let user = UserId::new();
            f.cart().add_to_cart(user, product.id, 1).await.unwrap();
            users.push(user);
        }

        let handles = users.into_iter().map(|user| {
            let service = f.checkout_service();
            tokio::spawn(async move {
                service
                    .checkout(CheckoutRequest::new(user, address()))
                    .await
            })
        });
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let placed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), "insufficient_stock");
        }
        assert_eq!(f.stock(product.id).await, 0);
        assert_eq!(f.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let f = Fixture::new();
        let product = f.product("Widget", 100, 100).await;

        let mut numbers = std::collections::HashSet::new();
        for _ in 0..20 {
            let user = UserId::new();
            f.cart().add_to_cart(user, product.id, 1).await.unwrap();
            let details = f.checkout(user).await.unwrap();
            assert!(details.order.order_number.starts_with("ORD-"));
            assert!(numbers.insert(details.order.order_number));
        }
    }
}

mod cart {
    use super::*;

    #[tokio::test]
    async fn concurrent_adds_merge_into_one_line() {
        let f = Fixture::new();
        let product = f.product("Widget", 1000, 50).await;
        let user = UserId::new();

        let adds = (0..10).map(|_| {
            let cart = f.cart();
            tokio::spawn(async move { cart.add_to_cart(user, product.id, 2).await })
        });
        for joined in join_all(adds).await {
            joined.unwrap().unwrap();
        }

        let view = f.cart().get_cart(user).await.unwrap();
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].line.quantity, 20);
        assert_eq!(view.total_quantity, 20);
        assert_eq!(view.estimated_subtotal, Money::from_cents(20_000));
    }

    #[tokio::test]
    async fn cart_reflects_current_prices() {
        let f = Fixture::new();
        let mut product = f.product("Widget", 1000, 5).await;
        let user = UserId::new();
        f.cart().add_to_cart(user, product.id, 1).await.unwrap();
        f.cart().get_cart(user).await.unwrap();

        product.price = Money::from_cents(750);
        f.store.upsert_product(product).await.unwrap();

        let view = f.cart().get_cart(user).await.unwrap();
        assert_eq!(view.estimated_subtotal, Money::from_cents(750));
    }
}

mod state_machine {
    use super::*;

    async fn order_in(f: &Fixture, status: OrderStatus) -> OrderId {
        let product = f.product("Widget", 1000, 10).await;
        let user = UserId::new();
        f.cart().add_to_cart(user, product.id, 1).await.unwrap();
        let order_id = f.checkout(user).await.unwrap().order.id;

        let path: &[OrderStatus] = match status {
            OrderStatus::Pending => &[],
            OrderStatus::Confirmed => &[OrderStatus::Confirmed],
            OrderStatus::Shipped => &[OrderStatus::Confirmed, OrderStatus::Shipped],
            OrderStatus::Delivered => &[
                OrderStatus::Confirmed,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ],
            OrderStatus::Cancelled => &[OrderStatus::Cancelled],
        };
        for &step in path {
            f.orders()
                .transition_order(order_id, step, "setup", None)
                .await
                .unwrap();
        }
        order_id
    }

    #[tokio::test]
    async fn only_table_edges_are_accepted() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let f = Fixture::new();
                let order_id = order_in(&f, from).await;
                let history_before = f.store.get_status_history(order_id).await.unwrap().len();

                let result = f
                    .orders()
                    .transition_order(order_id, to, "matrix check", Some(UserId::new()))
                    .await;

                let history_after = f.store.get_status_history(order_id).await.unwrap().len();
                if from.can_transition_to(to) {
                    assert_eq!(result.unwrap().status, to, "{from} -> {to}");
                    assert_eq!(history_after, history_before + 1);
                } else {
                    assert!(
                        matches!(result, Err(DomainError::InvalidTransition { .. })),
                        "{from} -> {to} should be rejected"
                    );
                    assert_eq!(history_after, history_before);
                }
                f.assert_history_complete(order_id).await;
            }
        }
    }

    #[tokio::test]
    async fn cancel_restores_stock_and_cancels_payment() {
        let f = Fixture::new();
        let product = f.product("Widget", 1000, 4).await;
        let user = UserId::new();
        f.cart().add_to_cart(user, product.id, 3).await.unwrap();
        let details = f.checkout(user).await.unwrap();
        assert_eq!(f.stock(product.id).await, 1);

        f.orders()
            .cancel_order(details.order.id, user, Some("changed my mind"))
            .await
            .unwrap();

        assert_eq!(f.stock(product.id).await, 4);
        let payment = f
            .store
            .get_payment_for_order(details.order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Cancelled);

        let view = f
            .orders()
            .get_status_history(details.order.id, Viewer::Customer(user))
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Cancelled);
        assert_eq!(view.history.last().unwrap().note, "changed my mind");
        assert_eq!(view.history.last().unwrap().actor_id, Some(user));
    }

    #[tokio::test]
    async fn cancel_after_ship_is_rejected_without_restock() {
        let f = Fixture::new();
        let order_id = order_in(&f, OrderStatus::Shipped).await;
        let order = f.store.get_order(order_id).await.unwrap().unwrap();
        let item = f.store.get_order_items(order_id).await.unwrap().remove(0);
        let stock_before = f.stock(item.product_id).await;

        let err = f
            .orders()
            .cancel_order(order_id, order.user_id, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(f.stock(item.product_id).await, stock_before);
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_cancel() {
        let f = Fixture::new();
        let order_id = order_in(&f, OrderStatus::Pending).await;
        let stranger = UserId::new();

        let err = f
            .orders()
            .get_order(order_id, Viewer::Customer(stranger))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = f
            .orders()
            .cancel_order(order_id, stranger, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(f.orders().get_order(order_id, Viewer::Admin).await.is_ok());
    }
}

mod payments {
    use super::*;

    #[tokio::test]
    async fn duplicate_success_callbacks_confirm_once() {
        let f = Fixture::new();
        let user = UserId::new();
        let details = f.order_with_reference(user, "tx-100").await;
        let callback =
            PaymentCallback::new("tx-100", "settlement", details.order.total_amount);

        let outcomes = join_all((0..5).map(|_| {
            let payments = f.payments();
            let callback = callback.clone();
            tokio::spawn(async move { payments.apply_callback(callback).await })
        }))
        .await;

        let applied = outcomes
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .filter(|outcome| outcome.as_str() == "applied")
            .count();
        assert_eq!(applied, 1);

        let history = f.store.get_status_history(details.order.id).await.unwrap();
        let confirmations = history
            .iter()
            .filter(|h| h.to_status == OrderStatus::Confirmed)
            .count();
        assert_eq!(confirmations, 1);
        f.assert_history_complete(details.order.id).await;
        assert_eq!(
            f.publisher
                .topics()
                .iter()
                .filter(|t| *t == topics::PAYMENT_SUCCEEDED)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn conflicting_callbacks_leave_first_result() {
        let f = Fixture::new();
        let user = UserId::new();
        let details = f.order_with_reference(user, "tx-200").await;
        let amount = details.order.total_amount;

        f.payments()
            .apply_callback(PaymentCallback::new("tx-200", "settlement", amount))
            .await
            .unwrap();
        let err = f
            .payments()
            .apply_callback(PaymentCallback::new("tx-200", "deny", amount))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "conflicting_payment_state");
        let payment = f
            .payments()
            .get_payment_for_order(details.order.id, Viewer::Customer(user))
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn wrong_amount_is_rejected() {
        let f = Fixture::new();
        let user = UserId::new();
        let details = f.order_with_reference(user, "tx-300").await;

        let err = f
            .payments()
            .apply_callback(PaymentCallback::new(
                "tx-300",
                "settlement",
                details.order.total_amount.checked_add(Money::from_cents(1)).unwrap(),
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "amount_mismatch");
        let order = f.store.get_order(details.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_gateway_status_is_rejected() {
        let f = Fixture::new();
        let user = UserId::new();
        let details = f.order_with_reference(user, "tx-400").await;

        let err = f
            .payments()
            .apply_callback(PaymentCallback::new(
                "tx-400",
                "chargeback",
                details.order.total_amount,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}

mod expiry {
    use super::*;

    #[tokio::test]
    async fn overdue_orders_are_cancelled_and_restocked() {
        let f = Fixture::new();
        let product = f.product("Widget", 1000, 3).await;
        let user = UserId::new();
        f.cart().add_to_cart(user, product.id, 2).await.unwrap();
        let details = f.checkout(user).await.unwrap();

        let report = f
            .orders()
            .expire_overdue_orders(Utc::now() + Duration::days(2))
            .await
            .unwrap();

        assert_eq!(report.expired, vec![details.order.id]);
        assert_eq!(report.failed, 0);
        assert_eq!(f.stock(product.id).await, 3);

        let order = f.store.get_order(details.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Cancelled);
        let history = f.store.get_status_history(order.id).await.unwrap();
        assert_eq!(history.last().unwrap().note, "Payment expired");
        assert_eq!(history.last().unwrap().actor_id, None);
    }

    #[tokio::test]
    async fn paid_and_fresh_orders_are_left_alone() {
        let f = Fixture::new();
        let user = UserId::new();
        let paid = f.order_with_reference(user, "tx-500").await;
        f.payments()
            .apply_callback(PaymentCallback::new(
                "tx-500",
                "settlement",
                paid.order.total_amount,
            ))
            .await
            .unwrap();
        let fresh = f.order_with_reference(UserId::new(), "tx-501").await;

        let report = f.orders().expire_overdue_orders(Utc::now()).await.unwrap();
        assert!(report.expired.is_empty());

        let report = f
            .orders()
            .expire_overdue_orders(Utc::now() + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(report.expired, vec![fresh.order.id]);

        let order = f.store.get_order(paid.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn late_success_after_expiry_is_a_conflict() {
        let f = Fixture::new();
        let user = UserId::new();
        let details = f.order_with_reference(user, "tx-600").await;
        f.orders()
            .expire_overdue_orders(Utc::now() + Duration::days(2))
            .await
            .unwrap();

        let err = f
            .payments()
            .apply_callback(PaymentCallback::new(
                "tx-600",
                "settlement",
                details.order.total_amount,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflicting_payment_state");
    }
}

mod events {
    use super::*;

    /// Records, at publish time, whether the order the event names is
    /// visible in the store.
    struct CommitCheckingPublisher {
        store: InMemoryStore,
        seen: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl EventPublisher for CommitCheckingPublisher {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            let message: serde_json::Value = serde_json::from_slice(&payload)
                .map_err(|e| PublishError(e.to_string()))?;
            let order_id: OrderId = message["data"]["order_id"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| PublishError("missing order_id".to_string()))?;

            let committed = self.store.get_order(order_id).await.unwrap().is_some();
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((topic.to_string(), committed));
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_are_published_after_commit() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(CommitCheckingPublisher {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let ctx = Context::new(Arc::new(store.clone()), CommerceSettings::default())
            .with_publisher(publisher.clone());

        let product = Product::new("Widget", Money::from_cents(1000), 2);
        store.upsert_product(product.clone()).await.unwrap();
        let user = UserId::new();
        CartService::new(ctx.clone())
            .add_to_cart(user, product.id, 1)
            .await
            .unwrap();
        let details = CheckoutService::new(ctx.clone())
            .checkout(CheckoutRequest::new(user, address()))
            .await
            .unwrap();
        OrderService::new(ctx.clone())
            .cancel_order(details.order.id, user, None)
            .await
            .unwrap();

        let seen = publisher
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        assert_eq!(
            seen,
            vec![
                (topics::ORDER_CREATED.to_string(), true),
                (topics::ORDER_STATUS_CHANGED.to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn failed_operations_publish_nothing() {
        let f = Fixture::new();
        let product = f.product("Widget", 1000, 1).await;
        let user = UserId::new();
        f.cart().add_to_cart(user, product.id, 2).await.unwrap();

        f.checkout(user).await.unwrap_err();
        f.orders()
            .transition_order(OrderId::new(), OrderStatus::Shipped, "x", None)
            .await
            .unwrap_err();

        assert_eq!(f.publisher.count(), 0);
    }

    #[tokio::test]
    async fn publish_failures_do_not_undo_writes() {
        let f = Fixture::new();
        let user = UserId::new();
        let details = f.order_with_reference(user, "tx-700").await;
        f.publisher.set_fail_on_publish(true);

        let outcome = f
            .payments()
            .apply_callback(PaymentCallback::new(
                "tx-700",
                "settlement",
                details.order.total_amount,
            ))
            .await
            .unwrap();

        assert_eq!(outcome.payment().status, PaymentStatus::Paid);
        let order = f.store.get_order(details.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }
}

mod atomicity {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::DateTime;
    use common::{CartLineId, PaymentId};
    use store::{
        CartLine, NewOrderAggregate, Order, OrderItem, OrderQuery, Page, PageRequest, Payment,
        StatusHistoryEntry, StoreError, UnitOfWork,
    };

    use super::*;

    type StoreResult<T> = Result<T, StoreError>;

    /// Store whose units of work refuse the Nth stock decrement, after the
    /// earlier ones already went through.
    #[derive(Clone)]
    struct DecrementFailingStore {
        inner: InMemoryStore,
        fail_on: usize,
        decrements: Arc<AtomicUsize>,
    }

    struct DecrementFailingUnitOfWork {
        inner: Box<dyn UnitOfWork>,
        fail_on: usize,
        decrements: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Catalog for DecrementFailingStore {
        async fn get_product(&self, product_id: ProductId) -> StoreResult<Option<Product>> {
            self.inner.get_product(product_id).await
        }

        async fn upsert_product(&self, product: Product) -> StoreResult<()> {
            self.inner.upsert_product(product).await
        }

        async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> StoreResult<i64> {
            Catalog::adjust_stock(&self.inner, product_id, delta).await
        }
    }

    #[async_trait]
    impl Store for DecrementFailingStore {
        async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
            Ok(Box::new(DecrementFailingUnitOfWork {
                inner: self.inner.begin().await?,
                fail_on: self.fail_on,
                decrements: self.decrements.clone(),
            }))
        }

        async fn add_to_cart(
            &self,
            user_id: UserId,
            product_id: ProductId,
            quantity: u32,
        ) -> StoreResult<CartLine> {
            self.inner.add_to_cart(user_id, product_id, quantity).await
        }

        async fn get_cart(&self, user_id: UserId) -> StoreResult<Vec<CartLine>> {
            self.inner.get_cart(user_id).await
        }

        async fn update_cart_line(
            &self,
            line_id: CartLineId,
            user_id: UserId,
            quantity: u32,
        ) -> StoreResult<Option<CartLine>> {
            self.inner.update_cart_line(line_id, user_id, quantity).await
        }

        async fn remove_cart_line(&self, line_id: CartLineId, user_id: UserId) -> StoreResult<()> {
            self.inner.remove_cart_line(line_id, user_id).await
        }

        async fn clear_cart(&self, user_id: UserId) -> StoreResult<()> {
            self.inner.clear_cart(user_id).await
        }

        async fn get_order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
            self.inner.get_order(order_id).await
        }

        async fn get_order_items(&self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
            self.inner.get_order_items(order_id).await
        }

        async fn get_status_history(
            &self,
            order_id: OrderId,
        ) -> StoreResult<Vec<StatusHistoryEntry>> {
            self.inner.get_status_history(order_id).await
        }

        async fn list_orders(&self, query: &OrderQuery) -> StoreResult<Page<Order>> {
            self.inner.list_orders(query).await
        }

        async fn get_payment(&self, payment_id: PaymentId) -> StoreResult<Option<Payment>> {
            self.inner.get_payment(payment_id).await
        }

        async fn get_payment_for_order(&self, order_id: OrderId) -> StoreResult<Option<Payment>> {
            self.inner.get_payment_for_order(order_id).await
        }

        async fn list_user_payments(
            &self,
            user_id: UserId,
            page: PageRequest,
        ) -> StoreResult<Page<Payment>> {
            self.inner.list_user_payments(user_id, page).await
        }

        async fn find_overdue_orders(&self, now: DateTime<Utc>) -> StoreResult<Vec<OrderId>> {
            self.inner.find_overdue_orders(now).await
        }
    }

    #[async_trait]
    impl UnitOfWork for DecrementFailingUnitOfWork {
        async fn lock_order(&mut self, order_id: OrderId) -> StoreResult<Option<Order>> {
            self.inner.lock_order(order_id).await
        }

        async fn lock_payment_by_reference(
            &mut self,
            external_reference: &str,
        ) -> StoreResult<Option<(Order, Payment)>> {
            self.inner.lock_payment_by_reference(external_reference).await
        }

        async fn payment_for_order(&mut self, order_id: OrderId) -> StoreResult<Option<Payment>> {
            self.inner.payment_for_order(order_id).await
        }

        async fn cart_lines(
            &mut self,
            user_id: UserId,
            line_ids: Option<&[CartLineId]>,
        ) -> StoreResult<Vec<CartLine>> {
            self.inner.cart_lines(user_id, line_ids).await
        }

        async fn get_product(&mut self, product_id: ProductId) -> StoreResult<Option<Product>> {
            self.inner.get_product(product_id).await
        }

        async fn order_items(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
            self.inner.order_items(order_id).await
        }

        async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> StoreResult<i64> {
            if delta < 0 {
                let attempt = self.decrements.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == self.fail_on {
                    return Err(StoreError::InsufficientStock {
                        product_id,
                        requested: -delta,
                        available: 0,
                    });
                }
            }
            self.inner.adjust_stock(product_id, delta).await
        }

        async fn insert_order_aggregate(&mut self, aggregate: &NewOrderAggregate) -> StoreResult<()> {
            self.inner.insert_order_aggregate(aggregate).await
        }

        async fn update_order_status(
            &mut self,
            order_id: OrderId,
            status: OrderStatus,
            at: DateTime<Utc>,
        ) -> StoreResult<()> {
            self.inner.update_order_status(order_id, status, at).await
        }

        async fn append_history(&mut self, entry: &StatusHistoryEntry) -> StoreResult<()> {
            self.inner.append_history(entry).await
        }

        async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
            self.inner.update_payment(payment).await
        }

        async fn commit(&mut self) -> StoreResult<()> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn stock_decrement_failing_midway_rolls_back_earlier_decrements() {
        let store = InMemoryStore::new();
        let decrements = Arc::new(AtomicUsize::new(0));
        let failing = DecrementFailingStore {
            inner: store.clone(),
            fail_on: 2,
            decrements: decrements.clone(),
        };
        let publisher = InMemoryPublisher::new();
        let ctx = Context::new(Arc::new(failing), CommerceSettings::default())
            .with_cache(Arc::new(InMemoryCache::new()))
            .with_publisher(Arc::new(publisher.clone()));

        let a = Product::new("A", Money::from_cents(1000), 5);
        let b = Product::new("B", Money::from_cents(500), 5);
        store.upsert_product(a.clone()).await.unwrap();
        store.upsert_product(b.clone()).await.unwrap();
        let user = UserId::new();
        let cart = CartService::new(ctx.clone());
        cart.add_to_cart(user, a.id, 2).await.unwrap();
        cart.add_to_cart(user, b.id, 1).await.unwrap();

        let err = CheckoutService::new(ctx.clone())
            .checkout(CheckoutRequest::new(user, address()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "insufficient_stock");
        assert_eq!(decrements.load(Ordering::SeqCst), 2);
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.payment_count().await, 0);
        assert_eq!(store.history_count().await, 0);
        assert_eq!(store.get_cart(user).await.unwrap().len(), 2);
        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(store.get_product(b.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(publisher.count(), 0);
    }
}
