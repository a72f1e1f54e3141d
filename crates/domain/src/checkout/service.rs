use std::time::Instant;

use chrono::Utc;
use common::{Money, OrderId, OrderItemId, OrderStatus, PaymentId, PaymentStatus};
use store::{NewOrderAggregate, Order, OrderItem, Payment, PaymentLink, StatusHistoryEntry};

use crate::context::Context;
use crate::error::{DomainError, Result};
use crate::events::{DomainEvent, OrderCreatedData};
use crate::order::OrderDetails;
use crate::services::cache::keys;

use super::{CheckoutRequest, generate_order_number};

const CREATION_NOTE: &str = "Order created";

/// Service that turns cart lines into an order and its payment.
#[derive(Clone)]
pub struct CheckoutService {
    ctx: Context,
}

impl CheckoutService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Checks out the selected cart lines.
    ///
    /// Stock, order, items, first history row, payment and cart deletion
    /// commit together or not at all. Prices come from the catalog at
    /// checkout time, not from when the line was added.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<OrderDetails> {
        let started = Instant::now();
        let result = self.place_order(request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!("checkouts_total", "outcome" => outcome).increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    async fn place_order(&self, request: CheckoutRequest) -> Result<OrderDetails> {
        request.validate()?;
        let user_id = request.user_id;

        let mut uow = self.ctx.store.begin().await?;

        let mut lines = uow
            .cart_lines(user_id, request.line_ids.as_deref())
            .await?;
        if lines.is_empty() {
            return Err(DomainError::EmptyCart);
        }
        let missing = request
            .line_ids
            .iter()
            .flatten()
            .find(|id| !lines.iter().any(|line| line.id == **id));
        if let Some(id) = missing {
            return Err(DomainError::not_found("cart line", id));
        }
        // Stock rows are always touched in product order.
        lines.sort_by_key(|line| line.product_id);

        let now = Utc::now();
        let order_id = OrderId::new();

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = uow
                .get_product(line.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or(DomainError::ProductUnavailable(line.product_id))?;

            let requested = i64::from(line.quantity);
            if product.stock < requested {
                return Err(DomainError::InsufficientStock {
                    product_id: product.id,
                    requested,
                    available: product.stock,
                });
            }

            items.push(OrderItem {
                id: OrderItemId::new(),
                order_id,
                product_id: product.id,
                quantity: line.quantity,
                unit_price: product.price,
                line_subtotal: product
                    .price
                    .checked_multiply(line.quantity)
                    .ok_or_else(|| amount_too_large("line subtotal"))?,
                created_at: now,
            });
        }

        let subtotal = Money::checked_sum(items.iter().map(|item| item.line_subtotal))
            .ok_or_else(|| amount_too_large("subtotal"))?;
        let shipping_cost = self
            .ctx
            .shipping
            .shipping_cost(user_id, &request.shipping, &items)
            .await?;
        let total_amount = subtotal
            .checked_add(shipping_cost)
            .ok_or_else(|| amount_too_large("total"))?;

        for item in &items {
            uow.adjust_stock(item.product_id, -i64::from(item.quantity))
                .await?;
        }

        let payment_id = PaymentId::new();
        let order = Order {
            id: order_id,
            user_id,
            order_number: generate_order_number(now),
            status: OrderStatus::Pending,
            subtotal,
            shipping_cost,
            total_amount,
            shipping: request.shipping,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            payment: PaymentLink::Linked(payment_id),
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let payment = Payment {
            id: payment_id,
            order_id,
            user_id,
            amount: total_amount,
            method: request
                .payment_method
                .unwrap_or_else(|| self.ctx.settings.default_payment_method.clone()),
            status: PaymentStatus::Pending,
            external_reference: None,
            payment_url: None,
            expires_at: now + self.ctx.settings.payment_ttl,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let aggregate = NewOrderAggregate {
            history: StatusHistoryEntry::new(
                order_id,
                None,
                OrderStatus::Pending,
                CREATION_NOTE,
                Some(user_id),
            ),
            consumed_cart_lines: lines.iter().map(|line| line.id).collect(),
            order,
            items,
            payment,
        };
        uow.insert_order_aggregate(&aggregate).await?;
        uow.commit().await?;

        let NewOrderAggregate {
            order,
            items,
            payment,
            ..
        } = aggregate;

        let mut stale: Vec<String> = items.iter().map(|i| keys::product(i.product_id)).collect();
        stale.push(keys::cart(user_id));
        self.ctx.invalidate(&stale).await;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            items = items.len(),
            "order placed"
        );

        self.ctx
            .emit(vec![DomainEvent::OrderCreated(OrderCreatedData {
                order_id: order.id,
                order_number: order.order_number.clone(),
                user_id,
                total: order.total_amount,
                status: order.status,
                created_at: order.created_at,
            })])
            .await;

        Ok(OrderDetails {
            order,
            items,
            payment: Some(payment),
        })
    }
}

fn amount_too_large(what: &str) -> DomainError {
    DomainError::Validation(format!("order {what} exceeds the largest supported amount"))
}
