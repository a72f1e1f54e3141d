use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, PaymentStatus, UserId};
use store::{Order, OrderQuery, Page, PageRequest};

use crate::context::Context;
use crate::error::{DomainError, Result};
use crate::services::cache::keys;
use crate::viewer::Viewer;

use super::transition::{Transition, announce_transition, apply_transition};
use super::{ExpiryReport, OrderDetails, OrderStatusView};

const EXPIRY_NOTE: &str = "Payment expired";
const DEFAULT_CANCEL_NOTE: &str = "Cancelled by customer";

/// Service for moving orders through their lifecycle and reading them back.
#[derive(Clone)]
pub struct OrderService {
    ctx: Context,
}

impl OrderService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Moves an order to `to`, validating against the status seen under the
    /// order lock.
    #[tracing::instrument(skip(self))]
    pub async fn transition_order(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        note: &str,
        actor_id: Option<UserId>,
    ) -> Result<Order> {
        let mut uow = self.ctx.store.begin().await?;
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        let transition = apply_transition(uow.as_mut(), order, to, note, actor_id).await?;
        uow.commit().await?;

        Ok(self.announce(transition).await)
    }

    /// Cancels one of the user's own orders.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: Option<&str>,
    ) -> Result<Order> {
        let mut uow = self.ctx.store.begin().await?;
        let order = uow
            .lock_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        let note = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_CANCEL_NOTE);
        let transition =
            apply_transition(uow.as_mut(), order, OrderStatus::Cancelled, note, Some(user_id))
                .await?;
        uow.commit().await?;

        Ok(self.announce(transition).await)
    }

    /// Returns an order with its items and payment.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, viewer: Viewer) -> Result<OrderDetails> {
        let details = self.load_details(order_id).await?;
        if !viewer.can_see(details.order.user_id) {
            return Err(DomainError::not_found("order", order_id));
        }
        Ok(details)
    }

    /// Lists a user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_user_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        let query = OrderQuery::for_user(user_id).page(page);
        Ok(self.ctx.store.list_orders(&query).await?)
    }

    /// Lists every order, newest first, optionally filtered by status.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<Page<Order>> {
        let mut query = OrderQuery::new().page(page);
        if let Some(status) = status {
            query = query.status(status);
        }
        Ok(self.ctx.store.list_orders(&query).await?)
    }

    /// Returns the order's status and its full history.
    #[tracing::instrument(skip(self))]
    pub async fn get_status_history(
        &self,
        order_id: OrderId,
        viewer: Viewer,
    ) -> Result<OrderStatusView> {
        let order = self
            .ctx
            .store
            .get_order(order_id)
            .await?
            .filter(|o| viewer.can_see(o.user_id))
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let history = self.ctx.store.get_status_history(order_id).await?;

        Ok(OrderStatusView {
            order_id,
            order_number: order.order_number,
            status: order.status,
            history,
        })
    }

    /// Cancels every pending order whose pending payment expired before `now`.
    ///
    /// Each order is re-checked under its lock, so an order paid after the
    /// scan is left alone. Failures are logged and counted; the next sweep
    /// picks those orders up again.
    #[tracing::instrument(skip(self))]
    pub async fn expire_overdue_orders(&self, now: DateTime<Utc>) -> Result<ExpiryReport> {
        let candidates = self.ctx.store.find_overdue_orders(now).await?;
        let mut report = ExpiryReport::default();

        for order_id in candidates {
            match self.expire_order(order_id, now).await {
                Ok(true) => report.expired.push(order_id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "failed to expire order");
                    report.failed += 1;
                }
            }
        }

        if !report.expired.is_empty() {
            metrics::counter!("orders_expired_total").increment(report.expired.len() as u64);
            tracing::info!(count = report.expired.len(), "expired overdue orders");
        }
        Ok(report)
    }

    async fn expire_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<bool> {
        let mut uow = self.ctx.store.begin().await?;
        let Some(order) = uow.lock_order(order_id).await? else {
            return Ok(false);
        };
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }

        let overdue = uow
            .payment_for_order(order_id)
            .await?
            .is_some_and(|p| p.status == PaymentStatus::Pending && p.expires_at < now);
        if !overdue {
            return Ok(false);
        }

        let transition =
            apply_transition(uow.as_mut(), order, OrderStatus::Cancelled, EXPIRY_NOTE, None)
                .await?;
        uow.commit().await?;
        self.announce(transition).await;
        Ok(true)
    }

    async fn load_details(&self, order_id: OrderId) -> Result<OrderDetails> {
        let key = keys::order(order_id);
        if let Some(details) = self.ctx.cached::<OrderDetails>(&key).await {
            return Ok(details);
        }

        let details = self
            .fetch_details(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        self.ctx
            .fill_cache_checked(&key, &details, || self.fetch_details(order_id))
            .await;
        Ok(details)
    }

    async fn fetch_details(&self, order_id: OrderId) -> Result<Option<OrderDetails>> {
        let Some(order) = self.ctx.store.get_order(order_id).await? else {
            return Ok(None);
        };
        let items = self.ctx.store.get_order_items(order_id).await?;
        let payment = self.ctx.store.get_payment_for_order(order_id).await?;

        Ok(Some(OrderDetails {
            order,
            items,
            payment,
        }))
    }

    /// Post-commit side effects of a transition.
    async fn announce(&self, transition: Transition) -> Order {
        announce_transition(&self.ctx, transition).await
    }
}
