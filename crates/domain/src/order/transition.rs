//! The single write path for order status changes.

use chrono::Utc;
use common::{OrderStatus, PaymentStatus, ProductId, UserId};
use store::{Order, StatusHistoryEntry, UnitOfWork};

use crate::context::Context;
use crate::error::{DomainError, Result};
use crate::events::{DomainEvent, StatusChangedData};
use crate::services::cache::keys;

/// What a committed transition needs to announce.
#[derive(Debug)]
pub(crate) struct Transition {
    pub order: Order,
    pub event: DomainEvent,
    /// Products whose stock changed.
    pub restocked: Vec<ProductId>,
}

/// Moves a locked order to `to` inside the caller's unit of work.
///
/// `order` must have been read through [`UnitOfWork::lock_order`] (or
/// another locking read) in the same unit of work. Cancellation puts every
/// item back in stock and cancels a still-pending payment.
pub(crate) async fn apply_transition(
    uow: &mut dyn UnitOfWork,
    mut order: Order,
    to: OrderStatus,
    note: &str,
    actor_id: Option<UserId>,
) -> Result<Transition> {
    let from = order.status;
    if !from.can_transition_to(to) {
        return Err(DomainError::InvalidTransition { from, to });
    }

    let now = Utc::now();
    let mut restocked = Vec::new();

    if to == OrderStatus::Cancelled {
        for item in uow.order_items(order.id).await? {
            uow.adjust_stock(item.product_id, i64::from(item.quantity))
                .await?;
            restocked.push(item.product_id);
        }

        if let Some(mut payment) = uow.payment_for_order(order.id).await?
            && payment.status == PaymentStatus::Pending
        {
            payment.status = PaymentStatus::Cancelled;
            payment.updated_at = now;
            uow.update_payment(&payment).await?;
            order.payment_status = PaymentStatus::Cancelled;
        }
    }

    uow.update_order_status(order.id, to, now).await?;
    uow.append_history(&StatusHistoryEntry::new(
        order.id,
        Some(from),
        to,
        note,
        actor_id,
    ))
    .await?;

    order.status = to;
    order.updated_at = now;

    let event = DomainEvent::StatusChanged(StatusChangedData {
        order_id: order.id,
        from,
        to,
        note: note.to_string(),
        actor_id,
    });

    Ok(Transition {
        order,
        event,
        restocked,
    })
}

/// Invalidates caches, records metrics and publishes the status change.
pub(crate) async fn announce_transition(ctx: &Context, transition: Transition) -> Order {
    let Transition {
        order,
        event,
        restocked,
    } = transition;

    let mut stale = vec![keys::order(order.id)];
    stale.extend(restocked.into_iter().map(keys::product));
    ctx.invalidate(&stale).await;

    metrics::counter!("order_transitions_total", "to" => order.status.as_str()).increment(1);
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        status = %order.status,
        "order status changed"
    );

    ctx.emit(vec![event]).await;
    order
}
