use chrono::Utc;
use common::{OrderId, OrderStatus, PaymentId, PaymentStatus, UserId};
use store::{Page, PageRequest, Payment};

use crate::context::Context;
use crate::error::{DomainError, Result};
use crate::events::{DomainEvent, PaymentFailedData, PaymentSucceededData};
use crate::order::transition::{announce_transition, apply_transition};
use crate::services::cache::keys;
use crate::viewer::Viewer;

use super::{CallbackOutcome, GatewayStatus, PaymentCallback};

const PAYMENT_RECEIVED_NOTE: &str = "Payment received";

/// Applies gateway callbacks to payments and their orders.
///
/// Callbacks may arrive late, twice, or out of order. Every callback runs
/// in one unit of work holding the order lock, so two deliveries for the
/// same payment are applied one after the other.
#[derive(Clone)]
pub struct PaymentReconciler {
    ctx: Context,
}

impl PaymentReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Applies a gateway notification.
    #[tracing::instrument(skip(self, callback), fields(reference = %callback.external_reference, status = %callback.status))]
    pub async fn apply_callback(&self, callback: PaymentCallback) -> Result<CallbackOutcome> {
        let result = self.reconcile(callback).await;

        let outcome = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(e) => e.kind(),
        };
        metrics::counter!("payment_callbacks_total", "outcome" => outcome).increment(1);

        result
    }

    async fn reconcile(&self, callback: PaymentCallback) -> Result<CallbackOutcome> {
        let gateway_status: GatewayStatus = callback.status.parse()?;
        let incoming = gateway_status.payment_status();

        let mut uow = self.ctx.store.begin().await?;
        let (mut order, mut payment) = uow
            .lock_payment_by_reference(&callback.external_reference)
            .await?
            .ok_or_else(|| DomainError::UnknownPayment(callback.external_reference.clone()))?;

        if gateway_status == GatewayStatus::Pending {
            return Ok(CallbackOutcome::Ignored(payment));
        }

        if payment.status.is_terminal() {
            if payment.status == incoming {
                tracing::info!(payment_id = %payment.id, "duplicate callback ignored");
                return Ok(CallbackOutcome::AlreadyApplied(payment));
            }
            return Err(DomainError::ConflictingPaymentState {
                current: payment.status,
                incoming,
            });
        }

        if callback.amount != payment.amount {
            return Err(DomainError::AmountMismatch {
                expected: payment.amount,
                received: callback.amount,
            });
        }

        let now = Utc::now();
        let mut events = Vec::new();
        let mut transition = None;

        match gateway_status {
            GatewayStatus::Paid => {
                let confirm = match order.status {
                    OrderStatus::Pending => true,
                    OrderStatus::Confirmed => false,
                    other => {
                        return Err(DomainError::InvalidTransition {
                            from: other,
                            to: OrderStatus::Confirmed,
                        });
                    }
                };

                payment.status = PaymentStatus::Paid;
                payment.paid_at = Some(now);
                payment.updated_at = now;
                uow.update_payment(&payment).await?;
                order.payment_status = PaymentStatus::Paid;

                events.push(DomainEvent::PaymentSucceeded(PaymentSucceededData {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    amount: payment.amount,
                }));

                if confirm {
                    transition = Some(
                        apply_transition(
                            uow.as_mut(),
                            order,
                            OrderStatus::Confirmed,
                            PAYMENT_RECEIVED_NOTE,
                            None,
                        )
                        .await?,
                    );
                }
            }
            GatewayStatus::Failed => {
                payment.status = PaymentStatus::Failed;
                payment.updated_at = now;
                uow.update_payment(&payment).await?;

                events.push(DomainEvent::PaymentFailed(PaymentFailedData {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    amount: payment.amount,
                    reason: format!("gateway reported {}", callback.status),
                }));
            }
            GatewayStatus::Refunded => {
                payment.status = PaymentStatus::Refunded;
                payment.updated_at = now;
                uow.update_payment(&payment).await?;
            }
            GatewayStatus::Pending => return Ok(CallbackOutcome::Ignored(payment)),
        }

        uow.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            status = %payment.status,
            "payment reconciled"
        );

        self.ctx.invalidate(&[keys::order(payment.order_id)]).await;
        self.ctx.emit(events).await;
        if let Some(transition) = transition {
            announce_transition(&self.ctx, transition).await;
        }

        Ok(CallbackOutcome::Applied(payment))
    }

    /// Records the gateway's transaction id and redirect URL on an order's
    /// pending payment.
    ///
    /// Attaching the same reference again is a no-op.
    #[tracing::instrument(skip(self, payment_url))]
    pub async fn attach_gateway_reference(
        &self,
        order_id: OrderId,
        user_id: UserId,
        external_reference: &str,
        payment_url: Option<String>,
    ) -> Result<Payment> {
        let external_reference = external_reference.trim();
        if external_reference.is_empty() {
            return Err(DomainError::Validation(
                "external reference is required".to_string(),
            ));
        }

        let mut uow = self.ctx.store.begin().await?;
        uow.lock_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let mut payment = uow
            .payment_for_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("payment", order_id))?;

        match payment.external_reference.as_deref() {
            Some(existing) if existing == external_reference => return Ok(payment),
            Some(existing) => {
                return Err(DomainError::Conflict(format!(
                    "payment already has reference {existing}"
                )));
            }
            None => {}
        }
        if payment.status != PaymentStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "payment is already {}",
                payment.status
            )));
        }

        payment.external_reference = Some(external_reference.to_string());
        payment.payment_url = payment_url;
        payment.updated_at = Utc::now();
        uow.update_payment(&payment).await?;
        uow.commit().await?;

        self.ctx.invalidate(&[keys::order(order_id)]).await;
        tracing::info!(payment_id = %payment.id, "gateway reference attached");
        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: PaymentId, viewer: Viewer) -> Result<Payment> {
        self.ctx
            .store
            .get_payment(payment_id)
            .await?
            .filter(|p| viewer.can_see(p.user_id))
            .ok_or_else(|| DomainError::not_found("payment", payment_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment_for_order(&self, order_id: OrderId, viewer: Viewer) -> Result<Payment> {
        self.ctx
            .store
            .get_payment_for_order(order_id)
            .await?
            .filter(|p| viewer.can_see(p.user_id))
            .ok_or_else(|| DomainError::not_found("payment", order_id))
    }

    /// Lists a user's payments, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_user_payments(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        Ok(self.ctx.store.list_user_payments(user_id, page).await?)
    }
}
