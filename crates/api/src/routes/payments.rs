//! Payment endpoints and the gateway webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::Money;
use domain::{CallbackOutcome, PaymentCallback, Viewer};
use serde::Deserialize;
use store::{Page, Payment};

use super::{AppState, PageParams};
use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};

#[derive(Deserialize)]
pub struct AttachReferenceBody {
    pub external_reference: String,
    pub payment_url: Option<String>,
}

/// Gateway notification body.
#[derive(Deserialize)]
pub struct CallbackBody {
    pub external_reference: String,
    pub status: String,
    pub amount_cents: i64,
    /// Checked by the gateway proxy in front of this service.
    #[serde(default)]
    pub signature: Option<String>,
}

/// GET /payments: the caller's payments, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Payment>>, ApiError> {
    let page = state
        .payments
        .list_user_payments(user_id, params.request())
        .await?;
    Ok(Json(page))
}

/// GET /payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .get_payment(parse_id(&id)?, Viewer::Customer(user_id))
        .await?;
    Ok(Json(payment))
}

/// POST /payments/{order_id}/reference: record the gateway transaction.
#[tracing::instrument(skip(state, body))]
pub async fn attach_reference(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(order_id): Path<String>,
    Json(body): Json<AttachReferenceBody>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .attach_gateway_reference(
            parse_id(&order_id)?,
            user_id,
            &body.external_reference,
            body.payment_url,
        )
        .await?;
    Ok(Json(payment))
}

/// POST /payments/callback: apply a gateway notification.
///
/// Duplicates and non-terminal notifications answer 200 with an
/// `already_applied` or `ignored` outcome so the gateway stops retrying.
#[tracing::instrument(skip(state, body), fields(reference = %body.external_reference))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CallbackBody>,
) -> Result<Json<CallbackOutcome>, ApiError> {
    let outcome = state
        .payments
        .apply_callback(PaymentCallback::new(
            body.external_reference,
            body.status,
            Money::from_cents(body.amount_cents),
        ))
        .await?;
    Ok(Json(outcome))
}
