//! Checkout and customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::CartLineId;
use domain::{CheckoutRequest, OrderDetails, OrderStatusView, Viewer};
use serde::Deserialize;
use store::{Order, Page, ShippingAddress};

use super::{AppState, PageParams};
use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    /// Lines to check out. Omit to take the whole cart.
    pub cart_item_ids: Option<Vec<CartLineId>>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /checkout: turn cart lines into an order awaiting payment.
#[tracing::instrument(skip(state, body))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError> {
    let shipping = ShippingAddress {
        address: body.address,
        city: body.city,
        province: body.province,
        postal_code: body.postal_code,
    };

    let mut request = CheckoutRequest::new(user_id, shipping);
    if let Some(line_ids) = body.cart_item_ids {
        request = request.with_lines(line_ids);
    }
    if let Some(method) = body.payment_method {
        request = request.with_payment_method(method);
    }
    if let Some(notes) = body.notes {
        request = request.with_notes(notes);
    }

    let details = state.checkout.checkout(request).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Order>>, ApiError> {
    let page = state
        .orders
        .list_user_orders(user_id, params.request())
        .await?;
    Ok(Json(page))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let details = state
        .orders
        .get_order(parse_id(&id)?, Viewer::Customer(user_id))
        .await?;
    Ok(Json(details))
}

/// GET /orders/{id}/status: current status and full history.
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusView>, ApiError> {
    let view = state
        .orders
        .get_status_history(parse_id(&id)?, Viewer::Customer(user_id))
        .await?;
    Ok(Json(view))
}

/// PUT /orders/{id}/cancel
#[tracing::instrument(skip(state, body))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .orders
        .cancel_order(parse_id(&id)?, user_id, body.reason.as_deref())
        .await?;
    Ok(Json(order))
}
