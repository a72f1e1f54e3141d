//! Cart endpoints. All act on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::CartView;
use serde::Deserialize;
use store::CartLine;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

/// GET /cart: the cart priced at current catalog prices.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.cart.get_cart(user_id).await?))
}

/// POST /cart/items: add a product, merging with an existing line.
#[tracing::instrument(skip(state, req))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLine>), ApiError> {
    let line = state
        .cart
        .add_to_cart(user_id, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// PUT /cart/items/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartLine>, ApiError> {
    let line = state
        .cart
        .update_line(parse_id(&id)?, user_id, req.quantity)
        .await?;
    Ok(Json(line))
}

/// DELETE /cart/items/{id}
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.cart.remove_line(parse_id(&id)?, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<StatusCode, ApiError> {
    state.cart.clear_cart(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
