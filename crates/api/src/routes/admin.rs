//! Operator endpoints: order status changes, order listing and the catalog.
//!
//! Role checks happen at the gateway in front of `/admin`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, OrderStatus};
use domain::ProductInput;
use serde::{Deserialize, Serialize};
use store::{Order, Page, Product};

use super::{AppState, PageParams};
use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct TransitionBody {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct ProductBody {
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<ProductBody> for ProductInput {
    fn from(body: ProductBody) -> Self {
        ProductInput {
            name: body.name,
            price: Money::from_cents(body.price_cents),
            stock: body.stock,
            is_active: body.is_active,
        }
    }
}

#[derive(Deserialize)]
pub struct StockBody {
    pub delta: i64,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub stock: i64,
}

fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown order status: {raw}")))
}

/// GET /admin/orders: every order, optionally filtered by `status`.
#[tracing::instrument(skip(state))]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Page<Order>>, ApiError> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let page = PageParams {
        page: params.page,
        limit: params.limit,
    }
    .request();

    Ok(Json(state.orders.list_orders(page, status).await?))
}

/// PUT /admin/orders/{id}/status
#[tracing::instrument(skip(state, body))]
pub async fn transition(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<Order>, ApiError> {
    let to = parse_status(&body.status)?;
    let note = body
        .note
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Status changed to {to}"));

    let order = state
        .orders
        .transition_order(parse_id(&id)?, to, &note, Some(actor_id))
        .await?;
    Ok(Json(order))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.catalog.get_product(parse_id(&id)?).await?))
}

/// POST /admin/products
#[tracing::instrument(skip(state, body))]
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProductBody>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.catalog.upsert_product(None, body.into()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /admin/products/{id}
#[tracing::instrument(skip(state, body))]
pub async fn replace_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ProductBody>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .catalog
        .upsert_product(Some(parse_id(&id)?), body.into())
        .await?;
    Ok(Json(product))
}

/// POST /admin/products/{id}/stock: restock (`delta > 0`) or write off units.
#[tracing::instrument(skip(state, body))]
pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StockBody>,
) -> Result<Json<StockResponse>, ApiError> {
    let product_id = parse_id(&id)?;
    let stock = state.catalog.adjust_stock(product_id, body.delta).await?;
    Ok(Json(StockResponse {
        product_id: id,
        stock,
    }))
}
