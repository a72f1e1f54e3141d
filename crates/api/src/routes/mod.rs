//! HTTP handlers, grouped by resource.

pub mod admin;
pub mod cart;
pub mod ops;
pub mod orders;
pub mod payments;

use domain::{
    CartService, CatalogService, CheckoutService, Context, OrderService, PaymentReconciler,
};
use serde::Deserialize;
use store::PageRequest;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub cart: CartService,
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentReconciler,
}

impl AppState {
    pub fn new(ctx: Context) -> Self {
        Self {
            cart: CartService::new(ctx.clone()),
            catalog: CatalogService::new(ctx.clone()),
            checkout: CheckoutService::new(ctx.clone()),
            orders: OrderService::new(ctx.clone()),
            payments: PaymentReconciler::new(ctx),
        }
    }
}

/// `?page=&limit=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
        )
    }
}
