//! Shopping cart operations.

mod service;

pub use service::CartService;

use common::{Money, UserId};
use serde::Serialize;
use store::{CartLine, MAX_LINE_QUANTITY, Product};

use crate::error::{DomainError, Result};

/// Catalog fields of a product as seen when the cart is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub is_active: bool,
}

impl From<Product> for ProductSnapshot {
    fn from(product: Product) -> Self {
        Self {
            name: product.name,
            price: product.price,
            stock: product.stock,
            is_active: product.is_active,
        }
    }
}

/// A cart line joined with its live product.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,

    /// `None` if the product no longer exists.
    pub product: Option<ProductSnapshot>,
}

impl CartLineView {
    /// Returns true if checkout would currently accept this line.
    pub fn is_available(&self) -> bool {
        self.product.as_ref().is_some_and(|p| {
            p.is_active && p.stock >= i64::from(self.line.quantity)
        })
    }

    fn line_total(&self) -> Option<Money> {
        self.product
            .as_ref()
            .map(|p| p.price.saturating_multiply(self.line.quantity))
    }
}

/// A user's cart priced at current catalog prices.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub user_id: UserId,
    pub lines: Vec<CartLineView>,
    pub total_quantity: u64,
    /// Sum over lines whose product still exists, clamped at the largest
    /// representable amount. Checkout reprices anyway.
    pub estimated_subtotal: Money,
}

impl CartView {
    fn new(user_id: UserId, lines: Vec<CartLineView>) -> Self {
        let total_quantity: u64 = lines.iter().map(|l| u64::from(l.line.quantity)).sum();
        let estimated_subtotal = lines
            .iter()
            .filter_map(CartLineView::line_total)
            .fold(Money::zero(), |acc, total| acc.saturating_add(total));
        Self {
            user_id,
            lines,
            total_quantity,
            estimated_subtotal,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Converts a requested quantity, rejecting zero, negatives and anything
/// above the largest storable line quantity.
pub(crate) fn validate_quantity(quantity: i64) -> Result<u32> {
    if quantity <= 0 {
        return Err(DomainError::Validation(format!(
            "quantity must be greater than 0, got {quantity}"
        )));
    }
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q <= MAX_LINE_QUANTITY)
        .ok_or_else(|| DomainError::Validation(format!("quantity {quantity} is too large")))
}
