//! Converting a cart into an order.

mod order_number;
mod service;

pub use order_number::generate_order_number;
pub use service::CheckoutService;

use common::{CartLineId, UserId};
use store::ShippingAddress;

use crate::error::{DomainError, Result};

/// Input to [`CheckoutService::checkout`].
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub shipping: ShippingAddress,
    /// Restricts checkout to these lines. `None` takes the whole cart.
    pub line_ids: Option<Vec<CartLineId>>,
    /// Defaults to the configured payment method.
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    /// Creates a request for the whole cart.
    pub fn new(user_id: UserId, shipping: ShippingAddress) -> Self {
        Self {
            user_id,
            shipping,
            line_ids: None,
            payment_method: None,
            notes: None,
        }
    }

    /// Restricts checkout to the given lines.
    pub fn with_lines(mut self, line_ids: Vec<CartLineId>) -> Self {
        self.line_ids = Some(line_ids);
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn validate(&self) -> Result<()> {
        let address = &self.shipping;
        let fields = [
            ("address", &address.address),
            ("city", &address.city),
            ("province", &address.province),
            ("postal_code", &address.postal_code),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(DomainError::Validation(format!(
                "shipping {name} is required"
            )));
        }
        if self
            .payment_method
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            return Err(DomainError::Validation(
                "payment method must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}
