//! Domain error types.

use common::{Money, OrderStatus, PaymentStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist or is not visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Checkout selected no cart lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A product is missing from the catalog or inactive.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// A line asks for more units than are in stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// The order state machine has no such edge.
    #[error("Invalid transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A callback disagrees with a payment's terminal status.
    #[error("Payment is already {current}, cannot become {incoming}")]
    ConflictingPaymentState {
        current: PaymentStatus,
        incoming: PaymentStatus,
    },

    /// A callback's amount differs from the stored payment amount.
    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: Money, received: Money },

    /// No payment carries this gateway reference.
    #[error("Unknown payment reference: {0}")]
    UnknownPayment(String),

    /// A uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage was busy. Nothing was committed and the call can be retried.
    #[error("Transient storage error: {0}")]
    TransientStorage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::NotFound { .. } => "not_found",
            DomainError::EmptyCart => "empty_cart",
            DomainError::ProductUnavailable(_) => "product_unavailable",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::ConflictingPaymentState { .. } => "conflicting_payment_state",
            DomainError::AmountMismatch { .. } => "amount_mismatch",
            DomainError::UnknownPayment(_) => "unknown_payment",
            DomainError::Conflict(_) => "conflict",
            DomainError::TransientStorage(_) => "transient_storage",
            DomainError::Internal(_) => "internal",
        }
    }

    /// Returns true if the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::TransientStorage(_))
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            StoreError::OutOfRange(msg) => DomainError::Validation(msg),
            StoreError::Transient(msg) => DomainError::TransientStorage(msg),
            other => DomainError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Internal(format!("serialization failed: {e}"))
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        let err: DomainError = StoreError::Transient("lock timeout".into()).into();
        assert_eq!(err.kind(), "transient_storage");
        assert!(err.is_retryable());

        let err: DomainError = StoreError::not_found("order", "42").into();
        assert_eq!(err.kind(), "not_found");
        assert!(!err.is_retryable());

        let err: DomainError = StoreError::OutOfRange("integer out of range".into()).into();
        assert_eq!(err.kind(), "validation_error");

        let err: DomainError = StoreError::TransactionClosed.into();
        assert_eq!(err.kind(), "internal");
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        let errors = [
            DomainError::Validation("bad".into()),
            DomainError::EmptyCart,
            DomainError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending,
            },
            DomainError::Conflict("dup".into()),
        ];
        assert!(errors.iter().all(|e| !e.is_retryable()));
    }
}
