//! Payment gateway reconciliation.

mod gateway;
mod reconciler;

pub use gateway::GatewayStatus;
pub use reconciler::PaymentReconciler;

use common::Money;
use serde::Serialize;
use store::Payment;

/// A webhook notification from the payment gateway.
///
/// The signature is verified before it reaches the domain.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub external_reference: String,
    /// Raw gateway status string, e.g. `settlement` or `deny`.
    pub status: String,
    pub amount: Money,
}

impl PaymentCallback {
    pub fn new(external_reference: impl Into<String>, status: impl Into<String>, amount: Money) -> Self {
        Self {
            external_reference: external_reference.into(),
            status: status.into(),
            amount,
        }
    }
}

/// What a callback did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "payment", rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The payment changed status.
    Applied(Payment),

    /// The payment already had this status. Nothing was written.
    AlreadyApplied(Payment),

    /// A non-terminal notification. Nothing was written.
    Ignored(Payment),
}

impl CallbackOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            CallbackOutcome::Applied(p)
            | CallbackOutcome::AlreadyApplied(p)
            | CallbackOutcome::Ignored(p) => p,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied(_) => "applied",
            CallbackOutcome::AlreadyApplied(_) => "already_applied",
            CallbackOutcome::Ignored(_) => "ignored",
        }
    }
}
