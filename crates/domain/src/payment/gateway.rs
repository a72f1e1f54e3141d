use std::str::FromStr;

use common::PaymentStatus;

use crate::error::DomainError;

/// Gateway notification status, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    /// Money was captured.
    Paid,
    /// Denied, cancelled or expired at the gateway.
    Failed,
    Refunded,
    /// Still waiting on the customer.
    Pending,
}

impl GatewayStatus {
    /// The payment status this notification asks for.
    pub fn payment_status(self) -> PaymentStatus {
        match self {
            GatewayStatus::Paid => PaymentStatus::Paid,
            GatewayStatus::Failed => PaymentStatus::Failed,
            GatewayStatus::Refunded => PaymentStatus::Refunded,
            GatewayStatus::Pending => PaymentStatus::Pending,
        }
    }
}

impl FromStr for GatewayStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "settlement" | "capture" | "paid" | "success" => Ok(GatewayStatus::Paid),
            "deny" | "cancel" | "expire" | "failure" | "failed" => Ok(GatewayStatus::Failed),
            "refund" | "refunded" => Ok(GatewayStatus::Refunded),
            "pending" => Ok(GatewayStatus::Pending),
            _ => Err(DomainError::Validation(format!(
                "unknown gateway status: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_case_insensitive() {
        assert_eq!("Settlement".parse::<GatewayStatus>().unwrap(), GatewayStatus::Paid);
        assert_eq!("CAPTURE".parse::<GatewayStatus>().unwrap(), GatewayStatus::Paid);
        assert_eq!("deny".parse::<GatewayStatus>().unwrap(), GatewayStatus::Failed);
        assert_eq!("expire".parse::<GatewayStatus>().unwrap(), GatewayStatus::Failed);
        assert_eq!("refund".parse::<GatewayStatus>().unwrap(), GatewayStatus::Refunded);
        assert_eq!("pending".parse::<GatewayStatus>().unwrap(), GatewayStatus::Pending);
    }

    #[test]
    fn test_unknown_status_is_validation_error() {
        let err = "authorize".parse::<GatewayStatus>().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_payment_status() {
        assert_eq!(GatewayStatus::Paid.payment_status(), PaymentStatus::Paid);
        assert!(!GatewayStatus::Pending.payment_status().is_terminal());
    }
}
