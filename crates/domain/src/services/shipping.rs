//! Shipping cost policy.

use async_trait::async_trait;
use common::{Money, UserId};
use store::{OrderItem, ShippingAddress};

use crate::error::Result;

/// Computes the shipping cost of an order at checkout.
#[async_trait]
pub trait ShippingPolicy: Send + Sync {
    async fn shipping_cost(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
        items: &[OrderItem],
    ) -> Result<Money>;
}

/// Charges the same amount for every order.
#[derive(Debug, Clone, Copy)]
pub struct FlatRateShipping {
    rate: Money,
}

impl FlatRateShipping {
    pub fn new(rate: Money) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl ShippingPolicy for FlatRateShipping {
    async fn shipping_cost(
        &self,
        _user_id: UserId,
        _address: &ShippingAddress,
        _items: &[OrderItem],
    ) -> Result<Money> {
        Ok(self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flat_rate_ignores_items() {
        let policy = FlatRateShipping::new(Money::from_cents(200));
        let cost = policy
            .shipping_cost(UserId::new(), &ShippingAddress::default(), &[])
            .await
            .unwrap();
        assert_eq!(cost, Money::from_cents(200));
    }
}
