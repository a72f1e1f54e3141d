//! Product administration and cached product reads.

use common::{Money, ProductId};
use store::{Catalog, Product};

use crate::context::Context;
use crate::error::{DomainError, Result};
use crate::services::cache::keys;

/// Fields accepted when creating or replacing a product.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub is_active: bool,
}

impl ProductInput {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("product name is required".to_string()));
        }
        if self.price.is_negative() {
            return Err(DomainError::Validation(
                "price must not be negative".to_string(),
            ));
        }
        if self.stock < 0 {
            return Err(DomainError::Validation(
                "stock must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CatalogService {
    ctx: Context,
}

impl CatalogService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Creates a product, or replaces it when `product_id` is given.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn upsert_product(
        &self,
        product_id: Option<ProductId>,
        input: ProductInput,
    ) -> Result<Product> {
        input.validate()?;

        let product = Product {
            id: product_id.unwrap_or_default(),
            name: input.name.trim().to_string(),
            price: input.price,
            stock: input.stock,
            is_active: input.is_active,
        };
        self.ctx.store.upsert_product(product.clone()).await?;
        self.ctx.invalidate(&[keys::product(product.id)]).await;

        tracing::info!(product_id = %product.id, "product saved");
        Ok(product)
    }

    /// Returns a product, reading through the cache.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        let key = keys::product(product_id);
        if let Some(product) = self.ctx.cached::<Product>(&key).await {
            return Ok(product);
        }

        let product = self
            .ctx
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", product_id))?;
        self.ctx
            .fill_cache_checked(&key, &product, || async {
                Ok::<_, DomainError>(self.ctx.store.get_product(product_id).await?)
            })
            .await;
        Ok(product)
    }

    /// Restocks or writes off units. The level never goes below zero.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<i64> {
        let stock = self.ctx.store.adjust_stock(product_id, delta).await?;
        self.ctx.invalidate(&[keys::product(product_id)]).await;

        tracing::info!(%product_id, delta, stock, "stock adjusted");
        Ok(stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, seed_product};

    fn input(name: &str, price_cents: i64, stock: i64) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            price: Money::from_cents(price_cents),
            stock,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_validates() {
        let h = harness();
        let service = CatalogService::new(h.ctx.clone());

        for bad in [input(" ", 100, 1), input("A", -1, 1), input("A", 100, -1)] {
            let err = service.upsert_product(None, bad).await.unwrap_err();
            assert_eq!(err.kind(), "validation_error");
        }
    }

    #[tokio::test]
    async fn test_get_product_fills_cache_and_update_invalidates() {
        let h = harness();
        let service = CatalogService::new(h.ctx.clone());
        let product = service
            .upsert_product(None, input("Widget", 1000, 3))
            .await
            .unwrap();

        service.get_product(product.id).await.unwrap();
        assert!(h.cache.contains(&keys::product(product.id)));

        service
            .upsert_product(Some(product.id), input("Widget", 1500, 3))
            .await
            .unwrap();
        assert!(!h.cache.contains(&keys::product(product.id)));
        assert_eq!(
            service.get_product(product.id).await.unwrap().price,
            Money::from_cents(1500)
        );
    }

    #[tokio::test]
    async fn test_adjust_stock_floor() {
        let h = harness();
        let product = seed_product(&h.store, "Widget", 1000, 2).await;
        let service = CatalogService::new(h.ctx.clone());

        assert_eq!(service.adjust_stock(product.id, 3).await.unwrap(), 5);
        let err = service.adjust_stock(product.id, -6).await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_stock");
        assert_eq!(service.get_product(product.id).await.unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_adjust_stock_extreme_deltas_are_errors() {
        let h = harness();
        let product = seed_product(&h.store, "Widget", 1000, 2).await;
        let service = CatalogService::new(h.ctx.clone());

        let err = service.adjust_stock(product.id, i64::MIN).await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_stock");
        let err = service.adjust_stock(product.id, i64::MAX).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(service.get_product(product.id).await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let h = harness();
        let err = CatalogService::new(h.ctx.clone())
            .get_product(ProductId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
