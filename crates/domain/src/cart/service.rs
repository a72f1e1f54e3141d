use common::{CartLineId, ProductId, UserId};
use store::{CartLine, Catalog};

use crate::context::Context;
use crate::error::{DomainError, Result};
use crate::services::cache::keys;

use super::{CartLineView, CartView, ProductSnapshot, validate_quantity};

/// Service for managing shopping carts.
///
/// No stock checks happen here; checkout validates stock.
#[derive(Clone)]
pub struct CartService {
    ctx: Context,
}

impl CartService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Adds a product to the cart, merging into the existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartLine> {
        let quantity = validate_quantity(quantity)?;

        if self.ctx.store.get_product(product_id).await?.is_none() {
            return Err(DomainError::not_found("product", product_id));
        }

        let line = self
            .ctx
            .store
            .add_to_cart(user_id, product_id, quantity)
            .await?;
        self.ctx.invalidate(&[keys::cart(user_id)]).await;

        tracing::info!(line_id = %line.id, quantity = line.quantity, "cart line saved");
        Ok(line)
    }

    /// Returns the cart with product data looked up now.
    ///
    /// Lines come from the cache when possible. Products never do, so price
    /// and stock are always current.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartView> {
        let key = keys::cart(user_id);
        let mut lines: Vec<CartLine> = match self.ctx.cached(&key).await {
            Some(lines) => lines,
            None => {
                let lines = self.ctx.store.get_cart(user_id).await?;
                self.ctx
                    .fill_cache_checked(&key, &lines, || async {
                        Ok::<_, DomainError>(Some(self.ctx.store.get_cart(user_id).await?))
                    })
                    .await;
                lines
            }
        };
        lines.sort_by_key(|l| (l.created_at, l.id));

        let mut views = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .ctx
                .store
                .get_product(line.product_id)
                .await?
                .map(ProductSnapshot::from);
            views.push(CartLineView { line, product });
        }

        Ok(CartView::new(user_id, views))
    }

    /// Sets the quantity of one of the user's lines.
    #[tracing::instrument(skip(self))]
    pub async fn update_line(
        &self,
        line_id: CartLineId,
        user_id: UserId,
        quantity: i64,
    ) -> Result<CartLine> {
        let quantity = validate_quantity(quantity)?;

        let line = self
            .ctx
            .store
            .update_cart_line(line_id, user_id, quantity)
            .await?
            .ok_or_else(|| DomainError::not_found("cart line", line_id))?;
        self.ctx.invalidate(&[keys::cart(user_id)]).await;

        Ok(line)
    }

    /// Removes a line. Removing an absent line succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, line_id: CartLineId, user_id: UserId) -> Result<()> {
        self.ctx.store.remove_cart_line(line_id, user_id).await?;
        self.ctx.invalidate(&[keys::cart(user_id)]).await;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        self.ctx.store.clear_cart(user_id).await?;
        self.ctx.invalidate(&[keys::cart(user_id)]).await;
        Ok(())
    }
}
