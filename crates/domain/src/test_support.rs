use std::sync::Arc;

use common::Money;
use store::{Catalog, InMemoryStore, Product, ShippingAddress};

use crate::context::{CommerceSettings, Context};
use crate::services::cache::InMemoryCache;
use crate::services::messaging::InMemoryPublisher;

pub struct Harness {
    pub ctx: Context,
    pub store: InMemoryStore,
    pub cache: InMemoryCache,
    pub publisher: InMemoryPublisher,
}

pub fn harness() -> Harness {
    harness_with(CommerceSettings::default())
}

pub fn harness_with(settings: CommerceSettings) -> Harness {
    let store = InMemoryStore::new();
    let cache = InMemoryCache::new();
    let publisher = InMemoryPublisher::new();
    let ctx = Context::new(Arc::new(store.clone()), settings)
        .with_cache(Arc::new(cache.clone()))
        .with_publisher(Arc::new(publisher.clone()));

    Harness {
        ctx,
        store,
        cache,
        publisher,
    }
}

pub async fn seed_product(store: &InMemoryStore, name: &str, price_cents: i64, stock: i64) -> Product {
    let product = Product::new(name, Money::from_cents(price_cents), stock);
    store.upsert_product(product.clone()).await.unwrap();
    product
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        address: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        province: "IL".to_string(),
        postal_code: "62701".to_string(),
    }
}
