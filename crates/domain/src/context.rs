//! Shared handle passed to every service.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::Money;
use serde::{Serialize, de::DeserializeOwned};
use store::Store;

use crate::error::Result;
use crate::events::{DomainEvent, EventMessage};
use crate::services::cache::{Cache, InMemoryCache};
use crate::services::messaging::{EventPublisher, TracingPublisher};
use crate::services::shipping::{FlatRateShipping, ShippingPolicy};

/// Tunables for checkout, payment expiry and caching.
#[derive(Debug, Clone)]
pub struct CommerceSettings {
    /// Shipping charged per order by the default policy.
    pub shipping_flat_rate: Money,

    /// How long a new payment stays payable.
    pub payment_ttl: chrono::Duration,

    /// Payment method used when checkout does not name one.
    pub default_payment_method: String,

    pub cache_ttl: Duration,

    /// Reported as `service` in published events.
    pub service_name: String,
}

impl Default for CommerceSettings {
    fn default() -> Self {
        Self {
            shipping_flat_rate: Money::zero(),
            payment_ttl: chrono::Duration::minutes(1440),
            default_payment_method: "bank_transfer".to_string(),
            cache_ttl: Duration::from_secs(300),
            service_name: "order-service".to_string(),
        }
    }
}

/// Store, collaborators and settings for the domain services.
///
/// Cheap to clone. Collaborator failures other than the store's are logged
/// and swallowed here so services never fail because of them.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub publisher: Arc<dyn EventPublisher>,
    pub shipping: Arc<dyn ShippingPolicy>,
    pub settings: CommerceSettings,
}

impl Context {
    /// Creates a context with an in-memory cache, a logging publisher and
    /// flat-rate shipping from the settings.
    pub fn new(store: Arc<dyn Store>, settings: CommerceSettings) -> Self {
        Self {
            store,
            cache: Arc::new(InMemoryCache::new()),
            publisher: Arc::new(TracingPublisher),
            shipping: Arc::new(FlatRateShipping::new(settings.shipping_flat_rate)),
            settings,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_shipping(mut self, shipping: Arc<dyn ShippingPolicy>) -> Self {
        self.shipping = shipping;
        self
    }

    /// Deletes cache keys, logging failures.
    pub(crate) async fn invalidate(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.cache.delete(key).await {
                tracing::warn!(key = %key, error = %e, "cache invalidation failed");
            }
        }
    }

    /// Reads a cached JSON value. Misses, backend failures and undecodable
    /// entries all return `None`.
    pub(crate) async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes)
                .inspect_err(|e| tracing::warn!(key, error = %e, "discarding bad cache entry"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    pub(crate) async fn fill_cache<T: Serialize>(&self, key: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache value not serializable");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, bytes, self.settings.cache_ttl).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }

    /// Fills `key` with `value`, then re-reads the source and drops the entry
    /// if it no longer matches.
    ///
    /// A writer that commits between our read and the fill invalidates before
    /// the stale entry lands. Its commit is visible to the re-read, so the
    /// entry is removed here instead.
    pub(crate) async fn fill_cache_checked<T, F, Fut>(&self, key: &str, value: &T, current: F)
    where
        T: Serialize + PartialEq,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        self.fill_cache(key, value).await;
        match current().await {
            Ok(Some(now)) if now == *value => {}
            Ok(_) => {
                tracing::debug!(key, "source changed during cache fill");
                self.invalidate(&[key.to_string()]).await;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache fill re-check failed");
                self.invalidate(&[key.to_string()]).await;
            }
        }
    }

    /// Publishes events in order. Must only be called after commit.
    pub(crate) async fn emit(&self, events: Vec<DomainEvent>) {
        for event in events {
            let topic = event.topic();
            let event_type = event.event_type();
            let order_id = event.order_id();
            let message = EventMessage::new(&self.settings.service_name, event);

            let payload = match serde_json::to_vec(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(topic, event_type, %order_id, error = %e, "event not serializable");
                    continue;
                }
            };

            match self.publisher.publish(topic, payload).await {
                Ok(()) => {
                    metrics::counter!("events_published_total", "topic" => topic).increment(1);
                    tracing::debug!(topic, event_type, %order_id, "event published");
                }
                Err(e) => {
                    metrics::counter!("events_publish_failures_total", "topic" => topic)
                        .increment(1);
                    tracing::warn!(
                        topic,
                        event_type,
                        %order_id,
                        event_id = %message.event_id,
                        error = %e,
                        "event publish failed"
                    );
                }
            }
        }
    }
}
