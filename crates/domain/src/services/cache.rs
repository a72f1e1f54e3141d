//! Cache trait and in-memory implementation.
//!
//! The cache is read-through only. Writers invalidate keys after commit and
//! never update cached values in place.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use thiserror::Error;

/// A cache backend failure. Callers log it and carry on.
#[derive(Debug, Error)]
#[error("Cache error: {0}")]
pub struct CacheError(pub String);

/// Trait for key/value cache operations.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Cache key layout.
pub mod keys {
    use super::*;

    pub fn order(order_id: OrderId) -> String {
        format!("order:{order_id}")
    }

    pub fn product(product_id: ProductId) -> String {
        format!("product:{product_id}")
    }

    pub fn cart(user_id: UserId) -> String {
        format!("cart:{user_id}")
    }
}

#[derive(Debug, Default)]
struct InMemoryCacheState {
    entries: HashMap<String, (Vec<u8>, Instant)>,
    fail_on_access: bool,
}

/// In-memory cache with per-entry expiry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    state: Arc<RwLock<InMemoryCacheState>>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail, to simulate an unreachable backend.
    pub fn set_fail_on_access(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_access = fail;
    }

    /// Returns true if an unexpired entry exists for the key.
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    fn check_available(state: &InMemoryCacheState) -> Result<(), CacheError> {
        if state.fail_on_access {
            return Err(CacheError("cache unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::check_available(&state)?;

        match state.entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                state.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::check_available(&state)?;
        let now = Instant::now();
        // Entries that are never read again would otherwise stay forever.
        state.entries.retain(|_, (_, expires_at)| *expires_at > now);
        state.entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::check_available(&state)?;
        state.entries.remove(key);
        Ok(())
    }
}
