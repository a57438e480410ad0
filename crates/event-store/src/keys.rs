use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::Result;

/// Registry of globally unique business keys, grouped by namespace.
///
/// A claim is atomic: of several concurrent claims for the same key exactly
/// one returns `true`.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Claims `key` within `namespace`. Returns false if it was already taken.
    async fn claim(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Releases a previously claimed key so it can be claimed again.
    async fn release(&self, namespace: &str, key: &str) -> Result<()>;

    async fn is_claimed(&self, namespace: &str, key: &str) -> Result<bool>;
}

#[derive(Clone, Default)]
pub struct InMemoryKeyRegistry {
    keys: Arc<Mutex<HashSet<(String, String)>>>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a key up front, for tests that need a collision.
    pub async fn reserve(&self, namespace: &str, key: &str) {
        self.keys
            .lock()
            .await
            .insert((namespace.to_string(), key.to_string()));
    }
}

#[async_trait]
impl KeyRegistry for InMemoryKeyRegistry {
    async fn claim(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .keys
            .lock()
            .await
            .insert((namespace.to_string(), key.to_string())))
    }

    async fn release(&self, namespace: &str, key: &str) -> Result<()> {
        self.keys
            .lock()
            .await
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn is_claimed(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .keys
            .lock()
            .await
            .contains(&(namespace.to_string(), key.to_string())))
    }
}
