//! The item catalog port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::order::Money;

common::uuid_id!(
    /// A listed item.
    ItemId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Available,
    Pending,
    Sold,
    Expired,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Pending => "pending",
            ItemStatus::Sold => "sold",
            ItemStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the order lifecycle needs to know about a listed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub owner_id: UserId,
    pub title: String,
    pub price: Money,
    pub quantity: u32,
    pub status: ItemStatus,
}

impl CatalogItem {
    /// An available listing with a fresh id.
    pub fn new(owner_id: UserId, title: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            id: ItemId::new(),
            owner_id,
            title: title.into(),
            price,
            quantity,
            status: ItemStatus::Available,
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }
}

#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn get_item(&self, id: ItemId) -> Result<Option<CatalogItem>, DomainError>;

    async fn mark_sold(&self, id: ItemId) -> Result<(), DomainError>;
}

#[derive(Clone, Default)]
pub struct InMemoryItemCatalog {
    items: Arc<RwLock<HashMap<ItemId, CatalogItem>>>,
}

impl InMemoryItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, item: CatalogItem) -> ItemId {
        let id = item.id;
        self.items.write().await.insert(id, item);
        id
    }

    pub async fn status(&self, id: ItemId) -> Option<ItemStatus> {
        self.items.read().await.get(&id).map(|item| item.status)
    }
}

#[async_trait]
impl ItemCatalog for InMemoryItemCatalog {
    async fn get_item(&self, id: ItemId) -> Result<Option<CatalogItem>, DomainError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn mark_sold(&self, id: ItemId) -> Result<(), DomainError> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&id).ok_or(DomainError::ItemNotFound(id))?;
        item.status = ItemStatus::Sold;
        Ok(())
    }
}
