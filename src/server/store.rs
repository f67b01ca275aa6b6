use std::collections::HashSet;

use tokio::sync::Mutex;
use tracing::warn;

use crate::protocol::message::{Item, ItemId};

/// Authoritative item collection, in insertion order.
///
/// Every operation takes the inner lock, so mutations never interleave.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: Mutex<Vec<Item>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store. Items repeating an earlier id are dropped.
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for item in items {
            if seen.insert(item.id) {
                unique.push(item);
            } else {
                warn!(id = %item.id, "Dropping seed item with duplicate id");
            }
        }
        Self {
            items: Mutex::new(unique),
        }
    }

    pub async fn list(&self) -> Vec<Item> {
        self.items.lock().await.clone()
    }

    pub async fn get(&self, id: ItemId) -> Option<Item> {
        let items = self.items.lock().await;
        items.iter().find(|item| item.id == id).cloned()
    }

    /// Append a new item under a fresh id.
    pub async fn add(&self, text: impl Into<String>) -> Item {
        let mut items = self.items.lock().await;
        let mut id = ItemId::new();
        while items.iter().any(|item| item.id == id) {
            id = ItemId::new();
        }
        let item = Item {
            id,
            text: text.into(),
        };
        items.push(item.clone());
        item
    }

    /// Replace an item's text. `None` if the id is unknown.
    pub async fn update(&self, id: ItemId, text: impl Into<String>) -> Option<Item> {
        let mut items = self.items.lock().await;
        let item = items.iter_mut().find(|item| item.id == id)?;
        item.text = text.into();
        Some(item.clone())
    }

    /// Remove and return an item. `None` if the id is unknown.
    pub async fn delete(&self, id: ItemId) -> Option<Item> {
        let mut items = self.items.lock().await;
        let index = items.iter().position(|item| item.id == id)?;
        Some(items.remove(index))
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
