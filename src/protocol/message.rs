use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique identifier assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub text: String,
}

/// Client-to-server messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IncomingMessage {
    /// Create an item; the server assigns its id
    Add { text: String },
    /// Replace the text of an existing item
    Update { id: ItemId, text: String },
    /// Remove an existing item
    Delete { id: ItemId },
}

impl IncomingMessage {
    /// Variant name used for routing logs.
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingMessage::Add { .. } => "add",
            IncomingMessage::Update { .. } => "update",
            IncomingMessage::Delete { .. } => "delete",
        }
    }
}

/// Server-to-client messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    /// Full snapshot, sent only to a newly connected client
    Items { items: Vec<Item> },
    Added { item: Item },
    Updated { item: Item },
    Deleted { item: Item },
}

impl OutgoingMessage {
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingMessage::Items { .. } => "items",
            OutgoingMessage::Added { .. } => "added",
            OutgoingMessage::Updated { .. } => "updated",
            OutgoingMessage::Deleted { .. } => "deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_client_messages() {
        let json = r#"{"type":"add","text":"Buy milk"}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            IncomingMessage::Add {
                text: "Buy milk".into()
            }
        );

        let id = ItemId::new();
        let json = format!(r#"{{"type":"delete","id":"{id}"}}"#);
        let msg: IncomingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, IncomingMessage::Delete { id });
        assert_eq!(msg.kind(), "delete");
    }

    #[test]
    fn server_message_layout() {
        let item = Item {
            id: ItemId::new(),
            text: "Done".into(),
        };
        let value = serde_json::to_value(OutgoingMessage::Updated { item: item.clone() }).unwrap();
        assert_eq!(value["type"], "updated");
        assert_eq!(value["item"]["id"], item.id.to_string());
        assert_eq!(value["item"]["text"], "Done");
    }

    #[test]
    fn ids_are_unique() {
        let a = ItemId::new();
        let b = ItemId::new();
        assert_ne!(a, b);
    }
}
