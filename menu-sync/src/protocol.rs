//! JSON wire protocol for the broadcast channel.
//!
//! Every frame is an envelope:
//! ```text
//! { "type": "menu:update", "payload": <ChangeNotification> }
//! ```
//!
//! The payload carries no tag of its own; its variant is decided by shape:
//!
//! | Payload shape                  | Variant        |
//! |--------------------------------|----------------|
//! | array of items                 | `FullReplace`  |
//! | object with `"deleted": true`  | `DeleteMarker` |
//! | any other object               | `Upsert`       |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ItemId, MenuItem};

/// The only envelope type the channel understands.
pub const MENU_UPDATE: &str = "menu:update";

/// A change to the menu collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotification {
    /// Replace the whole collection, adopting this order.
    FullReplace(Vec<MenuItem>),
    /// Insert or replace one item by id.
    Upsert(MenuItem),
    /// The item with this id was deleted.
    DeleteMarker(ItemId),
}

/// Minimal record announcing a deletion: `{ id, deleted: true }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMarker {
    pub id: ItemId,
    pub deleted: bool,
}

impl ChangeNotification {
    /// Encode the payload in its untagged wire shape.
    pub fn to_payload(&self) -> Result<Value, ProtocolError> {
        let value = match self {
            Self::FullReplace(items) => serde_json::to_value(items),
            Self::Upsert(item) => serde_json::to_value(item),
            Self::DeleteMarker(id) => serde_json::to_value(DeleteMarker {
                id: id.clone(),
                deleted: true,
            }),
        };
        value.map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decide the variant from the payload's shape.
    pub fn from_payload(payload: Value) -> Result<Self, ProtocolError> {
        let is_marker = payload.get("deleted").and_then(Value::as_bool) == Some(true);
        match payload {
            Value::Array(_) => serde_json::from_value(payload)
                .map(Self::FullReplace)
                .map_err(|e| ProtocolError::Deserialization(e.to_string())),
            Value::Object(_) => {
                if is_marker {
                    let marker: DeleteMarker = serde_json::from_value(payload)
                        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
                    Ok(Self::DeleteMarker(marker.id))
                } else {
                    serde_json::from_value(payload)
                        .map(Self::Upsert)
                        .map_err(|e| ProtocolError::Deserialization(e.to_string()))
                }
            }
            other => Err(ProtocolError::UnexpectedPayload(type_name(&other))),
        }
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FullReplace(_) => "full-replace",
            Self::Upsert(_) => "upsert",
            Self::DeleteMarker(_) => "delete-marker",
        }
    }
}

/// Top-level channel frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Wrap a notification in a `menu:update` envelope.
    pub fn menu_update(notification: &ChangeNotification) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: MENU_UPDATE.to_string(),
            payload: notification.to_payload()?,
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    /// The carried notification, or `None` for envelope types other than
    /// `menu:update` and for empty payloads.
    pub fn into_notification(self) -> Result<Option<ChangeNotification>, ProtocolError> {
        if self.kind != MENU_UPDATE || self.payload.is_null() {
            return Ok(None);
        }
        ChangeNotification::from_payload(self.payload).map(Some)
    }
}

/// Encode a notification straight to frame text.
pub fn encode_notification(notification: &ChangeNotification) -> Result<String, ProtocolError> {
    Envelope::menu_update(notification)?.encode()
}

/// Decode frame text; unrecognized envelope types yield `Ok(None)`.
pub fn decode_notification(text: &str) -> Result<Option<ChangeNotification>, ProtocolError> {
    Envelope::decode(text)?.into_notification()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Protocol errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Unexpected payload type: {0}")]
    UnexpectedPayload(&'static str),
}
