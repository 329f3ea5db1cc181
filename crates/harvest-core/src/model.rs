//! Remote entities and the datasets built from them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{HarvestError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub status: String,
}

impl Member {
    /// Parse a member record. Returns `None` when no identifier is present.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = first_str(value, &["chatUserId", "userId", "id"])?;
        let profile = value.get("chatMemberProfile");
        let display_name = profile
            .and_then(|p| p.get("displayName"))
            .and_then(non_empty_str)
            .or_else(|| {
                let first = profile.and_then(|p| p.get("firstName")).and_then(Value::as_str);
                let last = profile.and_then(|p| p.get("lastName")).and_then(Value::as_str);
                let full = format!("{} {}", first.unwrap_or(""), last.unwrap_or(""));
                let full = full.trim();
                (!full.is_empty()).then(|| full.to_string())
            })
            .unwrap_or_else(|| id.clone());
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            id,
            display_name,
            status,
        })
    }

    pub fn directory_entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            member_id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// A chat channel. Identity is `chat_id`; the other fields are informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub chat_id: String,
    #[serde(default)]
    pub name: String,
    pub discovered_by_member_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Channel {
    pub fn from_value(value: &Value, discovered_by: &str) -> Option<Self> {
        let chat_id = first_str(value, &["chatId", "id", "guid"])?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            chat_id,
            name,
            discovered_by_member_id: discovered_by.to_string(),
            kind: first_str(value, &["type"]),
            is_public: value.get("isPublic").and_then(Value::as_bool),
            owner_id: first_str(value, &["ownerID", "ownerId"]),
            organization_id: first_str(value, &["organizationId"]),
            description: value.get("description").and_then(non_empty_str),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
}

impl Message {
    pub fn from_value(value: &Value, chat_id: &str) -> Option<Self> {
        let id = first_str(value, &["id", "messageId"])?;
        let millis = value.get("createdAtMs").and_then(Value::as_i64).unwrap_or(0);
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default();
        Some(Self {
            id,
            chat_id: chat_id.to_string(),
            author_id: value
                .get("authorId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp,
            text: value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Full (or truncated) history of one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub truncated: bool,
    pub fetched_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub member_id: String,
    pub display_name: String,
}

/// Pull the list of items out of whatever envelope the API used.
///
/// Accepts a bare array, `{data: [..]}`, `{data: {items: [..]}}`,
/// `{items: [..]}`, or `{<key>: [..]}` for the given resource keys.
/// `null` is an empty list.
pub fn extract_items(endpoint: &str, body: &Value, keys: &[&str]) -> Result<Vec<Value>> {
    let list = match body {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => Some(items),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => Some(items),
            Some(Value::Object(inner)) => inner.get("items").and_then(Value::as_array),
            Some(Value::Null) => return Ok(Vec::new()),
            _ => map
                .get("items")
                .and_then(Value::as_array)
                .or_else(|| keys.iter().find_map(|k| map.get(*k).and_then(Value::as_array))),
        },
        _ => None,
    };

    list.cloned().ok_or_else(|| HarvestError::Decode {
        endpoint: endpoint.to_string(),
        reason: format!("no item list in response ({})", shape(body)),
    })
}

/// Parse every item, skipping those `parse` rejects.
pub(crate) fn parse_items<T>(
    endpoint: &str,
    items: &[Value],
    parse: impl Fn(&Value) -> Option<T>,
) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| {
            let parsed = parse(item);
            if parsed.is_none() {
                warn!(endpoint, "skipping item without identifier");
            }
            parsed
        })
        .collect()
}

pub(crate) fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match value.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.trim().is_empty()).map(str::to_string)
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_member_fallbacks() {
        let m = Member::from_value(&json!({
            "userId": 42,
            "status": "active",
            "chatMemberProfile": {"firstName": "Ada", "lastName": "Lovelace"}
        }))
        .unwrap();
        assert_eq!(m.id, "42");
        assert_eq!(m.display_name, "Ada Lovelace");

        let m = Member::from_value(&json!({
            "chatUserId": "u1",
            "chatMemberProfile": {"displayName": "ada", "firstName": "Ada"}
        }))
        .unwrap();
        assert_eq!(m.display_name, "ada");
        assert_eq!(m.status, "");

        assert!(Member::from_value(&json!({"status": "active"})).is_none());
        assert_eq!(Member::from_value(&json!({"id": "x"})).unwrap().display_name, "x");
    }

    #[test]
    fn test_channel_and_message_ids() {
        let c = Channel::from_value(&json!({"guid": "g-1"}), "u1").unwrap();
        assert_eq!(c.chat_id, "g-1");
        assert_eq!(c.name, "");
        assert_eq!(c.discovered_by_member_id, "u1");
        assert!(c.kind.is_none() && c.owner_id.is_none());
        let bare = serde_json::to_value(&c).unwrap();
        assert!(bare.get("type").is_none());
        assert!(bare.get("isPublic").is_none());

        let c = Channel::from_value(
            &json!({
                "chatId": "C7",
                "name": "ops",
                "type": "group",
                "isPublic": false,
                "ownerID": 17,
                "organizationId": "org-1",
                "description": "  "
            }),
            "u2",
        )
        .unwrap();
        assert_eq!(c.kind.as_deref(), Some("group"));
        assert_eq!(c.is_public, Some(false));
        assert_eq!(c.owner_id.as_deref(), Some("17"));
        assert_eq!(c.organization_id.as_deref(), Some("org-1"));
        assert!(c.description.is_none());
        let wire = serde_json::to_value(&c).unwrap();
        assert_eq!(wire["type"], "group");
        assert_eq!(wire["isPublic"], false);
        assert_eq!(wire["ownerId"], "17");
        assert_eq!(serde_json::from_value::<Channel>(wire).unwrap(), c);

        let m = Message::from_value(
            &json!({"messageId": "m9", "authorId": "u1", "createdAtMs": 1704067200000i64, "text": "hi"}),
            "C1",
        )
        .unwrap();
        assert_eq!(m.id, "m9");
        assert_eq!(m.timestamp.timestamp(), 1704067200);
        assert!(Message::from_value(&json!({"text": "no id"}), "C1").is_none());
    }

    #[test]
    fn test_extract_items_envelopes() {
        let item = json!({"id": 1});
        for body in [
            json!([item]),
            json!({"data": [item]}),
            json!({"data": {"items": [item]}}),
            json!({"items": [item]}),
            json!({"channels": [item]}),
        ] {
            let items = extract_items("user_channels", &body, &["channels"]).unwrap();
            assert_eq!(items.len(), 1, "envelope {body}");
        }
        assert!(extract_items("x", &Value::Null, &[]).unwrap().is_empty());
        assert!(extract_items("x", &json!({"unexpected": true}), &[]).is_err());
    }

    #[test]
    fn test_message_serializes_millis() {
        let m = Message::from_value(&json!({"id": "1", "createdAtMs": 1500}), "C").unwrap();
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["timestamp"], json!(1500));
        assert_eq!(v["chatId"], json!("C"));
    }
}
