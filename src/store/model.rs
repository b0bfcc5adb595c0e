//! Persisted log entry types.
//!
//! Forward, Delivery and MessageIndex entries are write-once. Order keys are
//! normalized into [`OrderKeys`] when an entry is built or deserialized, so
//! readers never see the raw string/list/scalar encodings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Ordered, trimmed, duplicate-free set of order keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OrderKeys(Vec<String>);

impl OrderKeys {
    /// Build from any iterator of keys. Blank keys are dropped, first occurrence wins.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for key in keys {
            let key = key.as_ref().trim();
            if !key.is_empty() && !out.iter().any(|k| k == key) {
                out.push(key.to_string());
            }
        }
        Self(out)
    }

    /// Parse a delimited string (`"123, 456"` or `"123;456"`).
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split([',', ';']))
    }

    pub fn contains(&self, key: &str) -> bool {
        let key = key.trim();
        self.0.iter().any(|k| k == key)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OrderKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl From<Vec<String>> for OrderKeys {
    fn from(keys: Vec<String>) -> Self {
        Self::new(keys)
    }
}

/// Raw encodings accepted from older rows and external producers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrderKeys {
    List(Vec<serde_json::Value>),
    Text(String),
    Number(serde_json::Number),
    Null,
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for OrderKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawOrderKeys::deserialize(deserializer)? {
            RawOrderKeys::List(items) => Self::new(items.iter().filter_map(scalar_to_string)),
            RawOrderKeys::Text(s) => Self::parse(&s),
            RawOrderKeys::Number(n) => Self::new([n.to_string()]),
            RawOrderKeys::Null => Self::default(),
        })
    }
}

// ── Forward log ─────────────────────────────────────────────────────

/// Which directory a requester was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterType {
    PreCustomer,
    Customer,
}

impl RequesterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCustomer => "pre_customer",
            Self::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStatus {
    /// Forwarded with at least one order key.
    Forwarded,
    /// Forwarded, but the body carried no order key.
    LoggedWithoutKeys,
}

impl ForwardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::LoggedWithoutKeys => "logged_without_keys",
        }
    }
}

/// One accepted inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardLogEntry {
    pub timestamp: DateTime<Utc>,
    pub order_keys: OrderKeys,
    pub order_tag: String,
    pub requester_id: String,
    pub message_body: String,
    pub message_id: String,
    pub chat_id: String,
    /// Id of the copy sent to the destination.
    pub relayed_message_id: String,
    pub destination_id: String,
    pub destination_type: String,
    pub status: ForwardStatus,
    pub requester_type: RequesterType,
}

// ── Delivery log ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Matched, billed and forwarded to the requester.
    Delivered,
    /// Matched, but held back (generated-copy phrase missing).
    Withheld,
    Duplicate,
    Unmatched,
    /// NID-make document routed back to its requester.
    NidMade,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Withheld => "withheld",
            Self::Duplicate => "duplicate",
            Self::Unmatched => "unmatched",
            Self::NidMade => "nid_made",
        }
    }
}

/// Number of leading characters of the extracted text kept in the log.
pub const EXCERPT_CHARS: usize = 200;

/// One reconciled delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub timestamp: DateTime<Utc>,
    /// The matched identifier (empty when unmatched).
    pub order_keys: OrderKeys,
    pub file_name: String,
    /// National ID value found in the document, if any.
    pub extracted_id_value: Option<String>,
    /// Chats of the requesters the delivery resolved to.
    pub resolved_ids: Vec<String>,
    pub excerpt: String,
    pub message_id: String,
    pub status: DeliveryStatus,
    pub source_type: String,
    pub content_hash: String,
}

/// First [`EXCERPT_CHARS`] characters of a text, on a char boundary.
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

// ── Message index ───────────────────────────────────────────────────

/// Outbound message → the message it was relayed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIndexEntry {
    pub outbound_message_id: String,
    pub original_message_id: String,
    pub original_chat_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_keys_dedup_and_trim() {
        let keys = OrderKeys::new([" 123 ", "456", "123", ""]);
        assert_eq!(keys.as_slice(), &["123".to_string(), "456".to_string()]);
        assert!(keys.contains("456 "));
        assert_eq!(keys.to_string(), "123, 456");
    }

    #[test]
    fn order_keys_accept_all_encodings() {
        let from_text: OrderKeys = serde_json::from_str(r#""111, 222 ,333""#).unwrap();
        assert_eq!(from_text.len(), 3);

        let from_list: OrderKeys = serde_json::from_str(r#"["111", 222, " 111"]"#).unwrap();
        assert_eq!(from_list, OrderKeys::new(["111", "222"]));

        let from_scalar: OrderKeys = serde_json::from_str("12345678901").unwrap();
        assert_eq!(from_scalar.first(), Some("12345678901"));

        let from_null: OrderKeys = serde_json::from_str("null").unwrap();
        assert!(from_null.is_empty());
    }

    #[test]
    fn order_keys_serialize_as_list() {
        let keys = OrderKeys::parse("9;8");
        assert_eq!(serde_json::to_string(&keys).unwrap(), r#"["9","8"]"#);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let text = "অ".repeat(300);
        assert_eq!(excerpt(&text).chars().count(), EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }
}
