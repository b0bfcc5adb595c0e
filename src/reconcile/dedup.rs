//! Deduplication checks over the append-only logs.
//!
//! Nothing here is stored separately; callers pass the log window they loaded.

use crate::store::{DeliveryLogEntry, DeliveryStatus, ForwardLogEntry};

/// Request keys already forwarded to `destination_id`, in request order.
pub fn duplicate_keys(
    keys: &[String],
    destination_id: &str,
    entries: &[ForwardLogEntry],
) -> Vec<String> {
    keys.iter()
        .filter(|key| {
            entries
                .iter()
                .any(|e| e.destination_id == destination_id && e.order_keys.contains(key))
        })
        .cloned()
        .collect()
}

/// What identifies an incoming delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryProbe<'a> {
    pub identifier: Option<&'a str>,
    pub message_id: Option<&'a str>,
    pub content_hash: Option<&'a str>,
}

/// Short form of a message id: the part after the last `_`.
fn short_id(id: &str) -> &str {
    id.rsplit('_').next().unwrap_or(id)
}

/// Message ids compare equal in full or by their short form.
pub fn same_message_id(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || short_id(a) == short_id(b)
}

/// True if the identifier, message id or content hash was already delivered.
///
/// Unmatched and withheld entries never reached a requester and are not counted.
pub fn is_duplicate_delivery(probe: &DeliveryProbe<'_>, entries: &[DeliveryLogEntry]) -> bool {
    entries
        .iter()
        .filter(|e| !matches!(e.status, DeliveryStatus::Unmatched | DeliveryStatus::Withheld))
        .any(|e| {
            let by_key = probe
                .identifier
                .filter(|k| !k.is_empty())
                .is_some_and(|k| e.order_keys.contains(k));
            let by_msg = probe
                .message_id
                .is_some_and(|m| same_message_id(m, &e.message_id));
            let by_hash = probe
                .content_hash
                .filter(|h| !h.is_empty())
                .is_some_and(|h| e.content_hash == h);
            by_key || by_msg || by_hash
        })
}

/// Requester chat for a NID-make document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NidTarget {
    pub nid_number: String,
    pub requester_chat: String,
}

/// First `numbers` entry that an earlier delivery extracted as its National ID.
///
/// `entries` are most recent first. Entries that resolved to no requester are skipped.
pub fn nid_make_target(numbers: &[String], entries: &[DeliveryLogEntry]) -> Option<NidTarget> {
    numbers.iter().find_map(|number| {
        entries
            .iter()
            .filter(|e| e.status != DeliveryStatus::NidMade)
            .filter(|e| e.extracted_id_value.as_deref() == Some(number.as_str()))
            .find_map(|e| e.resolved_ids.first())
            .map(|chat| NidTarget {
                nid_number: number.clone(),
                requester_chat: chat.clone(),
            })
    })
}
