//! Order matcher — recovers the original request behind a delivered document.

use serde::Serialize;

use crate::reconcile::extractor::{Candidate, IdLabel};
use crate::store::ForwardLogEntry;

/// A candidate that hit a forward log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderMatch {
    pub identifier: String,
    pub label: IdLabel,
    pub entry: ForwardLogEntry,
}

impl OrderMatch {
    pub fn requester_id(&self) -> &str {
        &self.entry.requester_id
    }

    pub fn order_tag(&self) -> &str {
        &self.entry.order_tag
    }
}

/// First candidate, in extractor order, found in any entry's keys.
///
/// `entries` must be most recent first; when several entries carry the same
/// identifier the newest one wins.
pub fn match_candidates(candidates: &[Candidate], entries: &[ForwardLogEntry]) -> Option<OrderMatch> {
    candidates.iter().find_map(|candidate| {
        let value = candidate.value.trim();
        if value.is_empty() {
            return None;
        }
        entries
            .iter()
            .find(|entry| entry.order_keys.contains(value))
            .map(|entry| OrderMatch {
                identifier: value.to_string(),
                label: candidate.label,
                entry: entry.clone(),
            })
    })
}
