//! Account, ledger entry and rate table types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Role given to accounts created lazily by a ledger operation.
pub const BASELINE_ROLE: &str = "Customer";

/// Rate table key used when neither the order tag nor the role has a rate.
pub const DEFAULT_RATE_KEY: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "deposit")]
    Deposit,
    #[serde(rename = "due_clear")]
    DueClear,
    #[serde(rename = "manualCharge")]
    ManualCharge,
    #[serde(rename = "charge")]
    Charge,
    #[serde(rename = "refund")]
    Refund,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::DueClear => "due_clear",
            Self::ManualCharge => "manualCharge",
            Self::Charge => "charge",
            Self::Refund => "refund",
        }
    }

    /// Entries that debit the account.
    pub fn is_debit(&self) -> bool {
        matches!(self, Self::Charge | Self::ManualCharge)
    }
}

/// One immutable ledger history line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        entry_type: EntryType,
        amount: Decimal,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_type,
            amount,
            reason: reason.into(),
            order_key: None,
            destination_id: None,
            destination_type: None,
            timestamp,
        }
    }

    /// Attach the order this entry was booked for.
    pub fn with_order(mut self, order: &OrderContext) -> Self {
        self.order_key = order.order_key.clone();
        self.destination_id = order.destination_id.clone();
        self.destination_type = order.destination_type.clone();
        self
    }
}

/// Order metadata attached to charge and refund entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderContext {
    pub order_key: Option<String>,
    pub destination_id: Option<String>,
    pub destination_type: Option<String>,
}

/// Everything `charge` needs to resolve and book a rate.
#[derive(Debug, Clone, Default)]
pub struct ChargeContext {
    /// Order tag (e.g. `SignCopy`), tried before the account role.
    pub order_tag: Option<String>,
    pub reason: String,
    pub order: OrderContext,
}

/// Per-requester balance, due and recent history.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub role: String,
    pub balance: Decimal,
    pub due: Decimal,
    pub history: Vec<LedgerEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token; 0 means never persisted.
    pub version: i64,
}

impl Account {
    /// A fresh zero-balance account with the baseline role.
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: BASELINE_ROLE.to_string(),
            balance: Decimal::ZERO,
            due: Decimal::ZERO,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Drop history entries older than `cutoff`.
    pub fn prune_history(&mut self, cutoff: DateTime<Utc>) {
        self.history.retain(|e| e.timestamp >= cutoff);
    }

    pub fn last_entry(&self) -> Option<&LedgerEntry> {
        self.history.last()
    }
}

/// Charge amounts keyed by order tag or role, with a `default` fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: Vec<(String, Decimal)>,
}

impl RateTable {
    pub fn new(rates: Vec<(String, Decimal)>) -> Self {
        Self { rates }
    }

    /// Case-insensitive lookup of one key.
    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.rates
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// Order tag, then role, then `default`; zero when nothing is configured.
    pub fn resolve(&self, order_tag: Option<&str>, role: &str) -> Decimal {
        order_tag
            .and_then(|tag| self.get(tag))
            .or_else(|| self.get(role))
            .or_else(|| self.get(DEFAULT_RATE_KEY))
            .unwrap_or(Decimal::ZERO)
    }

    /// Existing tags as stored.
    pub fn tags(&self) -> Vec<String> {
        self.rates.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Stored spelling of a tag, matched case-insensitively.
    pub fn canonical_tag(&self, tag: &str) -> Option<&str> {
        self.rates
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(tag))
            .map(|(k, _)| k.as_str())
    }
}
