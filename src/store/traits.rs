//! `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::DatabaseError;
use crate::ledger::model::Account;
use crate::store::model::{DeliveryLogEntry, ForwardLogEntry, MessageIndexEntry};

/// Backend-agnostic persistence for accounts, rates and the append-only logs.
///
/// Log collections are partitioned by business day. There are no update or
/// delete operations for log entries.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Accounts ────────────────────────────────────────────────────

    /// Load an account by id.
    async fn get_account(&self, id: &str) -> Result<Option<Account>, DatabaseError>;

    /// Insert a never-persisted account. Returns false if the id already exists.
    async fn insert_account(&self, account: &Account) -> Result<bool, DatabaseError>;

    /// Replace an account if its stored version still equals `expected_version`.
    ///
    /// The stored version becomes `account.version`. Returns false on a lost race.
    async fn update_account(
        &self,
        account: &Account,
        expected_version: i64,
    ) -> Result<bool, DatabaseError>;

    /// Every account, ordered by id.
    async fn list_accounts(&self) -> Result<Vec<Account>, DatabaseError>;

    // ── Rates ───────────────────────────────────────────────────────

    /// All `(tag, amount)` pairs in insertion order.
    async fn get_rates(&self) -> Result<Vec<(String, Decimal)>, DatabaseError>;

    /// Insert or overwrite a rate. Tags are stored as given.
    async fn upsert_rate(&self, tag: &str, amount: Decimal) -> Result<(), DatabaseError>;

    // ── Forward log ─────────────────────────────────────────────────

    async fn append_forward(
        &self,
        day: NaiveDate,
        entry: &ForwardLogEntry,
    ) -> Result<(), DatabaseError>;

    /// Entries from `from_day` onwards, most recent first.
    async fn forward_entries_since(
        &self,
        from_day: NaiveDate,
    ) -> Result<Vec<ForwardLogEntry>, DatabaseError>;

    // ── Delivery log ────────────────────────────────────────────────

    async fn append_delivery(
        &self,
        day: NaiveDate,
        entry: &DeliveryLogEntry,
    ) -> Result<(), DatabaseError>;

    /// Entries from `from_day` onwards, most recent first.
    async fn delivery_entries_since(
        &self,
        from_day: NaiveDate,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError>;

    /// Entries of exactly one business day, most recent first.
    async fn delivery_entries_on(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError>;

    // ── Message index ───────────────────────────────────────────────

    async fn append_message_index(
        &self,
        day: NaiveDate,
        entry: &MessageIndexEntry,
    ) -> Result<(), DatabaseError>;

    /// Most recent index entry for an outbound message id.
    async fn find_message_index(
        &self,
        outbound_message_id: &str,
    ) -> Result<Option<MessageIndexEntry>, DatabaseError>;
}
