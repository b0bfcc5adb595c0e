//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::ledger::model::{Account, LedgerEntry};
use crate::store::migrations;
use crate::store::model::{
    DeliveryLogEntry, DeliveryStatus, ForwardLogEntry, ForwardStatus, MessageIndexEntry,
    OrderKeys, RequesterType,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_decimal(s: &str) -> Decimal {
    s.trim().parse().unwrap_or(Decimal::ZERO)
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, DatabaseError> {
    serde_json::to_string(value)
        .map_err(|e| DatabaseError::Serialization(format!("{what}: {e}")))
}

fn str_to_forward_status(s: &str) -> ForwardStatus {
    match s {
        "logged_without_keys" => ForwardStatus::LoggedWithoutKeys,
        _ => ForwardStatus::Forwarded,
    }
}

fn str_to_requester_type(s: &str) -> RequesterType {
    match s {
        "pre_customer" => RequesterType::PreCustomer,
        _ => RequesterType::Customer,
    }
}

fn str_to_delivery_status(s: &str) -> DeliveryStatus {
    match s {
        "delivered" => DeliveryStatus::Delivered,
        "withheld" => DeliveryStatus::Withheld,
        "duplicate" => DeliveryStatus::Duplicate,
        "nid_made" => DeliveryStatus::NidMade,
        _ => DeliveryStatus::Unmatched,
    }
}

/// Column list for account queries.
const ACCOUNT_COLUMNS: &str = "id, role, balance, due, history, version, created_at, updated_at";

/// Map a libsql Row to an Account.
///
/// Column order matches ACCOUNT_COLUMNS.
fn row_to_account(row: &libsql::Row) -> Result<Account, libsql::Error> {
    let balance: String = row.get(2)?;
    let due: String = row.get(3)?;
    let history_json: String = row.get(4)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;

    let id: String = row.get(0)?;
    let history = decode_history(&id, &history_json);

    Ok(Account {
        id,
        role: row.get(1)?,
        balance: parse_decimal(&balance),
        due: parse_decimal(&due),
        history,
        version: row.get(5)?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Decode an account's history column.
///
/// A corrupt column loses history, not the balances, and is reported.
fn decode_history(account_id: &str, json: &str) -> Vec<LedgerEntry> {
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!(
            account = account_id,
            error = %e,
            "Corrupt ledger history, the next save will replace it"
        );
        Vec::new()
    })
}

const FORWARD_COLUMNS: &str = "timestamp, order_keys, order_tag, requester_id, message_body, \
     message_id, chat_id, relayed_message_id, destination_id, destination_type, status, \
     requester_type";

fn row_to_forward(row: &libsql::Row) -> Result<ForwardLogEntry, libsql::Error> {
    let ts: String = row.get(0)?;
    let keys: String = row.get(1)?;
    let status: String = row.get(10)?;
    let requester_type: String = row.get(11)?;

    Ok(ForwardLogEntry {
        timestamp: parse_datetime(&ts),
        order_keys: serde_json::from_str(&keys).unwrap_or_else(|_| OrderKeys::parse(&keys)),
        order_tag: row.get(2)?,
        requester_id: row.get(3)?,
        message_body: row.get(4)?,
        message_id: row.get(5)?,
        chat_id: row.get(6)?,
        relayed_message_id: row.get(7)?,
        destination_id: row.get(8)?,
        destination_type: row.get(9)?,
        status: str_to_forward_status(&status),
        requester_type: str_to_requester_type(&requester_type),
    })
}

const DELIVERY_COLUMNS: &str = "timestamp, order_keys, file_name, extracted_id_value, \
     resolved_ids, excerpt, message_id, status, source_type, content_hash";

fn row_to_delivery(row: &libsql::Row) -> Result<DeliveryLogEntry, libsql::Error> {
    let ts: String = row.get(0)?;
    let keys: String = row.get(1)?;
    let resolved: String = row.get(4)?;
    let status: String = row.get(7)?;

    Ok(DeliveryLogEntry {
        timestamp: parse_datetime(&ts),
        order_keys: serde_json::from_str(&keys).unwrap_or_else(|_| OrderKeys::parse(&keys)),
        file_name: row.get(2)?,
        extracted_id_value: row.get::<Option<String>>(3).ok().flatten(),
        resolved_ids: serde_json::from_str(&resolved).unwrap_or_default(),
        excerpt: row.get(5)?,
        message_id: row.get(6)?,
        status: str_to_delivery_status(&status),
        source_type: row.get(8)?,
        content_hash: row.get(9)?,
    })
}

// ── Database trait implementation ───────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.init_schema().await
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn get_account(&self, id: &str) -> Result<Option<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_account: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let account = row_to_account(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_account row parse: {e}")))?;
                Ok(Some(account))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_account: {e}"))),
        }
    }

    async fn insert_account(&self, account: &Account) -> Result<bool, DatabaseError> {
        let history = to_json(&account.history, "account history")?;
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO accounts (id, role, balance, due, history, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (id) DO NOTHING",
                params![
                    account.id.as_str(),
                    account.role.as_str(),
                    account.balance.to_string(),
                    account.due.to_string(),
                    history,
                    account.version,
                    account.created_at.to_rfc3339(),
                    account.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_account: {e}")))?;

        debug!(account = %account.id, inserted, "Account insert");
        Ok(inserted > 0)
    }

    async fn update_account(
        &self,
        account: &Account,
        expected_version: i64,
    ) -> Result<bool, DatabaseError> {
        let history = to_json(&account.history, "account history")?;
        let updated = self
            .conn()
            .execute(
                "UPDATE accounts
                 SET role = ?1, balance = ?2, due = ?3, history = ?4, version = ?5, updated_at = ?6
                 WHERE id = ?7 AND version = ?8",
                params![
                    account.role.as_str(),
                    account.balance.to_string(),
                    account.due.to_string(),
                    history,
                    account.version,
                    account.updated_at.to_rfc3339(),
                    account.id.as_str(),
                    expected_version,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_account: {e}")))?;

        Ok(updated > 0)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_accounts: {e}")))?;

        let mut accounts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let account = row_to_account(&row)
                .map_err(|e| DatabaseError::Query(format!("list_accounts row parse: {e}")))?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    // ── Rates ───────────────────────────────────────────────────────

    async fn get_rates(&self) -> Result<Vec<(String, Decimal)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT tag, amount FROM charge_rates ORDER BY seq", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("get_rates: {e}")))?;

        let mut rates = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let tag: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("get_rates row parse: {e}")))?;
            let amount: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("get_rates row parse: {e}")))?;
            rates.push((tag, parse_decimal(&amount)));
        }
        Ok(rates)
    }

    async fn upsert_rate(&self, tag: &str, amount: Decimal) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO charge_rates (tag, amount, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (tag) DO UPDATE SET amount = ?2, updated_at = ?3",
                params![tag, amount.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_rate: {e}")))?;

        info!(tag, %amount, "Charge rate saved");
        Ok(())
    }

    // ── Forward log ─────────────────────────────────────────────────

    async fn append_forward(
        &self,
        day: NaiveDate,
        entry: &ForwardLogEntry,
    ) -> Result<(), DatabaseError> {
        let keys = to_json(&entry.order_keys, "order keys")?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO forward_log (day, {FORWARD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    day_key(day),
                    entry.timestamp.to_rfc3339(),
                    keys,
                    entry.order_tag.as_str(),
                    entry.requester_id.as_str(),
                    entry.message_body.as_str(),
                    entry.message_id.as_str(),
                    entry.chat_id.as_str(),
                    entry.relayed_message_id.as_str(),
                    entry.destination_id.as_str(),
                    entry.destination_type.as_str(),
                    entry.status.as_str(),
                    entry.requester_type.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_forward: {e}")))?;

        debug!(requester = %entry.requester_id, keys = %entry.order_keys, "Forward logged");
        Ok(())
    }

    async fn forward_entries_since(
        &self,
        from_day: NaiveDate,
    ) -> Result<Vec<ForwardLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FORWARD_COLUMNS} FROM forward_log
                     WHERE day >= ?1 ORDER BY timestamp DESC, seq DESC"
                ),
                params![day_key(from_day)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("forward_entries_since: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let entry = row_to_forward(&row).map_err(|e| {
                DatabaseError::Query(format!("forward_entries_since row parse: {e}"))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    // ── Delivery log ────────────────────────────────────────────────

    async fn append_delivery(
        &self,
        day: NaiveDate,
        entry: &DeliveryLogEntry,
    ) -> Result<(), DatabaseError> {
        let keys = to_json(&entry.order_keys, "order keys")?;
        let resolved = to_json(&entry.resolved_ids, "resolved ids")?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO delivery_log (day, {DELIVERY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    day_key(day),
                    entry.timestamp.to_rfc3339(),
                    keys,
                    entry.file_name.as_str(),
                    entry.extracted_id_value.clone(),
                    resolved,
                    entry.excerpt.as_str(),
                    entry.message_id.as_str(),
                    entry.status.as_str(),
                    entry.source_type.as_str(),
                    entry.content_hash.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_delivery: {e}")))?;

        debug!(status = entry.status.as_str(), keys = %entry.order_keys, "Delivery logged");
        Ok(())
    }

    async fn delivery_entries_since(
        &self,
        from_day: NaiveDate,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DELIVERY_COLUMNS} FROM delivery_log
                     WHERE day >= ?1 ORDER BY timestamp DESC, seq DESC"
                ),
                params![day_key(from_day)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delivery_entries_since: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let entry = row_to_delivery(&row).map_err(|e| {
                DatabaseError::Query(format!("delivery_entries_since row parse: {e}"))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn delivery_entries_on(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<DeliveryLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DELIVERY_COLUMNS} FROM delivery_log
                     WHERE day = ?1 ORDER BY timestamp DESC, seq DESC"
                ),
                params![day_key(day)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delivery_entries_on: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let entry = row_to_delivery(&row).map_err(|e| {
                DatabaseError::Query(format!("delivery_entries_on row parse: {e}"))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    // ── Message index ───────────────────────────────────────────────

    async fn append_message_index(
        &self,
        day: NaiveDate,
        entry: &MessageIndexEntry,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO message_index (day, outbound_message_id, original_message_id, original_chat_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    day_key(day),
                    entry.outbound_message_id.as_str(),
                    entry.original_message_id.as_str(),
                    entry.original_chat_id.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message_index: {e}")))?;
        Ok(())
    }

    async fn find_message_index(
        &self,
        outbound_message_id: &str,
    ) -> Result<Option<MessageIndexEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT outbound_message_id, original_message_id, original_chat_id
                 FROM message_index WHERE outbound_message_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                params![outbound_message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_message_index: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let parse = |e: libsql::Error| {
                    DatabaseError::Query(format!("find_message_index row parse: {e}"))
                };
                Ok(Some(MessageIndexEntry {
                    outbound_message_id: row.get(0).map_err(parse)?,
                    original_message_id: row.get(1).map_err(parse)?,
                    original_chat_id: row.get(2).map_err(parse)?,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_message_index: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::model::EntryType;
    use rust_decimal_macros::dec;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn at(d: u32, hour: u32) -> DateTime<Utc> {
        day(d).and_hms_opt(hour, 0, 0).unwrap().and_utc()
    }

    fn forward(keys: &[&str], ts: DateTime<Utc>, requester: &str) -> ForwardLogEntry {
        ForwardLogEntry {
            timestamp: ts,
            order_keys: OrderKeys::new(keys.iter().copied()),
            order_tag: "SignCopy".into(),
            requester_id: requester.into(),
            message_body: format!("please process {}", keys.join(" ")),
            message_id: format!("msg-{requester}"),
            chat_id: format!("{requester}@c.us"),
            relayed_message_id: format!("out-{requester}"),
            destination_id: "8801700000001".into(),
            destination_type: "sign_copy".into(),
            status: ForwardStatus::Forwarded,
            requester_type: RequesterType::PreCustomer,
        }
    }

    fn delivery(hash: &str, ts: DateTime<Utc>) -> DeliveryLogEntry {
        DeliveryLogEntry {
            timestamp: ts,
            order_keys: OrderKeys::new(["12345678901"]),
            file_name: "doc.pdf".into(),
            extracted_id_value: Some("12345678901".into()),
            resolved_ids: vec!["8801811111111".into()],
            excerpt: "National ID12345678901".into(),
            message_id: "office-msg-1".into(),
            status: DeliveryStatus::Delivered,
            source_type: "sign_copy".into(),
            content_hash: hash.into(),
        }
    }

    // ── Account tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn corrupt_history_keeps_balances() {
        let db = test_db().await;
        let mut acc = Account::new("8801811111111", Utc::now());
        acc.due = dec!(70);
        assert!(db.insert_account(&acc).await.unwrap());
        db.conn()
            .execute(
                "UPDATE accounts SET history = ?1 WHERE id = ?2",
                params!["{not json", "8801811111111"],
            )
            .await
            .unwrap();

        let loaded = db.get_account("8801811111111").await.unwrap().unwrap();
        assert_eq!(loaded.due, dec!(70));
        assert!(loaded.history.is_empty());
    }

    #[tokio::test]
    async fn insert_and_get_account() {
        let db = test_db().await;
        let now = Utc::now();
        let mut acc = Account::new("8801811111111", now);
        acc.balance = dec!(30);
        acc.due = dec!(0);
        acc.version = 1;
        acc.history
            .push(LedgerEntry::new(EntryType::Deposit, dec!(80), "cash", now));

        assert!(db.insert_account(&acc).await.unwrap());
        let fetched = db.get_account("8801811111111").await.unwrap().unwrap();
        assert_eq!(fetched.balance, dec!(30));
        assert_eq!(fetched.role, "Customer");
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.history.len(), 1);
        assert_eq!(fetched.history[0].entry_type, EntryType::Deposit);
    }

    #[tokio::test]
    async fn insert_account_twice_reports_conflict() {
        let db = test_db().await;
        let mut acc = Account::new("1", Utc::now());
        acc.version = 1;
        assert!(db.insert_account(&acc).await.unwrap());
        assert!(!db.insert_account(&acc).await.unwrap());
    }

    #[tokio::test]
    async fn get_account_not_found() {
        let db = test_db().await;
        assert!(db.get_account("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_account_checks_version() {
        let db = test_db().await;
        let mut acc = Account::new("1", Utc::now());
        acc.version = 1;
        db.insert_account(&acc).await.unwrap();

        acc.balance = dec!(10);
        acc.version = 2;
        assert!(db.update_account(&acc, 1).await.unwrap());

        // Stale writer still thinks the version is 1.
        acc.balance = dec!(99);
        acc.version = 2;
        assert!(!db.update_account(&acc, 1).await.unwrap());

        let stored = db.get_account("1").await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(10));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn list_accounts_sorted() {
        let db = test_db().await;
        for id in ["b", "a", "c"] {
            let mut acc = Account::new(id, Utc::now());
            acc.version = 1;
            db.insert_account(&acc).await.unwrap();
        }
        let ids: Vec<String> = db
            .list_accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    // ── Rate tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_rate_keeps_original_spelling() {
        let db = test_db().await;
        db.upsert_rate("SignCopy", dec!(50)).await.unwrap();
        db.upsert_rate("default", dec!(40)).await.unwrap();
        db.upsert_rate("signcopy", dec!(55)).await.unwrap();

        let rates = db.get_rates().await.unwrap();
        assert_eq!(
            rates,
            vec![("SignCopy".to_string(), dec!(55)), ("default".to_string(), dec!(40))]
        );
    }

    // ── Log tests ───────────────────────────────────────────────────

    #[tokio::test]
    async fn forward_entries_most_recent_first_within_window() {
        let db = test_db().await;
        db.append_forward(day(1), &forward(&["111111"], at(1, 4), "old"))
            .await
            .unwrap();
        db.append_forward(day(2), &forward(&["222222"], at(2, 4), "early"))
            .await
            .unwrap();
        db.append_forward(day(2), &forward(&["333333", "444444"], at(2, 9), "late"))
            .await
            .unwrap();

        let entries = db.forward_entries_since(day(2)).await.unwrap();
        let who: Vec<&str> = entries.iter().map(|e| e.requester_id.as_str()).collect();
        assert_eq!(who, vec!["late", "early"]);
        assert_eq!(entries[0].order_keys.len(), 2);
        assert_eq!(entries[0].requester_type, RequesterType::PreCustomer);

        let all = db.forward_entries_since(day(1)).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn legacy_delimited_order_keys_are_normalized() {
        let db = test_db().await;
        db.conn()
            .execute(
                &format!(
                    "INSERT INTO forward_log (day, {FORWARD_COLUMNS}) VALUES
                     ('2026-04-02', '2026-04-02T04:00:00Z', '123456, 7890123 ', 'SignCopy', 'r', 'b',
                      'm', 'c', 'o', 'd', 'sign_copy', 'forwarded', 'customer')"
                ),
                (),
            )
            .await
            .unwrap();

        let entries = db.forward_entries_since(day(2)).await.unwrap();
        assert!(entries[0].order_keys.contains("7890123"));
        assert_eq!(entries[0].requester_type, RequesterType::Customer);
    }

    #[tokio::test]
    async fn delivery_round_trip_and_day_filter() {
        let db = test_db().await;
        db.append_delivery(day(1), &delivery("aa", at(1, 5))).await.unwrap();
        db.append_delivery(day(2), &delivery("bb", at(2, 5))).await.unwrap();

        let today = db.delivery_entries_on(day(2)).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].content_hash, "bb");
        assert_eq!(today[0].status, DeliveryStatus::Delivered);
        assert_eq!(today[0].resolved_ids, vec!["8801811111111".to_string()]);
        assert_eq!(today[0].extracted_id_value.as_deref(), Some("12345678901"));

        let since = db.delivery_entries_since(day(1)).await.unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].content_hash, "bb");
    }

    #[tokio::test]
    async fn delivery_without_extracted_id() {
        let db = test_db().await;
        let mut entry = delivery("cc", at(3, 5));
        entry.extracted_id_value = None;
        entry.status = DeliveryStatus::Unmatched;
        db.append_delivery(day(3), &entry).await.unwrap();

        let fetched = db.delivery_entries_on(day(3)).await.unwrap();
        assert_eq!(fetched[0].extracted_id_value, None);
        assert_eq!(fetched[0].status, DeliveryStatus::Unmatched);
    }

    #[tokio::test]
    async fn message_index_latest_wins() {
        let db = test_db().await;
        let mk = |orig: &str| MessageIndexEntry {
            outbound_message_id: "out-1".into(),
            original_message_id: orig.into(),
            original_chat_id: "chat".into(),
        };
        db.append_message_index(day(1), &mk("first")).await.unwrap();
        db.append_message_index(day(1), &mk("second")).await.unwrap();

        let found = db.find_message_index("out-1").await.unwrap().unwrap();
        assert_eq!(found.original_message_id, "second");
        assert!(db.find_message_index("out-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_rate("default", dec!(25)).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.get_rates().await.unwrap()[0].1, dec!(25));
    }
}
