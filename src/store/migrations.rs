//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "accounts_and_rates",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL DEFAULT 'Customer',
                balance TEXT NOT NULL DEFAULT '0',
                due TEXT NOT NULL DEFAULT '0',
                history TEXT NOT NULL DEFAULT '[]',
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS charge_rates (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                tag TEXT NOT NULL UNIQUE COLLATE NOCASE,
                amount TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
    Migration {
        version: 2,
        name: "forward_and_delivery_logs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS forward_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                day TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                order_keys TEXT NOT NULL DEFAULT '[]',
                order_tag TEXT NOT NULL,
                requester_id TEXT NOT NULL,
                message_body TEXT NOT NULL,
                message_id TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                relayed_message_id TEXT NOT NULL,
                destination_id TEXT NOT NULL,
                destination_type TEXT NOT NULL,
                status TEXT NOT NULL,
                requester_type TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_forward_log_day ON forward_log(day);
            CREATE INDEX IF NOT EXISTS idx_forward_log_requester ON forward_log(requester_id);

            CREATE TABLE IF NOT EXISTS delivery_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                day TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                order_keys TEXT NOT NULL DEFAULT '[]',
                file_name TEXT NOT NULL,
                extracted_id_value TEXT,
                resolved_ids TEXT NOT NULL DEFAULT '[]',
                excerpt TEXT NOT NULL,
                message_id TEXT NOT NULL,
                status TEXT NOT NULL,
                source_type TEXT NOT NULL,
                content_hash TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_delivery_log_day ON delivery_log(day);
            CREATE INDEX IF NOT EXISTS idx_delivery_log_hash ON delivery_log(content_hash);
        "#,
    },
    Migration {
        version: 3,
        name: "message_index",
        sql: r#"
            CREATE TABLE IF NOT EXISTS message_index (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                day TEXT NOT NULL,
                outbound_message_id TEXT NOT NULL,
                original_message_id TEXT NOT NULL,
                original_chat_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_message_index_outbound
                ON message_index(outbound_message_id);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
