//! Persistent idempotency ledger and scan watermark.
//!
//! Backed by SQLite through sqlx. The ledger records one row per source
//! order ever handled, keyed by the commerce platform's order id, so a
//! pass can cheaply skip work that already happened. The watermark table
//! holds the lower bound of the next incremental scan.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Terminal outcome of handling one order in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The issue tag was applied (or was already present downstream).
    Tagged,
    /// The order was not found in the fulfillment service.
    NotFound,
    /// Lookup or tagging failed with an error.
    Error,
}

impl OutcomeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Tagged => "tagged",
            OutcomeStatus::NotFound => "not_found",
            OutcomeStatus::Error => "error",
        }
    }
}

impl FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tagged" => Ok(OutcomeStatus::Tagged),
            "not_found" => Ok(OutcomeStatus::NotFound),
            "error" => Ok(OutcomeStatus::Error),
            other => Err(format!("unknown outcome status: {other}")),
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    /// Source order id on the commerce platform.
    pub source_id: String,

    /// Human-facing order number.
    pub order_number: String,

    /// Fulfillment-side order id, when the order was found there.
    pub destination_id: Option<String>,

    /// Outcome of the most recent handling.
    pub status: OutcomeStatus,

    /// Free-form note, e.g. the error message for `Error` entries.
    pub note: Option<String>,

    /// When the order was first recorded.
    pub created_at: DateTime<Utc>,

    /// When the entry was last written.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    source_id: String,
    order_number: String,
    destination_id: Option<String>,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_entry(self) -> LedgerEntry {
        LedgerEntry {
            source_id: self.source_id,
            order_number: self.order_number,
            destination_id: self.destination_id,
            // Unknown statuses from a newer schema degrade to Error.
            status: self.status.parse().unwrap_or(OutcomeStatus::Error),
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const WATERMARK_NAME: &str = "order_scan";

/// SQLite-backed ledger store.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open (and if necessary create) the ledger database.
    ///
    /// The pool is capped at a single connection: the engine is the only
    /// writer, and this keeps in-memory databases coherent in tests.
    pub async fn connect(database_url: &str) -> SyncResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                SyncError::configuration(format!("invalid database URL '{database_url}': {e}"))
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> SyncResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_watermarks (
                name        TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS order_ledger (
                source_id       TEXT PRIMARY KEY,
                order_number    TEXT NOT NULL,
                destination_id  TEXT,
                status          TEXT NOT NULL,
                note            TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_order_ledger_status ON order_ledger (status)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Ledger schema ready");
        Ok(())
    }

    /// Read the scan watermark, if one has been stored.
    pub async fn watermark(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT value FROM sync_watermarks WHERE name = ?")
                .bind(WATERMARK_NAME)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Store the scan watermark.
    ///
    /// The watermark never moves backwards; an older value is ignored
    /// with a warning.
    pub async fn set_watermark(&self, value: DateTime<Utc>) -> SyncResult<()> {
        if let Some(current) = self.watermark().await? {
            if value < current {
                warn!(
                    current = %current,
                    proposed = %value,
                    "Ignoring attempt to move watermark backwards"
                );
                return Ok(());
            }
        }

        sqlx::query(
            r"
            INSERT INTO sync_watermarks (name, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(WATERMARK_NAME)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(watermark = %value, "Watermark advanced");
        Ok(())
    }

    /// Look up the ledger entry for a source order id.
    pub async fn find(&self, source_id: &str) -> SyncResult<Option<LedgerEntry>> {
        let row: Option<LedgerRow> =
            sqlx::query_as("SELECT * FROM order_ledger WHERE source_id = ?")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(LedgerRow::into_entry))
    }

    /// Record the outcome of handling one order.
    ///
    /// Upserts on the source id: re-recording an order updates its status,
    /// note and `updated_at` but preserves the original `created_at`.
    pub async fn record_outcome(
        &self,
        source_id: &str,
        order_number: &str,
        destination_id: Option<&str>,
        status: OutcomeStatus,
        note: Option<&str>,
    ) -> SyncResult<()> {
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO order_ledger
                (source_id, order_number, destination_id, status, note, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_id) DO UPDATE SET
                order_number = excluded.order_number,
                destination_id = excluded.destination_id,
                status = excluded.status,
                note = excluded.note,
                updated_at = excluded.updated_at
            ",
        )
        .bind(source_id)
        .bind(order_number)
        .bind(destination_id)
        .bind(status.as_str())
        .bind(note)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entry counts grouped by outcome status.
    pub async fn stats(&self) -> SyncResult<HashMap<OutcomeStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM order_ledger GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Ok(parsed) = status.parse::<OutcomeStatus>() {
                counts.insert(parsed, count);
            }
        }
        Ok(counts)
    }

    /// The most recently updated entries, newest first.
    pub async fn recent(&self, limit: u32) -> SyncResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT * FROM order_ledger ORDER BY updated_at DESC, source_id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LedgerRow::into_entry).collect())
    }
}
