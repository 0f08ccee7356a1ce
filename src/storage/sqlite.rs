//! SQLite backend (sqlx).
//!
//! The `settlements` table carries a unique constraint on the slot key;
//! `create_if_absent` relies on `ON CONFLICT DO NOTHING`, so concurrent
//! declarations for one slot resolve to a single row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{OperatorDirectory, PayoutSettings, SettlementStore, TicketSource};
use crate::types::{Series, SeriesStake, SettlementRecord, SlotKey, TicketRecord, WinningEntry};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS operators (
        id TEXT PRIMARY KEY,
        commission_rate TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS payout_settings (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        percentage TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operator_id TEXT NOT NULL,
        game_time TEXT NOT NULL,
        ticket_number TEXT NOT NULL,
        draw_times TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tickets_operator ON tickets (operator_id)",
    r#"
    CREATE TABLE IF NOT EXISTS settlements (
        id TEXT PRIMARY KEY,
        operator_id TEXT NOT NULL,
        draw_date TEXT NOT NULL,
        draw_time TEXT NOT NULL,
        record_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (operator_id, draw_date, draw_time)
    )
    "#,
];

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true);

        // Each connection to `sqlite::memory:` is a separate database.
        let max_connections = if url.contains(":memory:") { 1 } else { max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, max_connections, "Database ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        Ok(())
    }

    pub async fn upsert_operator(&self, operator_id: &str, commission_rate: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO operators (id, commission_rate) VALUES (?, ?)
            ON CONFLICT (id) DO UPDATE SET commission_rate = excluded.commission_rate
            "#,
        )
        .bind(operator_id)
        .bind(commission_rate.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to upsert operator")?;
        Ok(())
    }

    pub async fn set_payout_ratio(&self, percentage: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payout_settings (id, percentage, updated_at) VALUES (1, ?, ?)
            ON CONFLICT (id) DO UPDATE
                SET percentage = excluded.percentage, updated_at = excluded.updated_at
            "#,
        )
        .bind(percentage.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to store payout ratio")?;
        Ok(())
    }

    /// Insert a ticket, returning its row id.
    pub async fn insert_ticket(
        &self,
        operator_id: &str,
        game_time: &str,
        ticket_number: &str,
        draw_times: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (operator_id, game_time, ticket_number, draw_times)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(operator_id)
        .bind(game_time)
        .bind(ticket_number)
        .bind(draw_times)
        .execute(&self.pool)
        .await
        .context("Failed to insert ticket")?;
        Ok(result.last_insert_rowid())
    }
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("Corrupt decimal in {column}: {raw}"))
}

// ---------------------------------------------------------------------------
// Stored record shape
// ---------------------------------------------------------------------------

/// `record_json` layout. Amounts are written as decimal strings so a
/// record reads back exactly as it was declared.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    id: Uuid,
    slot: SlotKey,
    winning_entries: Vec<StoredEntry>,
    #[serde(with = "rust_decimal::serde::str")]
    gross_stake: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    commission_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    payout_ratio: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    net_budget: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    allocated_total: Decimal,
    series_stakes: Vec<StoredSeriesStake>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    payout: Decimal,
    filler: bool,
}

#[derive(Serialize, Deserialize)]
struct StoredSeriesStake {
    series: Series,
    entries: u32,
    #[serde(with = "rust_decimal::serde::str")]
    gross: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    commission_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    net: Decimal,
}

impl From<&SettlementRecord> for StoredRecord {
    fn from(r: &SettlementRecord) -> Self {
        Self {
            id: r.id,
            slot: r.slot.clone(),
            winning_entries: r
                .winning_entries
                .iter()
                .map(|e| StoredEntry {
                    symbol: e.symbol.clone(),
                    payout: e.payout,
                    filler: e.filler,
                })
                .collect(),
            gross_stake: r.gross_stake,
            commission_rate: r.commission_rate,
            payout_ratio: r.payout_ratio,
            net_budget: r.net_budget,
            allocated_total: r.allocated_total,
            series_stakes: r
                .series_stakes
                .iter()
                .map(|s| StoredSeriesStake {
                    series: s.series,
                    entries: s.entries,
                    gross: s.gross,
                    commission_amount: s.commission_amount,
                    net: s.net,
                })
                .collect(),
            created_at: r.created_at,
        }
    }
}

impl From<StoredRecord> for SettlementRecord {
    fn from(r: StoredRecord) -> Self {
        Self {
            id: r.id,
            slot: r.slot,
            winning_entries: r
                .winning_entries
                .into_iter()
                .map(|e| WinningEntry {
                    symbol: e.symbol,
                    payout: e.payout,
                    filler: e.filler,
                })
                .collect(),
            gross_stake: r.gross_stake,
            commission_rate: r.commission_rate,
            payout_ratio: r.payout_ratio,
            net_budget: r.net_budget,
            allocated_total: r.allocated_total,
            series_stakes: r
                .series_stakes
                .into_iter()
                .map(|s| SeriesStake {
                    series: s.series,
                    entries: s.entries,
                    gross: s.gross,
                    commission_amount: s.commission_amount,
                    net: s.net,
                })
                .collect(),
            created_at: r.created_at,
        }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<SettlementRecord> {
    let json: String = row.try_get("record_json")?;
    let stored: StoredRecord = serde_json::from_str(&json).context("Corrupt settlement record")?;
    Ok(stored.into())
}

#[async_trait]
impl TicketSource for SqliteStore {
    async fn stakes_for_slot(&self, slot: &SlotKey) -> Result<Vec<TicketRecord>> {
        // Draw date and draw times live inside free-form columns; the
        // aggregator narrows this down further.
        let rows = sqlx::query(
            r#"
            SELECT id, operator_id, game_time, ticket_number, draw_times
            FROM tickets
            WHERE operator_id = ? AND game_time LIKE ?
            ORDER BY id ASC
            "#,
        )
        .bind(&slot.operator_id)
        .bind(format!("{}%", slot.draw_date))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query tickets")?;

        let tickets = rows
            .iter()
            .map(|row| -> Result<TicketRecord> {
                Ok(TicketRecord {
                    id: row.try_get("id")?,
                    operator_id: row.try_get("operator_id")?,
                    game_time: row.try_get("game_time")?,
                    ticket_number: row.try_get("ticket_number")?,
                    draw_times: row.try_get("draw_times")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(slot = %slot, count = tickets.len(), "Tickets loaded");
        Ok(tickets)
    }
}

#[async_trait]
impl OperatorDirectory for SqliteStore {
    async fn commission_rate_of(&self, operator_id: &str) -> Result<Option<Decimal>> {
        let row = sqlx::query("SELECT commission_rate FROM operators WHERE id = ?")
            .bind(operator_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query operator")?;

        row.map(|r| -> Result<Decimal> {
            let raw: String = r.try_get("commission_rate")?;
            parse_decimal(&raw, "operators.commission_rate")
        })
        .transpose()
    }
}

#[async_trait]
impl PayoutSettings for SqliteStore {
    async fn current_payout_ratio(&self) -> Result<Decimal> {
        let row = sqlx::query("SELECT percentage FROM payout_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query payout ratio")?;

        match row {
            Some(r) => {
                let raw: String = r.try_get("percentage")?;
                parse_decimal(&raw, "payout_settings.percentage")
            }
            None => Ok(Decimal::ZERO),
        }
    }
}

#[async_trait]
impl SettlementStore for SqliteStore {
    async fn find(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>> {
        let row = sqlx::query(
            r#"
            SELECT record_json FROM settlements
            WHERE operator_id = ? AND draw_date = ? AND draw_time = ?
            "#,
        )
        .bind(&slot.operator_id)
        .bind(&slot.draw_date)
        .bind(&slot.draw_time)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query settlement")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn create_if_absent(&self, record: SettlementRecord) -> Result<SettlementRecord> {
        let json = serde_json::to_string(&StoredRecord::from(&record))
            .context("Failed to serialise settlement")?;

        let result = sqlx::query(
            r#"
            INSERT INTO settlements
                (id, operator_id, draw_date, draw_time, record_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (operator_id, draw_date, draw_time) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.slot.operator_id)
        .bind(&record.slot.draw_date)
        .bind(&record.slot.draw_time)
        .bind(&json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert settlement")?;

        if result.rows_affected() == 1 {
            debug!(slot = %record.slot, id = %record.id, "Settlement inserted");
            return Ok(record);
        }

        // Lost the race (or a retry): the stored row is authoritative.
        self.find(&record.slot)
            .await?
            .with_context(|| format!("Settlement for {} vanished after conflict", record.slot))
    }

    async fn list_for_operator_date(
        &self,
        operator_id: &str,
        draw_date: &str,
    ) -> Result<Vec<SettlementRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT record_json FROM settlements
            WHERE operator_id = ? AND draw_date = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(operator_id)
        .bind(draw_date)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list settlements")?;

        rows.iter().map(record_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
