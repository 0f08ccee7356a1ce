//! Shared types for the settlement engine.
//!
//! These types form the data model used across all modules: slot keys,
//! series, aggregated stakes, winning entries and the settlement record
//! that is handed to storage and to the claims side.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Draw slot
// ---------------------------------------------------------------------------

/// Identifies one settlement opportunity: operator + draw date + draw time.
///
/// The draw time is stored normalized (leading hour zero stripped), so
/// `"08:45 PM"` and `"8:45 PM"` name the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub operator_id: String,
    pub draw_date: String,
    pub draw_time: String,
}

impl SlotKey {
    /// Build a slot key, rejecting blank identifiers.
    pub fn new(operator_id: &str, draw_date: &str, draw_time: &str) -> Result<Self, SettleError> {
        let operator_id = operator_id.trim();
        let draw_date = draw_date.trim();
        let draw_time = normalize_draw_time(draw_time);

        if operator_id.is_empty() {
            return Err(SettleError::InvalidInput("operatorId is required".into()));
        }
        if draw_date.is_empty() {
            return Err(SettleError::InvalidInput("drawDate is required".into()));
        }
        if draw_time.is_empty() {
            return Err(SettleError::InvalidInput("drawTime is required".into()));
        }

        Ok(Self {
            operator_id: operator_id.to_string(),
            draw_date: draw_date.to_string(),
            draw_time,
        })
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.operator_id, self.draw_date, self.draw_time)
    }
}

/// Strip surrounding whitespace and a leading zero from the hour:
/// `"08:45 PM"` becomes `"8:45 PM"`.
pub fn normalize_draw_time(raw: &str) -> String {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'0' && bytes[1].is_ascii_digit() && bytes[2] == b':' {
        trimmed[1..].to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// One of the three disjoint prefix ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Series {
    A,
    B,
    C,
}

impl Series {
    /// Processing order used by the selector.
    pub const ALL: [Series; 3] = [Series::A, Series::B, Series::C];

    /// First prefix of the series.
    pub fn first_prefix(self) -> u8 {
        match self {
            Series::A => 10,
            Series::B => 30,
            Series::C => 50,
        }
    }

    /// The ten prefixes of this series, ascending.
    pub fn prefixes(self) -> impl Iterator<Item = u8> {
        let start = self.first_prefix();
        start..start + 10
    }

    /// Series owning a two-digit prefix, if any.
    pub fn of_prefix(prefix: u8) -> Option<Series> {
        Series::ALL
            .into_iter()
            .find(|s| (s.first_prefix()..s.first_prefix() + 10).contains(&prefix))
    }

    /// Display label used in grouped views, e.g. `"10-19"`.
    pub fn label(self) -> &'static str {
        match self {
            Series::A => "10-19",
            Series::B => "30-39",
            Series::C => "50-59",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Total number of prefixes, and so of winning entries per record.
pub const PREFIX_COUNT: usize = 30;

/// Two leading digits of a canonical four-digit symbol.
pub fn prefix_of(symbol: &str) -> Option<u8> {
    if symbol.len() != 4 || !symbol.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    symbol[..2].parse().ok()
}

/// Series of a canonical four-digit symbol, if it belongs to one.
pub fn series_of(symbol: &str) -> Option<Series> {
    prefix_of(symbol).and_then(Series::of_prefix)
}

// ---------------------------------------------------------------------------
// Stakes
// ---------------------------------------------------------------------------

/// A single `(symbol, amount)` pair parsed out of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeEntry {
    pub symbol: String,
    pub amount: Decimal,
}

/// Symbol → total staked amount for one slot.
///
/// Ordered by symbol so iteration (and therefore tie-breaking) is stable.
pub type AggregatedStake = BTreeMap<String, Decimal>;

/// Raw ticket as handed over by the ticket store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub id: i64,
    pub operator_id: String,
    /// `"DD-MM-YYYY HH:MM:SS"`
    pub game_time: String,
    /// Free-form stake string (delimited pairs or JSON).
    pub ticket_number: String,
    /// JSON array of draw times, or a single draw time.
    pub draw_times: String,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// One declared winning symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningEntry {
    pub symbol: String,
    pub payout: Decimal,
    /// True when the symbol was synthesized rather than staked.
    #[serde(default)]
    pub filler: bool,
}

impl WinningEntry {
    pub fn prefix(&self) -> Option<u8> {
        prefix_of(&self.symbol)
    }
}

/// Stake breakdown for one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesStake {
    pub series: Series,
    pub entries: u32,
    pub gross: Decimal,
    pub commission_amount: Decimal,
    pub net: Decimal,
}

/// The immutable outcome of settling one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub slot: SlotKey,
    /// One entry per prefix, in processing order (series A, B, C; ascending prefix).
    pub winning_entries: Vec<WinningEntry>,
    pub gross_stake: Decimal,
    pub commission_rate: Decimal,
    pub payout_ratio: Decimal,
    pub net_budget: Decimal,
    pub allocated_total: Decimal,
    #[serde(default)]
    pub series_stakes: Vec<SeriesStake>,
    pub created_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// Winning entries belonging to one series.
    pub fn entries_for(&self, series: Series) -> Vec<&WinningEntry> {
        self.winning_entries
            .iter()
            .filter(|e| e.prefix().and_then(Series::of_prefix) == Some(series))
            .collect()
    }

    /// Look up the winning entry for a symbol (claim matching).
    pub fn winner(&self, symbol: &str) -> Option<&WinningEntry> {
        self.winning_entries.iter().find(|e| e.symbol == symbol)
    }
}

impl fmt::Display for SettlementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settlement {}: gross={} budget={} allocated={} winners={}",
            self.slot,
            self.gross_stake,
            self.net_budget,
            self.allocated_total,
            self.winning_entries.iter().filter(|e| !e.filler).count(),
        )
    }
}

/// Serialized form for API consumers: flat list, series-grouped symbols and totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementView {
    pub id: Uuid,
    pub operator_id: String,
    pub draw_date: String,
    pub draw_time: String,
    pub winning_numbers: Vec<WinningEntry>,
    pub grouped_winning_numbers: BTreeMap<&'static str, Vec<String>>,
    pub gross_stake: Decimal,
    pub commission_rate: Decimal,
    pub payout_ratio: Decimal,
    pub net_budget: Decimal,
    pub allocated_total: Decimal,
    pub series_stakes: Vec<SeriesStake>,
    pub created_at: DateTime<Utc>,
}

impl From<&SettlementRecord> for SettlementView {
    fn from(record: &SettlementRecord) -> Self {
        let grouped_winning_numbers = Series::ALL
            .iter()
            .map(|&series| {
                let symbols = record
                    .entries_for(series)
                    .into_iter()
                    .map(|e| e.symbol.clone())
                    .collect();
                (series.label(), symbols)
            })
            .collect();

        Self {
            id: record.id,
            operator_id: record.slot.operator_id.clone(),
            draw_date: record.slot.draw_date.clone(),
            draw_time: record.slot.draw_time.clone(),
            winning_numbers: record.winning_entries.clone(),
            grouped_winning_numbers,
            gross_stake: record.gross_stake,
            commission_rate: record.commission_rate,
            payout_ratio: record.payout_ratio,
            net_budget: record.net_budget,
            allocated_total: record.allocated_total,
            series_stakes: record.series_stakes.clone(),
            created_at: record.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure taxonomy of a settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operator not found: {0}")]
    OperatorNotFound(String),

    #[error("No unused filler symbol left for prefix {prefix}")]
    SeriesExhausted { prefix: u8 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl SettleError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettleError::StorageUnavailable(_) | SettleError::Timeout(_))
    }

    /// Whether the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SettleError::InvalidInput(_) | SettleError::OperatorNotFound(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
