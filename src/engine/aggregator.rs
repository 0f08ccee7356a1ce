//! Stake aggregator: tolerant ticket parsing and per-symbol summation.
//!
//! Ticket stake strings have drifted across historical versions
//! (`"30-00 : 5, 30-12 : 10"`, JSON objects, JSON arrays of objects).
//! All of that variance is absorbed by [`parse_stakes`]; everything past
//! it only sees canonical `(symbol, amount)` pairs.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

use crate::types::{
    normalize_draw_time, series_of, AggregatedStake, SettleError, SlotKey, StakeEntry,
    TicketRecord,
};

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a raw stake string into canonical entries.
///
/// Malformed pairs are skipped, never fatal.
pub fn parse_stakes(raw: &str) -> Vec<StakeEntry> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if raw.starts_with('{') || raw.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(raw) {
            return parse_json(&value);
        }
    }

    raw.split(',').filter_map(parse_pair).collect()
}

/// `"30-00 : 5"` → `StakeEntry { "3000", 5 }`
fn parse_pair(pair: &str) -> Option<StakeEntry> {
    let (symbol, amount) = pair.split_once(':')?;
    let entry = make_entry(symbol, amount.trim());
    if entry.is_none() {
        debug!(pair = pair.trim(), "Skipping malformed stake pair");
    }
    entry
}

fn parse_json(value: &Value) -> Vec<StakeEntry> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(symbol, amount)| make_entry(symbol, &json_amount(amount)?))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                let symbol = obj
                    .get("ticketNumber")
                    .or_else(|| obj.get("number"))
                    .and_then(json_amount)?;
                let amount = obj
                    .get("quantity")
                    .or_else(|| obj.get("points"))
                    .or_else(|| obj.get("value"))
                    .and_then(json_amount)?;
                make_entry(&symbol, &amount)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a JSON scalar as text so it can go through the same parsing path.
fn json_amount(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn make_entry(symbol: &str, amount: &str) -> Option<StakeEntry> {
    let symbol = canonical_symbol(symbol)?;
    let amount = Decimal::from_str(amount)
        .or_else(|_| Decimal::from_scientific(amount))
        .ok()?;
    if amount.is_sign_negative() {
        return None;
    }
    Some(StakeEntry { symbol, amount })
}

/// Strip separators and keep the symbol only if it is four digits in a series.
pub fn canonical_symbol(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    series_of(&digits).map(|_| digits)
}

// ---------------------------------------------------------------------------
// Slot membership
// ---------------------------------------------------------------------------

/// Decides whether a ticket takes part in a given slot.
#[derive(Debug, Clone)]
pub struct SlotFilter<'a> {
    slot: &'a SlotKey,
}

impl<'a> SlotFilter<'a> {
    pub fn new(slot: &'a SlotKey) -> Self {
        Self { slot }
    }

    pub fn matches(&self, ticket: &TicketRecord) -> bool {
        ticket.operator_id.trim() == self.slot.operator_id
            && draw_date_of(&ticket.game_time) == self.slot.draw_date
            && draw_times_of(&ticket.draw_times)
                .iter()
                .any(|t| *t == self.slot.draw_time)
    }
}

/// `"27-07-2025 11:34:24"` → `"27-07-2025"`
pub fn draw_date_of(game_time: &str) -> &str {
    game_time.split_whitespace().next().unwrap_or("")
}

/// Requested draw times of a ticket, normalized.
pub fn draw_times_of(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let times = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Ok(Value::String(s)) => vec![s],
        _ => vec![raw.to_string()],
    };

    times
        .iter()
        .map(|t| normalize_draw_time(t))
        .filter(|t| !t.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Sum stakes per symbol over the tickets belonging to `slot`.
///
/// Order-independent; an empty result is a valid outcome.
pub fn aggregate<'t, I>(tickets: I, slot: &SlotKey) -> AggregatedStake
where
    I: IntoIterator<Item = &'t TicketRecord>,
{
    let filter = SlotFilter::new(slot);
    let mut totals = AggregatedStake::new();
    let mut matched = 0usize;

    for ticket in tickets.into_iter().filter(|t| filter.matches(t)) {
        matched += 1;
        for entry in parse_stakes(&ticket.ticket_number) {
            let total = totals.entry(entry.symbol).or_insert(Decimal::ZERO);
            match total.checked_add(entry.amount) {
                Some(sum) => *total = sum,
                None => debug!(ticket = ticket.id, amount = %entry.amount, "Skipping overflowing stake"),
            }
        }
    }

    debug!(slot = %slot, tickets = matched, symbols = totals.len(), "Stakes aggregated");
    totals
}

/// Sum of all aggregated amounts.
pub fn gross_stake(stakes: &AggregatedStake) -> Result<Decimal, SettleError> {
    stakes
        .values()
        .try_fold(Decimal::ZERO, |sum, amount| sum.checked_add(*amount))
        .ok_or_else(|| SettleError::InvalidInput("gross stake exceeds the representable range".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
