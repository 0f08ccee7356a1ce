//! Shared builders for integration tests.
//!
//! Everything is deterministic: tickets are plain data and settlers are
//! built with a fixed filler seed.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

use drawsettle::engine::Settler;
use drawsettle::storage::MemoryStore;
use drawsettle::types::{Series, SettlementRecord, SlotKey, TicketRecord, PREFIX_COUNT};

pub const OPERATOR: &str = "7";
pub const DRAW_DATE: &str = "27-07-2025";
pub const DRAW_TIME: &str = "8:45 PM";

pub fn slot() -> SlotKey {
    SlotKey::new(OPERATOR, DRAW_DATE, DRAW_TIME).unwrap()
}

pub fn ticket(id: i64, stakes: &str) -> TicketRecord {
    TicketRecord {
        id,
        operator_id: OPERATOR.to_string(),
        game_time: format!("{DRAW_DATE} 10:{:02}:00", id % 60),
        ticket_number: stakes.to_string(),
        draw_times: format!(r#"["0{DRAW_TIME}", "9:00 PM"]"#),
    }
}

/// Memory backend with one operator and a global payout ratio.
pub async fn memory_backend(
    commission: Decimal,
    payout_ratio: Decimal,
    tickets: Vec<TicketRecord>,
) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set_operator(OPERATOR, commission).await;
    store.set_payout_ratio(payout_ratio).await;
    for t in tickets {
        store.add_ticket(t).await;
    }
    store
}

pub fn settler(store: Arc<MemoryStore>) -> Settler {
    Settler::from_backend(store).with_rng_seed(Some(2025))
}

/// Structural checks every declared record must pass.
pub fn assert_well_formed(record: &SettlementRecord) {
    assert_eq!(record.winning_entries.len(), PREFIX_COUNT);

    let expected: Vec<u8> = Series::ALL.iter().flat_map(|s| s.prefixes()).collect();
    let actual: Vec<u8> = record
        .winning_entries
        .iter()
        .map(|e| e.prefix().expect("four-digit symbol"))
        .collect();
    assert_eq!(actual, expected);

    let unique: HashSet<&str> = record.winning_entries.iter().map(|e| e.symbol.as_str()).collect();
    assert_eq!(unique.len(), PREFIX_COUNT);

    let paid: Decimal = record.winning_entries.iter().map(|e| e.payout).sum();
    assert_eq!(paid, record.allocated_total);
    assert!(record.allocated_total <= record.net_budget);
}
