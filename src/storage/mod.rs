//! Persistence layer and external collaborators.
//!
//! The settlement core reads tickets, operator commission and the global
//! payout ratio, and writes settlement records. Each concern is a trait so
//! the orchestrator can run against SQLite in production and in-memory
//! maps in tests.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{SettlementRecord, SlotKey, TicketRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Source of raw tickets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Tickets that may belong to the slot. Implementations may over-fetch;
    /// the aggregator applies the exact slot filter.
    async fn stakes_for_slot(&self, slot: &SlotKey) -> Result<Vec<TicketRecord>>;
}

/// Operator profile lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperatorDirectory: Send + Sync {
    /// Commission percentage of an operator, `None` if the operator is unknown.
    async fn commission_rate_of(&self, operator_id: &str) -> Result<Option<Decimal>>;
}

/// Global payout configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutSettings: Send + Sync {
    /// Current payout ratio percentage; zero when never configured.
    async fn current_payout_ratio(&self) -> Result<Decimal>;
}

/// Keyed, write-once store of settlement records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn find(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>>;

    /// Atomically insert `record` unless its slot is already settled.
    ///
    /// Returns the stored record: the new one on first declaration, the
    /// pre-existing one otherwise (the argument is then discarded).
    async fn create_if_absent(&self, record: SettlementRecord) -> Result<SettlementRecord>;

    /// All records of one operator on one draw date, newest first.
    async fn list_for_operator_date(
        &self,
        operator_id: &str,
        draw_date: &str,
    ) -> Result<Vec<SettlementRecord>>;
}
