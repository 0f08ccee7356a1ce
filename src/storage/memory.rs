//! In-memory backend.
//!
//! Arena-style keyed maps behind `tokio::sync::RwLock`. Insert-if-absent
//! happens under a single write lock, which gives the same guarantee as a
//! uniqueness constraint.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{OperatorDirectory, PayoutSettings, SettlementStore, TicketSource};
use crate::types::{SettlementRecord, SlotKey, TicketRecord};

#[derive(Default)]
pub struct MemoryStore {
    tickets: RwLock<Vec<TicketRecord>>,
    operators: RwLock<HashMap<String, Decimal>>,
    payout_ratio: RwLock<Option<Decimal>>,
    settlements: RwLock<HashMap<SlotKey, SettlementRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_ticket(&self, ticket: TicketRecord) {
        self.tickets.write().await.push(ticket);
    }

    pub async fn set_operator(&self, operator_id: &str, commission_rate: Decimal) {
        self.operators
            .write()
            .await
            .insert(operator_id.to_string(), commission_rate);
    }

    pub async fn set_payout_ratio(&self, percentage: Decimal) {
        *self.payout_ratio.write().await = Some(percentage);
    }

    pub async fn settlement_count(&self) -> usize {
        self.settlements.read().await.len()
    }
}

#[async_trait]
impl TicketSource for MemoryStore {
    async fn stakes_for_slot(&self, slot: &SlotKey) -> Result<Vec<TicketRecord>> {
        let tickets = self.tickets.read().await;
        Ok(tickets
            .iter()
            .filter(|t| t.operator_id.trim() == slot.operator_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OperatorDirectory for MemoryStore {
    async fn commission_rate_of(&self, operator_id: &str) -> Result<Option<Decimal>> {
        Ok(self.operators.read().await.get(operator_id).copied())
    }
}

#[async_trait]
impl PayoutSettings for MemoryStore {
    async fn current_payout_ratio(&self) -> Result<Decimal> {
        Ok(self.payout_ratio.read().await.unwrap_or(Decimal::ZERO))
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn find(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>> {
        Ok(self.settlements.read().await.get(slot).cloned())
    }

    async fn create_if_absent(&self, record: SettlementRecord) -> Result<SettlementRecord> {
        let mut settlements = self.settlements.write().await;
        let stored = settlements
            .entry(record.slot.clone())
            .or_insert_with(|| {
                debug!(slot = %record.slot, "Settlement inserted");
                record.clone()
            })
            .clone();
        Ok(stored)
    }

    async fn list_for_operator_date(
        &self,
        operator_id: &str,
        draw_date: &str,
    ) -> Result<Vec<SettlementRecord>> {
        let settlements = self.settlements.read().await;
        let mut records: Vec<SettlementRecord> = settlements
            .values()
            .filter(|r| r.slot.operator_id == operator_id && r.slot.draw_date == draw_date)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
