//! Settlement orchestrator.
//!
//! `CHECK_EXISTING → (FOUND → RETURN) | (ABSENT → AGGREGATE → COMPUTE_BUDGET
//! → SELECT → PERSIST → RETURN)`
//!
//! Collaborator reads and the persist are bounded by a timeout. Selection
//! is pure in-memory work with no await point between it and the persist,
//! and the persist itself runs on its own task so a dropped caller cannot
//! interrupt a write halfway.

use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::aggregator::{aggregate, gross_stake};
use crate::engine::budget::{net_budget, series_breakdown, validate_rate};
use crate::engine::selector::{select_winners, Selection};
use crate::storage::{OperatorDirectory, PayoutSettings, SettlementStore, TicketSource};
use crate::types::{AggregatedStake, SettleError, SettlementRecord, SlotKey};

/// Default bound on collaborator calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

type SelectFn = fn(&AggregatedStake, Decimal, &mut ChaCha8Rng) -> Result<Selection, SettleError>;

pub struct Settler {
    tickets: Arc<dyn TicketSource>,
    operators: Arc<dyn OperatorDirectory>,
    payout: Arc<dyn PayoutSettings>,
    store: Arc<dyn SettlementStore>,
    timeout: Duration,
    rng_seed: Option<u64>,
    select: SelectFn,
}

impl Settler {
    pub fn new(
        tickets: Arc<dyn TicketSource>,
        operators: Arc<dyn OperatorDirectory>,
        payout: Arc<dyn PayoutSettings>,
        store: Arc<dyn SettlementStore>,
    ) -> Self {
        Self {
            tickets,
            operators,
            payout,
            store,
            timeout: DEFAULT_TIMEOUT,
            rng_seed: None,
            select: select_winners,
        }
    }

    /// Wire every collaborator to one backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: TicketSource + OperatorDirectory + PayoutSettings + SettlementStore + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend.clone(), backend)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fix the filler RNG seed (tests, replays). `None` draws from entropy.
    pub fn with_rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    #[cfg(test)]
    fn with_selector(mut self, select: SelectFn) -> Self {
        self.select = select;
        self
    }

    /// Settle a slot using the operator's commission and the current global payout ratio.
    pub async fn settle(&self, slot: &SlotKey) -> Result<SettlementRecord, SettleError> {
        if let Some(existing) = self.check_existing(slot).await? {
            return Ok(existing);
        }

        let commission_rate = self
            .bounded("operator directory", self.operators.commission_rate_of(&slot.operator_id))
            .await?
            .ok_or_else(|| {
                warn!(operator = %slot.operator_id, "Settlement for unknown operator");
                SettleError::OperatorNotFound(slot.operator_id.clone())
            })?;
        let payout_ratio = self
            .bounded("payout settings", self.payout.current_payout_ratio())
            .await?;

        let commission_rate = validate_rate("commissionRate", commission_rate)?;
        let payout_ratio = validate_rate("payoutRatio", payout_ratio)?;

        self.settle_absent(slot, commission_rate, payout_ratio).await
    }

    /// Settle a slot with explicitly supplied rates.
    ///
    /// If the slot is already settled the stored record is returned and the
    /// rates are ignored.
    pub async fn settle_with_rates(
        &self,
        slot: &SlotKey,
        commission_rate: Decimal,
        payout_ratio: Decimal,
    ) -> Result<SettlementRecord, SettleError> {
        let commission_rate = validate_rate("commissionRate", commission_rate)?;
        let payout_ratio = validate_rate("payoutRatio", payout_ratio)?;

        if let Some(existing) = self.check_existing(slot).await? {
            return Ok(existing);
        }
        self.settle_absent(slot, commission_rate, payout_ratio).await
    }

    /// Read-only lookup of a declared settlement.
    pub async fn get(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>, SettleError> {
        self.bounded("settlement store", self.store.find(slot)).await
    }

    /// Declared settlements of one operator on one date, newest first.
    pub async fn list(
        &self,
        operator_id: &str,
        draw_date: &str,
    ) -> Result<Vec<SettlementRecord>, SettleError> {
        if operator_id.trim().is_empty() || draw_date.trim().is_empty() {
            return Err(SettleError::InvalidInput(
                "operatorId and drawDate are required".into(),
            ));
        }
        self.bounded(
            "settlement store",
            self.store.list_for_operator_date(operator_id.trim(), draw_date.trim()),
        )
        .await
    }

    async fn check_existing(&self, slot: &SlotKey) -> Result<Option<SettlementRecord>, SettleError> {
        debug!(slot = %slot, "CHECK_EXISTING");
        let existing = self.get(slot).await?;
        if let Some(record) = &existing {
            info!(slot = %slot, id = %record.id, "Slot already settled, returning stored record");
        }
        Ok(existing)
    }

    async fn settle_absent(
        &self,
        slot: &SlotKey,
        commission_rate: Decimal,
        payout_ratio: Decimal,
    ) -> Result<SettlementRecord, SettleError> {
        debug!(slot = %slot, "AGGREGATE");
        let tickets = self
            .bounded("ticket store", self.tickets.stakes_for_slot(slot))
            .await?;
        let stakes = aggregate(&tickets, slot);

        debug!(slot = %slot, "COMPUTE_BUDGET");
        let budget = net_budget(gross_stake(&stakes)?, commission_rate, payout_ratio)?;

        debug!(slot = %slot, net_budget = %budget.net_budget, "SELECT");
        let mut rng = self.rng();
        let selection = (self.select)(&stakes, budget.net_budget, &mut rng)?;

        let record = SettlementRecord {
            id: Uuid::new_v4(),
            slot: slot.clone(),
            winning_entries: selection.entries,
            gross_stake: budget.gross_stake,
            commission_rate: budget.commission_rate,
            payout_ratio: budget.payout_ratio,
            net_budget: budget.net_budget,
            allocated_total: selection.allocated_total,
            series_stakes: series_breakdown(&stakes, budget.commission_rate)?,
            created_at: Utc::now(),
        };

        debug!(slot = %slot, "PERSIST");
        let draft_id = record.id;
        let stored = self.persist(record).await?;

        if stored.id == draft_id {
            info!(
                slot = %slot,
                id = %stored.id,
                gross = %stored.gross_stake,
                net_budget = %stored.net_budget,
                allocated = %stored.allocated_total,
                "Settlement declared"
            );
        } else {
            info!(slot = %slot, id = %stored.id, "Concurrent settlement won, draft discarded");
        }
        Ok(stored)
    }

    async fn persist(&self, record: SettlementRecord) -> Result<SettlementRecord, SettleError> {
        let store = Arc::clone(&self.store);
        let write = tokio::spawn(async move { store.create_if_absent(record).await });

        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(Ok(stored))) => Ok(stored),
            Ok(Ok(Err(e))) => {
                warn!(error = %format!("{e:#}"), "Settlement persist failed");
                Err(SettleError::StorageUnavailable(format!("{e:#}")))
            }
            Ok(Err(join_err)) => Err(SettleError::StorageUnavailable(join_err.to_string())),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Settlement persist timed out");
                Err(SettleError::Timeout("settlement store"))
            }
        }
    }

    async fn bounded<T, F>(&self, what: &'static str, call: F) -> Result<T, SettleError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(collaborator = what, error = %format!("{e:#}"), "Collaborator call failed");
                Err(SettleError::StorageUnavailable(format!("{what}: {e:#}")))
            }
            Err(_) => {
                warn!(collaborator = what, timeout_ms = self.timeout.as_millis() as u64, "Collaborator call timed out");
                Err(SettleError::Timeout(what))
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
