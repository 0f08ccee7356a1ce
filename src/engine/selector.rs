//! Series selector: one winning symbol per prefix under a global budget.
//!
//! Prefixes are visited in a fixed order (series A, B, C; ascending prefix
//! within a series) and the budget is consumed cumulatively along that
//! order. A prefix whose top candidate does not fit the remaining budget
//! gets a zero-payout filler; lower-ranked candidates are never tried.
//! Late prefixes can therefore be starved by early ones. This ordering is
//! part of the settlement contract.

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

use crate::types::{prefix_of, AggregatedStake, Series, SettleError, WinningEntry, PREFIX_COUNT};

/// Result of a selection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub entries: Vec<WinningEntry>,
    pub allocated_total: Decimal,
}

/// Stateful pass over the thirty prefixes.
///
/// Holds the used-symbol set and the running allocation; a fresh selector
/// is created per settlement.
pub struct SeriesSelector<'a> {
    stakes: &'a AggregatedStake,
    net_budget: Decimal,
    used: HashSet<String>,
    allocated_total: Decimal,
}

impl<'a> SeriesSelector<'a> {
    pub fn new(stakes: &'a AggregatedStake, net_budget: Decimal) -> Self {
        Self {
            stakes,
            net_budget,
            used: HashSet::with_capacity(PREFIX_COUNT),
            allocated_total: Decimal::ZERO,
        }
    }

    /// Run the full selection. Fails only if a prefix has no unused filler left.
    pub fn select<R: Rng + ?Sized>(mut self, rng: &mut R) -> Result<Selection, SettleError> {
        let mut entries = Vec::with_capacity(PREFIX_COUNT);

        for series in Series::ALL {
            for prefix in series.prefixes() {
                let entry = match self.accept_candidate(prefix) {
                    Some(entry) => entry,
                    None => self.filler(prefix, rng)?,
                };
                self.allocated_total = self
                    .allocated_total
                    .checked_add(entry.payout)
                    .ok_or_else(|| SettleError::InvalidInput("allocated total out of range".into()))?;
                self.used.insert(entry.symbol.clone());
                entries.push(entry);
            }
        }

        debug!(
            net_budget = %self.net_budget,
            allocated = %self.allocated_total,
            winners = entries.iter().filter(|e| !e.filler).count(),
            "Selection complete"
        );

        Ok(Selection {
            entries,
            allocated_total: self.allocated_total,
        })
    }

    /// Highest-staked unused symbol for `prefix`; ties go to the smaller symbol.
    fn top_candidate(&self, prefix: u8) -> Option<(&'a String, Decimal)> {
        let stakes: &'a AggregatedStake = self.stakes;
        // BTreeMap iterates symbols ascending, so a strict `>` keeps the
        // smallest symbol among equal amounts.
        stakes
            .iter()
            .filter(|(symbol, _)| prefix_of(symbol) == Some(prefix) && !self.used.contains(*symbol))
            .fold(None, |best: Option<(&'a String, Decimal)>, (symbol, &amount)| match best {
                Some((_, best_amount)) if amount <= best_amount => best,
                _ => Some((symbol, amount)),
            })
    }

    fn accept_candidate(&self, prefix: u8) -> Option<WinningEntry> {
        let (symbol, amount) = self.top_candidate(prefix)?;
        let fits = self
            .allocated_total
            .checked_add(amount)
            .is_some_and(|total| total <= self.net_budget);
        if !fits {
            debug!(prefix, symbol = %symbol, amount = %amount, "Top candidate over budget");
            return None;
        }
        Some(WinningEntry {
            symbol: symbol.clone(),
            payout: amount,
            filler: false,
        })
    }

    fn filler<R: Rng + ?Sized>(&self, prefix: u8, rng: &mut R) -> Result<WinningEntry, SettleError> {
        let free: Vec<String> = (0..100u8)
            .map(|suffix| format!("{prefix:02}{suffix:02}"))
            .filter(|symbol| !self.used.contains(symbol))
            .collect();

        let symbol = free
            .choose(rng)
            .cloned()
            .ok_or(SettleError::SeriesExhausted { prefix })?;

        Ok(WinningEntry {
            symbol,
            payout: Decimal::ZERO,
            filler: true,
        })
    }
}

/// Convenience wrapper over [`SeriesSelector`].
pub fn select_winners<R: Rng + ?Sized>(
    stakes: &AggregatedStake,
    net_budget: Decimal,
    rng: &mut R,
) -> Result<Selection, SettleError> {
    SeriesSelector::new(stakes, net_budget).select(rng)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
