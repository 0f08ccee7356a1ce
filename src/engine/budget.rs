//! Budget calculator. Payout budget from gross stake, commission and payout ratio.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::types::{AggregatedStake, SeriesStake, Series, SettleError, series_of};

const HUNDRED: Decimal = dec!(100);

/// Inputs and result of one budget computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Budget {
    pub gross_stake: Decimal,
    pub commission_rate: Decimal,
    pub payout_ratio: Decimal,
    pub net_budget: Decimal,
}

/// Reject percentages outside 0–100.
pub fn validate_rate(name: &str, rate: Decimal) -> Result<Decimal, SettleError> {
    if rate < Decimal::ZERO || rate > HUNDRED {
        return Err(SettleError::InvalidInput(format!(
            "{name} must be within 0-100, got {rate}"
        )));
    }
    Ok(rate)
}

/// `round_half_up(gross × (1 − commission/100) × (ratio/100))` to whole units.
pub fn net_budget(
    gross_stake: Decimal,
    commission_rate: Decimal,
    payout_ratio: Decimal,
) -> Result<Budget, SettleError> {
    let commission_rate = validate_rate("commissionRate", commission_rate)?;
    let payout_ratio = validate_rate("payoutRatio", payout_ratio)?;

    let net_budget = if gross_stake.is_zero() {
        Decimal::ZERO
    } else {
        gross_stake
            .checked_mul((HUNDRED - commission_rate) / HUNDRED)
            .and_then(|net| net.checked_mul(payout_ratio / HUNDRED))
            .ok_or_else(out_of_range)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    };

    Ok(Budget {
        gross_stake,
        commission_rate,
        payout_ratio,
        net_budget,
    })
}

fn out_of_range() -> SettleError {
    SettleError::InvalidInput("stake amounts exceed the representable range".into())
}

/// Per-series entry count, gross, commission amount and net.
pub fn series_breakdown(
    stakes: &AggregatedStake,
    commission_rate: Decimal,
) -> Result<Vec<SeriesStake>, SettleError> {
    Series::ALL
        .iter()
        .map(|&series| {
            let (entries, gross) = stakes
                .iter()
                .filter(|(symbol, _)| series_of(symbol) == Some(series))
                .try_fold((0u32, Decimal::ZERO), |(n, sum), (_, amount)| {
                    Some((n + 1, sum.checked_add(*amount)?))
                })
                .ok_or_else(out_of_range)?;
            let commission_amount = gross
                .checked_mul(commission_rate / HUNDRED)
                .ok_or_else(out_of_range)?
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            Ok(SeriesStake {
                series,
                entries,
                gross,
                commission_amount,
                net: gross - commission_amount,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
