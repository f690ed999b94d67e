//! Minor-unit conversion and zero-sum quantization.
//!
//! [`SettlementContext`] is the typed configuration shared by every service:
//! it knows each currency's scale, the rounding mode used at the decimal
//! boundary and the ingestion policies. [`quantize_balances`] turns decimal
//! balances into integer minor units while keeping their sum at exactly zero:
//! 1. The decimal sum must be smaller than one minor unit
//! 2. Every balance is rounded to the currency's minor unit
//! 3. The rounding residual is repaired one unit at a time, starting with the
//!    members who gained most from rounding (member id breaks ties)

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    error::UnbalancedLedgerError,
    model::{Currency, MemberBalances, MemberId, Money},
};

pub const DEFAULT_SCALE: u32 = 2;
const MAX_SETTLEMENT_SCALE: u32 = 18;

/// Rounding applied when a decimal amount is converted to minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round half away from zero (0.005 -> 0.01, -0.005 -> -0.01).
    #[default]
    HalfUp,
    /// Round half to even (banker's rounding).
    HalfEven,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// What happens to a batch when one of its records is malformed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPolicy {
    /// The first invalid record fails the whole computation.
    #[default]
    Abort,
    /// Invalid records are skipped and returned alongside the result.
    SkipInvalid,
}

/// Which split participants produce debt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceScope {
    /// Every participant, settled or not.
    #[default]
    All,
    /// Participants already marked settled are left out.
    Outstanding,
}

/// Settlement configuration.
///
/// # Example
/// ```
/// use divvy_domain::{Currency, services::{RoundingMode, SettlementContext}};
///
/// let ctx = SettlementContext::default()
///     .with_currency_scale(Currency::from("JPY"), 0)
///     .with_rounding_mode(RoundingMode::HalfEven);
///
/// assert_eq!(ctx.scale_for(&Currency::from("JPY")), 0);
/// assert_eq!(ctx.scale_for(&Currency::from("USD")), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementContext {
    /// Decimal places of the minor unit for currencies without an override.
    pub default_scale: u32,
    /// Per-currency minor-unit scale overrides (e.g. `JPY = 0`).
    pub currency_scales: BTreeMap<Currency, u32>,
    pub rounding_mode: RoundingMode,
    /// Accepted excess over 100% for percentage splits, in percentage points.
    pub percentage_tolerance: Decimal,
    pub ingest_policy: IngestPolicy,
    pub balance_scope: BalanceScope,
}

impl Default for SettlementContext {
    fn default() -> Self {
        Self {
            default_scale: DEFAULT_SCALE,
            currency_scales: BTreeMap::new(),
            rounding_mode: RoundingMode::default(),
            percentage_tolerance: Decimal::new(1, 2),
            ingest_policy: IngestPolicy::default(),
            balance_scope: BalanceScope::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AtomicUnitConversionError {
    #[error("scale {scale} exceeds the supported maximum of {max_supported}")]
    UnsupportedScale { scale: u32, max_supported: u32 },
    #[error("amount is out of range for minor units")]
    OutOfRange,
}

impl SettlementContext {
    pub fn with_currency_scale(mut self, currency: impl Into<Currency>, scale: u32) -> Self {
        self.currency_scales.insert(currency.into(), scale);
        self
    }

    pub fn with_rounding_mode(mut self, rounding_mode: RoundingMode) -> Self {
        self.rounding_mode = rounding_mode;
        self
    }

    pub fn with_percentage_tolerance(mut self, tolerance: Decimal) -> Self {
        self.percentage_tolerance = tolerance;
        self
    }

    pub fn with_ingest_policy(mut self, ingest_policy: IngestPolicy) -> Self {
        self.ingest_policy = ingest_policy;
        self
    }

    pub fn with_balance_scope(mut self, balance_scope: BalanceScope) -> Self {
        self.balance_scope = balance_scope;
        self
    }

    pub fn scale_for(&self, currency: &Currency) -> u32 {
        self.currency_scales
            .get(currency)
            .copied()
            .unwrap_or(self.default_scale)
    }

    /// One minor unit of `currency` as a decimal (0.01 for a scale of 2).
    pub fn minor_unit(&self, currency: &Currency) -> Decimal {
        Decimal::new(1, self.scale_for(currency).min(MAX_SETTLEMENT_SCALE))
    }

    /// Rounds a decimal amount to the currency's minor unit.
    pub fn round(&self, amount: Decimal, currency: &Currency) -> Decimal {
        amount.round_dp_with_strategy(self.scale_for(currency), self.rounding_mode.strategy())
    }

    /// Converts a decimal amount to minor units, rounding with
    /// [`SettlementContext::rounding_mode`].
    pub fn to_minor_units(
        &self,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<Money, AtomicUnitConversionError> {
        let scale = self.scale_for(currency);
        validate_scale(scale)?;

        let factor = Decimal::from_i128_with_scale(10_i128.pow(scale), 0);
        let units = amount
            .checked_mul(factor)
            .ok_or(AtomicUnitConversionError::OutOfRange)?
            .round_dp_with_strategy(0, self.rounding_mode.strategy());
        units
            .to_i64()
            .map(Money::from_minor)
            .ok_or(AtomicUnitConversionError::OutOfRange)
    }

    pub fn to_decimal(&self, amount: Money, currency: &Currency) -> Decimal {
        amount.to_decimal(self.scale_for(currency).min(MAX_SETTLEMENT_SCALE))
    }
}

fn validate_scale(scale: u32) -> Result<(), AtomicUnitConversionError> {
    if scale <= MAX_SETTLEMENT_SCALE {
        return Ok(());
    }
    Err(AtomicUnitConversionError::UnsupportedScale {
        scale,
        max_supported: MAX_SETTLEMENT_SCALE,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementRoundingError {
    #[error(transparent)]
    Unbalanced(#[from] UnbalancedLedgerError),
    #[error("{currency}: balance {amount} of {member} cannot be expressed in minor units")]
    Conversion {
        currency: Currency,
        member: MemberId,
        amount: Decimal,
        #[source]
        source: AtomicUnitConversionError,
    },
    #[error("{currency}: {side} total exceeds the decimal range")]
    TotalOutOfRange {
        currency: Currency,
        side: &'static str,
    },
    #[error("{currency}: zero-sum repair needs {adjustments} adjustments for {members} members")]
    InvalidAdjustmentCount {
        currency: Currency,
        adjustments: usize,
        members: usize,
    },
}

/// Quantizes decimal balances of one currency to minor units whose sum is
/// exactly zero.
///
/// Duplicate members are merged before rounding.
///
/// # Errors
/// - [`SettlementRoundingError::Unbalanced`] when the decimal sum is one minor
///   unit or more away from zero
/// - [`SettlementRoundingError::Conversion`] when a balance does not fit the
///   currency's minor units
/// - [`SettlementRoundingError::TotalOutOfRange`] when the creditor or debtor
///   total overflows
pub fn quantize_balances(
    currency: &Currency,
    balances: &[(MemberId, Decimal)],
    context: &SettlementContext,
) -> Result<MemberBalances, SettlementRoundingError> {
    let out_of_range = |member: &MemberId, amount: Decimal| SettlementRoundingError::Conversion {
        currency: currency.clone(),
        member: member.clone(),
        amount,
        source: AtomicUnitConversionError::OutOfRange,
    };

    let mut merged: BTreeMap<MemberId, Decimal> = BTreeMap::new();
    for (member, amount) in balances {
        let entry = merged.entry(member.clone()).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_add(*amount)
            .ok_or_else(|| out_of_range(member, *amount))?;
    }

    let atomic_unit = context.minor_unit(currency);
    let side_total = |side: &'static str, positive: bool| {
        merged
            .values()
            .filter(|v| !v.is_zero() && v.is_sign_positive() == positive)
            .try_fold(Decimal::ZERO, |total, v| total.checked_add(v.abs()))
            .ok_or_else(|| SettlementRoundingError::TotalOutOfRange {
                currency: currency.clone(),
                side,
            })
    };
    let creditor_total = side_total("creditor", true)?;
    let debtor_total = side_total("debtor", false)?;
    let sum_original = creditor_total - debtor_total;

    if sum_original.abs() >= atomic_unit {
        tracing::error!(
            reject_reason = "input_imbalance",
            currency = %currency,
            member_count = merged.len(),
            atomic_unit = %atomic_unit,
            sum_original = %sum_original,
            "Balance quantization rejected due to input imbalance"
        );
        return Err(UnbalancedLedgerError {
            currency: currency.clone(),
            creditor_total,
            debtor_total,
            discrepancy: sum_original,
        }
        .into());
    }

    let mut entries: Vec<(MemberId, Money, Decimal)> = merged
        .into_iter()
        .map(|(member, original)| {
            let rounded = context.to_minor_units(original, currency).map_err(|source| {
                SettlementRoundingError::Conversion {
                    currency: currency.clone(),
                    member: member.clone(),
                    amount: original,
                    source,
                }
            })?;
            let diff = context.to_decimal(rounded, currency) - original;
            Ok((member, rounded, diff))
        })
        .collect::<Result<_, SettlementRoundingError>>()?;

    let residual: i128 = entries
        .iter()
        .map(|(_, rounded, _)| i128::from(rounded.minor_units()))
        .sum();

    if residual != 0 {
        let adjustments = usize::try_from(residual.unsigned_abs()).unwrap_or(usize::MAX);
        if adjustments > entries.len() {
            return Err(SettlementRoundingError::InvalidAdjustmentCount {
                currency: currency.clone(),
                adjustments,
                members: entries.len(),
            });
        }

        let score_sign = if residual > 0 {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        let mut ranked: Vec<usize> = (0..entries.len()).collect();
        ranked.sort_by(|&a, &b| {
            let score_a = entries[a].2 * score_sign;
            let score_b = entries[b].2 * score_sign;
            score_b
                .cmp(&score_a)
                .then_with(|| entries[a].0.cmp(&entries[b].0))
        });

        let adjustment = if residual > 0 {
            Money::from_minor(-1)
        } else {
            Money::from_minor(1)
        };
        for idx in ranked.into_iter().take(adjustments) {
            let (member, rounded, diff) = &mut entries[idx];
            let original = context.to_decimal(*rounded, currency) - *diff;
            *rounded = rounded
                .checked_add(adjustment)
                .ok_or_else(|| out_of_range(&*member, original))?;
        }

        tracing::debug!(
            currency = %currency,
            residual = residual as i64,
            adjustments,
            member_count = entries.len(),
            sum_original = %sum_original,
            "Balance quantization repaired rounding residual"
        );
    }

    Ok(entries
        .into_iter()
        .map(|(member, rounded, _)| (member, rounded))
        .collect())
}
