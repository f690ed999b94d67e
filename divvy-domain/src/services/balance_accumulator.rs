use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::ValidationError,
    model::{Currency, MemberId, Money, Movement, NetBalances, Split},
    services::{LedgerNormalizer, NormalizedLedger, SettlementContext},
};

/// Folds movements into per-`(member, currency)` net balances.
///
/// Totals are kept wide while folding, so the result does not depend on the
/// order of the movements. The range check happens once in
/// [`BalanceAccumulator::into_balances`].
#[derive(Clone, Debug, Default)]
pub struct BalanceAccumulator {
    members: BTreeSet<MemberId>,
    totals: BTreeMap<(Currency, MemberId), i128>,
}

impl BalanceAccumulator {
    pub fn new_with_members<'a>(members: impl IntoIterator<Item = &'a MemberId>) -> Self {
        Self {
            members: members.into_iter().cloned().collect(),
            totals: BTreeMap::new(),
        }
    }

    /// Gives every known member an explicit zero balance in `currency`.
    pub fn open_currency(mut self, currency: &Currency) -> Self {
        for member in &self.members {
            self.totals
                .entry((currency.clone(), member.clone()))
                .or_insert(0);
        }
        self
    }

    /// The creditor is owed `amount` more, the debtor owes `amount` more.
    pub fn apply(mut self, movement: &Movement) -> Self {
        self.members.insert(movement.creditor.clone());
        self.members.insert(movement.debtor.clone());
        let amount = i128::from(movement.amount.minor_units());
        self.credit(&movement.creditor, &movement.currency, amount);
        self.credit(&movement.debtor, &movement.currency, -amount);
        self
    }

    fn credit(&mut self, member: &MemberId, currency: &Currency, amount: i128) {
        *self
            .totals
            .entry((currency.clone(), member.clone()))
            .or_insert(0) += amount;
    }

    /// Accumulates a normalized ledger. Members found only in movements are
    /// added and every member is represented in every accepted currency.
    pub fn from_ledger<'a>(
        members: impl IntoIterator<Item = &'a MemberId>,
        ledger: &NormalizedLedger,
    ) -> Self {
        let mut accumulator = Self::new_with_members(members);
        accumulator.members.extend(
            ledger
                .movements
                .iter()
                .flat_map(|movement| [movement.creditor.clone(), movement.debtor.clone()]),
        );

        let accumulator = ledger
            .currencies
            .iter()
            .fold(accumulator, |acc, currency| acc.open_currency(currency));
        ledger.movements.iter().fold(accumulator, Self::apply)
    }

    /// Current total of one member, before the range check.
    pub fn total(&self, member: &MemberId, currency: &Currency) -> Option<i128> {
        self.totals
            .get(&(currency.clone(), member.clone()))
            .copied()
    }

    /// # Errors
    /// [`ValidationError::BalanceOverflow`] for the first `(currency, member)`
    /// whose total does not fit minor units.
    pub fn into_balances(self) -> Result<NetBalances, ValidationError> {
        self.totals
            .into_iter()
            .map(|((currency, member), total)| match Money::try_from_wide(total) {
                Some(amount) => Ok((member, currency, amount)),
                None => {
                    tracing::warn!(
                        reject_reason = "balance_overflow",
                        currency = %currency,
                        member = %member,
                        total = %total,
                        "Accumulated balance does not fit minor units"
                    );
                    Err(ValidationError::BalanceOverflow { member, currency })
                }
            })
            .collect()
    }
}

/// Net balances of a batch together with the splits it had to leave out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerBalances {
    pub balances: NetBalances,
    /// Splits skipped under [`crate::services::IngestPolicy::SkipInvalid`].
    pub rejected: Vec<ValidationError>,
}

/// Computes every member's signed balance per currency from a batch of splits.
///
/// Zero balances are kept; use [`NetBalances::non_zero`] for display.
///
/// # Errors
/// - the first malformed split under [`crate::services::IngestPolicy::Abort`];
///   under `SkipInvalid` malformed splits are returned in
///   [`LedgerBalances::rejected`]
/// - [`ValidationError::BalanceOverflow`] when a net balance does not fit
///   minor units
pub fn compute_net_balances(
    members: &[MemberId],
    splits: &[Split],
    context: &SettlementContext,
) -> Result<LedgerBalances, ValidationError> {
    let ledger = LedgerNormalizer.normalize(splits, context)?;
    let balances = BalanceAccumulator::from_ledger(members, &ledger).into_balances()?;

    tracing::debug!(
        member_count = members.len(),
        split_count = splits.len(),
        entry_count = balances.len(),
        rejected_count = ledger.rejected.len(),
        "Computed net balances"
    );

    Ok(LedgerBalances {
        balances,
        rejected: ledger.rejected,
    })
}
