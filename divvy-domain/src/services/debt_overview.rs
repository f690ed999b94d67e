use std::collections::BTreeMap;

use crate::{
    error::ValidationError,
    model::{Currency, MemberId, Money, Split},
    services::{LedgerNormalizer, SettlementContext},
};

/// What one counterparty and the viewer owe each other in one currency.
/// Positive: the counterparty owes the viewer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterpartyBalance {
    pub counterparty: MemberId,
    pub currency: Currency,
    pub amount: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebtOverview {
    /// Non-zero pairs ordered by `(currency, counterparty)`.
    pub balances: Vec<CounterpartyBalance>,
    pub rejected: Vec<ValidationError>,
}

/// Pairwise, unsimplified debts between a viewer and everyone they share a
/// split with.
pub struct DebtOverviewBuilder;

impl DebtOverviewBuilder {
    pub fn build(
        &self,
        viewer: &MemberId,
        splits: &[Split],
        context: &SettlementContext,
    ) -> Result<DebtOverview, ValidationError> {
        let ledger = LedgerNormalizer.normalize(splits, context)?;

        let mut pairs: BTreeMap<(Currency, MemberId), i128> = BTreeMap::new();
        for movement in &ledger.movements {
            let amount = i128::from(movement.amount.minor_units());
            let (counterparty, amount) = if &movement.creditor == viewer {
                (&movement.debtor, amount)
            } else if &movement.debtor == viewer {
                (&movement.creditor, -amount)
            } else {
                continue;
            };
            *pairs
                .entry((movement.currency.clone(), counterparty.clone()))
                .or_insert(0) += amount;
        }

        let balances = pairs
            .into_iter()
            .filter(|(_, total)| *total != 0)
            .map(|((currency, counterparty), total)| {
                match Money::try_from_wide(total) {
                    Some(amount) => Ok(CounterpartyBalance {
                        counterparty,
                        currency,
                        amount,
                    }),
                    None => Err(ValidationError::BalanceOverflow {
                        member: counterparty,
                        currency,
                    }),
                }
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        tracing::debug!(
            viewer = %viewer,
            split_count = splits.len(),
            counterparty_count = balances.len(),
            "Built debt overview"
        );

        Ok(DebtOverview {
            balances,
            rejected: ledger.rejected,
        })
    }
}
