use divvy_transfer_construction::{PersonBalance, SettlementError, construct_settlement_transfers};
use rust_decimal::Decimal;

use crate::{
    error::UnbalancedLedgerError,
    model::{Currency, MemberBalances, MemberId, Money, NetBalances, Transfer},
    services::{SettlementContext, SettlementRoundingError, quantize_balances},
};

/// Turns net balances into the shortest greedy list of settlement transfers.
pub struct DebtSimplifier;

impl DebtSimplifier {
    /// Settles one currency. Balances must add up to exactly zero.
    ///
    /// Creditors and debtors are matched largest first; the result never has
    /// more than `non-zero members - 1` transfers.
    pub fn simplify(
        &self,
        currency: &Currency,
        balances: &MemberBalances,
        context: &SettlementContext,
    ) -> Result<Vec<Transfer>, UnbalancedLedgerError> {
        // MemberBalances is ordered by MemberId, which keeps the id tie-break stable.
        let people = balances.iter().map(|(member, balance)| PersonBalance {
            id: member.clone(),
            balance: balance.minor_units(),
        });

        let payments = construct_settlement_transfers(people).map_err(|err| match err {
            SettlementError::ImbalancedTotal {
                creditor_total,
                debtor_total,
            } => {
                let scale = context.scale_for(currency);
                let creditor_total = units_to_decimal(creditor_total, scale);
                let debtor_total = units_to_decimal(debtor_total, scale);
                let discrepancy = creditor_total - debtor_total;
                tracing::error!(
                    reject_reason = "unbalanced_ledger",
                    currency = %currency,
                    member_count = balances.len(),
                    creditor_total = %creditor_total,
                    debtor_total = %debtor_total,
                    discrepancy = %discrepancy,
                    "Debt simplification rejected unbalanced ledger"
                );
                UnbalancedLedgerError {
                    currency: currency.clone(),
                    creditor_total,
                    debtor_total,
                    discrepancy,
                }
            }
        })?;

        let transfers: Vec<Transfer> = payments
            .into_iter()
            .map(|payment| Transfer {
                from: payment.from,
                to: payment.to,
                currency: currency.clone(),
                amount: Money::from_minor(payment.amount),
            })
            .collect();

        tracing::debug!(
            currency = %currency,
            member_count = balances.len(),
            transfer_count = transfers.len(),
            "Simplified debts"
        );

        Ok(transfers)
    }

    /// Settles every currency independently, in currency order.
    pub fn simplify_all(
        &self,
        balances: &NetBalances,
        context: &SettlementContext,
    ) -> Result<Vec<Transfer>, UnbalancedLedgerError> {
        let mut transfers = Vec::new();
        for currency in balances.currencies() {
            transfers.extend(self.simplify(&currency, &balances.for_currency(&currency), context)?);
        }
        Ok(transfers)
    }

    /// Settles decimal balances of one currency.
    ///
    /// Slack smaller than one minor unit is absorbed by
    /// [`quantize_balances`] before matching.
    pub fn simplify_decimal(
        &self,
        currency: &Currency,
        balances: &[(MemberId, Decimal)],
        context: &SettlementContext,
    ) -> Result<Vec<Transfer>, SettlementRoundingError> {
        let quantized = quantize_balances(currency, balances, context)?;
        Ok(self.simplify(currency, &quantized, context)?)
    }
}

fn units_to_decimal(units: u128, scale: u32) -> Decimal {
    i128::try_from(units)
        .ok()
        .and_then(|units| Decimal::try_from_i128_with_scale(units, scale).ok())
        .unwrap_or(Decimal::MAX)
}
