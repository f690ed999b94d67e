use divvy_domain::{
    Currency, DebtSimplifier, MemberBalances, SettlementContext, Transfer, UnbalancedLedgerError,
};

use crate::ports::SettlementOptimizer;

/// Largest-first greedy matching.
#[derive(Default)]
pub struct GreedyOptimizer;

impl SettlementOptimizer for GreedyOptimizer {
    fn optimize(
        &self,
        currency: &Currency,
        balances: &MemberBalances,
        context: &SettlementContext,
    ) -> Result<Vec<Transfer>, UnbalancedLedgerError> {
        DebtSimplifier.simplify(currency, balances, context)
    }
}
