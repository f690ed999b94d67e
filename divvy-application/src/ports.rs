use divvy_domain::{Currency, MemberBalances, SettlementContext, Transfer, UnbalancedLedgerError};

/// Produces the transfers that settle one currency's balances.
pub trait SettlementOptimizer: Send + Sync {
    fn optimize(
        &self,
        currency: &Currency,
        balances: &MemberBalances,
        context: &SettlementContext,
    ) -> Result<Vec<Transfer>, UnbalancedLedgerError>;
}
