pub mod balance_accumulator;
pub mod debt_overview;
pub mod debt_simplifier;
pub mod expense_reconciliation;
pub mod ledger_normalizer;
pub mod settlement_rounding;
pub mod split_allocation;

pub use balance_accumulator::{BalanceAccumulator, LedgerBalances, compute_net_balances};
pub use debt_overview::{CounterpartyBalance, DebtOverview, DebtOverviewBuilder};
pub use debt_simplifier::DebtSimplifier;
pub use expense_reconciliation::{ExpenseReconciler, Finding, PaidTotal, PaidTotals};
pub use ledger_normalizer::{LedgerNormalizer, NormalizedLedger};
pub use settlement_rounding::{
    AtomicUnitConversionError, BalanceScope, DEFAULT_SCALE, IngestPolicy, RoundingMode,
    SettlementContext, SettlementRoundingError, quantize_balances,
};
pub use split_allocation::{Allocation, SplitAllocator, SplitMethod};
