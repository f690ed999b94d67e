#![warn(clippy::uninlined_format_args)]

pub mod error;
pub mod model;
pub mod services;

pub use error::{
    AllocationError, AmountMismatchError, ExpenseProblem, PercentageMismatchError,
    UnbalancedLedgerError, ValidationError,
};
pub use model::{
    BalanceLine, Currency, Expense, ExpenseId, GroupId, MemberBalances, MemberId, Money, Movement,
    NetBalances, Split, SplitId, SplitParticipant, SplitRef, Transfer, TransferLine,
    apply_transfers,
};
pub use services::{
    Allocation, BalanceAccumulator, DebtOverviewBuilder, DebtSimplifier, ExpenseReconciler,
    LedgerBalances, LedgerNormalizer, SettlementContext, SplitAllocator, SplitMethod,
    compute_net_balances,
};
