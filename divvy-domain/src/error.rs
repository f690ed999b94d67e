use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::{Currency, ExpenseId, MemberId, SplitRef};

/// A malformed input record. Rejects the single offending entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("split {split}: currency is missing")]
    MissingCurrency { split: SplitRef },
    #[error("split {split}: initiator id is missing")]
    MissingInitiator { split: SplitRef },
    #[error("split {split}: participant at position {position} has no member id")]
    MissingParticipant { split: SplitRef, position: usize },
    #[error("split {split}: {member} owes a negative amount ({amount})")]
    NegativeAmount {
        split: SplitRef,
        member: MemberId,
        amount: Decimal,
    },
    #[error("split {split}: amount {amount} owed by {member} does not fit {currency} minor units")]
    UnrepresentableAmount {
        split: SplitRef,
        member: MemberId,
        currency: Currency,
        amount: Decimal,
    },
    #[error("{currency}: accumulated balance of {member} does not fit minor units")]
    BalanceOverflow { member: MemberId, currency: Currency },
    #[error("split {split}: {member} is not a participant")]
    UnknownParticipant { split: SplitRef, member: MemberId },
    #[error("expense {expense}: {problem}")]
    InvalidExpense {
        expense: ExpenseId,
        problem: ExpenseProblem,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpenseProblem {
    #[error("payer id is missing")]
    MissingPayer,
    #[error("currency is missing")]
    MissingCurrency,
    #[error("amount {0} must be positive")]
    NonPositiveAmount(Decimal),
    #[error("amount {0} does not fit the currency's minor units")]
    UnrepresentableAmount(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{currency}: participant amounts {allocated} exceed the total {total} by {excess}")]
pub struct AmountMismatchError {
    pub currency: Currency,
    pub total: Decimal,
    pub allocated: Decimal,
    pub excess: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("participant percentages sum to {total_percentage}%, above 100% (tolerance {tolerance})")]
pub struct PercentageMismatchError {
    pub total_percentage: Decimal,
    pub tolerance: Decimal,
}

/// Split-allocation input that violates conservation or is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error(transparent)]
    AmountMismatch(#[from] AmountMismatchError),
    #[error(transparent)]
    PercentageMismatch(#[from] PercentageMismatchError),
    #[error("total amount {0} must be positive")]
    NonPositiveTotal(Decimal),
    #[error("no participants to split with")]
    NoParticipants,
    #[error("initiator {0} cannot also be listed as a participant")]
    InitiatorAsParticipant(MemberId),
    #[error("participant {0} is listed more than once")]
    DuplicateParticipant(MemberId),
    #[error("participant id is missing")]
    MissingParticipant,
    #[error("participant {member} has a negative value ({value})")]
    NegativeValue { member: MemberId, value: Decimal },
    #[error("amount {amount} does not fit {currency} minor units")]
    UnrepresentableAmount { currency: Currency, amount: Decimal },
}

/// Creditor and debtor totals disagree beyond rounding slack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{currency}: ledger is unbalanced (creditors {creditor_total}, debtors {debtor_total}, discrepancy {discrepancy})"
)]
pub struct UnbalancedLedgerError {
    pub currency: Currency,
    pub creditor_total: Decimal,
    pub debtor_total: Decimal,
    pub discrepancy: Decimal,
}
