use divvy_domain::{
    AllocationError, UnbalancedLedgerError, ValidationError, services::SettlementRoundingError,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplicationError {
    #[error("invalid ledger record: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid split allocation: {0}")]
    Allocation(#[from] AllocationError),
    #[error("settlement failed: {0}")]
    Unbalanced(#[from] UnbalancedLedgerError),
    #[error("settlement rounding failed: {0}")]
    Rounding(#[from] SettlementRoundingError),
}
