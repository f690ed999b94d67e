use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::{
    error::ValidationError,
    model::{Currency, Movement, Split, SplitRef},
    services::{BalanceScope, IngestPolicy, SettlementContext},
};

/// Validated debt edges extracted from a batch of splits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedLedger {
    pub movements: Vec<Movement>,
    /// Currencies of every accepted split, including splits that produced no
    /// movement.
    pub currencies: BTreeSet<Currency>,
    /// Splits skipped under [`IngestPolicy::SkipInvalid`].
    pub rejected: Vec<ValidationError>,
}

/// Turns splits into a uniform sequence of [`Movement`]s.
///
/// Expenses never appear here: an expense only creates debt through the
/// splits attached to it.
pub struct LedgerNormalizer;

impl LedgerNormalizer {
    pub fn normalize(
        &self,
        splits: &[Split],
        context: &SettlementContext,
    ) -> Result<NormalizedLedger, ValidationError> {
        let mut ledger = NormalizedLedger::default();

        for (position, split) in splits.iter().enumerate() {
            match self.normalize_split(split, position, context) {
                Ok(movements) => {
                    ledger.currencies.insert(split.currency.clone());
                    ledger.movements.extend(movements);
                }
                Err(err) => {
                    tracing::warn!(
                        split = %SplitRef::from_split(split, Some(position)),
                        policy = ?context.ingest_policy,
                        error = %err,
                        "Rejected malformed split"
                    );
                    match context.ingest_policy {
                        IngestPolicy::Abort => return Err(err),
                        IngestPolicy::SkipInvalid => ledger.rejected.push(err),
                    }
                }
            }
        }

        tracing::debug!(
            split_count = splits.len(),
            movement_count = ledger.movements.len(),
            currency_count = ledger.currencies.len(),
            rejected_count = ledger.rejected.len(),
            "Normalized split ledger"
        );

        Ok(ledger)
    }

    /// Validates one split and decomposes it into one movement per participant.
    ///
    /// The whole split is rejected when any participant is malformed.
    pub fn normalize_split(
        &self,
        split: &Split,
        position: usize,
        context: &SettlementContext,
    ) -> Result<Vec<Movement>, ValidationError> {
        let split_ref = || SplitRef::from_split(split, Some(position));

        if split.currency.is_blank() {
            return Err(ValidationError::MissingCurrency { split: split_ref() });
        }
        if split.initiator.is_blank() {
            return Err(ValidationError::MissingInitiator { split: split_ref() });
        }

        let mut movements = Vec::with_capacity(split.participants.len());
        for (participant_position, participant) in split.participants.iter().enumerate() {
            if participant.member.is_blank() {
                return Err(ValidationError::MissingParticipant {
                    split: split_ref(),
                    position: participant_position,
                });
            }
            if participant.amount_owed < Decimal::ZERO {
                return Err(ValidationError::NegativeAmount {
                    split: split_ref(),
                    member: participant.member.clone(),
                    amount: participant.amount_owed,
                });
            }

            let amount = context
                .to_minor_units(participant.amount_owed, &split.currency)
                .map_err(|_| ValidationError::UnrepresentableAmount {
                    split: split_ref(),
                    member: participant.member.clone(),
                    currency: split.currency.clone(),
                    amount: participant.amount_owed,
                })?;

            if participant.member == split.initiator {
                continue;
            }
            if participant.settled && context.balance_scope == BalanceScope::Outstanding {
                continue;
            }

            movements.push(Movement {
                creditor: split.initiator.clone(),
                debtor: participant.member.clone(),
                currency: split.currency.clone(),
                amount,
            });
        }

        Ok(movements)
    }
}
