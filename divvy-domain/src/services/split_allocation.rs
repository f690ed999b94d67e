//! Allocation of an expense total across the members of a split.
//!
//! The initiator always takes part as an implicit sharer and is never listed
//! among the participants. Whatever the participants do not cover is the
//! initiator's own share.

use fxhash::FxHashSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AllocationError, AmountMismatchError, PercentageMismatchError},
    model::{Currency, ExpenseId, GroupId, MemberId, Money, Split, SplitParticipant},
    services::SettlementContext,
};

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "participants", rename_all = "snake_case")]
pub enum SplitMethod {
    /// The total is shared evenly by the participants and the initiator.
    Equal(Vec<MemberId>),
    /// Every participant owes the given amount.
    Exact(Vec<(MemberId, Decimal)>),
    /// Every participant owes the given percentage of the total.
    Percentage(Vec<(MemberId, Decimal)>),
}

impl SplitMethod {
    fn participant_ids(&self) -> Vec<&MemberId> {
        match self {
            SplitMethod::Equal(members) => members.iter().collect(),
            SplitMethod::Exact(entries) | SplitMethod::Percentage(entries) => {
                entries.iter().map(|(member, _)| member).collect()
            }
        }
    }
}

/// Minor-unit amounts owed by each participant, plus the initiator's share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub currency: Currency,
    pub initiator: MemberId,
    /// In input order.
    pub participants: Vec<(MemberId, Money)>,
    pub initiator_share: Money,
}

impl Allocation {
    pub fn participant_total(&self) -> Money {
        self.participants.iter().map(|(_, amount)| *amount).sum()
    }

    /// Builds the split record for this allocation with every participant
    /// still unsettled.
    pub fn into_split(
        self,
        expense_id: Option<ExpenseId>,
        group_id: Option<GroupId>,
        context: &SettlementContext,
    ) -> Split {
        let participants = self
            .participants
            .into_iter()
            .map(|(member, amount)| {
                SplitParticipant::new(member, context.to_decimal(amount, &self.currency))
            })
            .collect();

        Split {
            id: None,
            initiator: self.initiator,
            participants,
            currency: self.currency,
            expense_id,
            group_id,
        }
    }
}

pub struct SplitAllocator;

impl SplitAllocator {
    /// Allocates `total` between `initiator` and the participants of `method`.
    ///
    /// # Errors
    /// - [`AllocationError::AmountMismatch`] when exact amounts exceed the total
    ///   by more than one minor unit
    /// - [`AllocationError::PercentageMismatch`] when percentages exceed 100
    ///   by more than [`SettlementContext::percentage_tolerance`]
    /// - any other [`AllocationError`] variant for malformed input
    pub fn allocate(
        &self,
        total: Decimal,
        currency: &Currency,
        initiator: &MemberId,
        method: &SplitMethod,
        context: &SettlementContext,
    ) -> Result<Allocation, AllocationError> {
        if total <= Decimal::ZERO {
            return Err(AllocationError::NonPositiveTotal(total));
        }
        let total_units = to_units(total, currency, context)?;
        validate_participants(initiator, &method.participant_ids())?;

        let (participants, initiator_share) = match method {
            SplitMethod::Equal(members) => {
                let mut shares = total_units.split_even(members.len() + 1);
                let initiator_share = shares.pop().unwrap_or(Money::ZERO);
                let participants = members.iter().cloned().zip(shares).collect();
                (participants, initiator_share)
            }
            SplitMethod::Exact(entries) => {
                allocate_exact(total, total_units, currency, entries, context)?
            }
            SplitMethod::Percentage(entries) => {
                allocate_percentage(total, total_units, currency, entries, context)?
            }
        };

        let allocation = Allocation {
            currency: currency.clone(),
            initiator: initiator.clone(),
            participants,
            initiator_share,
        };

        tracing::debug!(
            currency = %currency,
            initiator = %initiator,
            method = method_name(method),
            participant_count = allocation.participants.len(),
            total_units = total_units.minor_units(),
            initiator_share = initiator_share.minor_units(),
            "Allocated split"
        );

        Ok(allocation)
    }
}

type Shares = (Vec<(MemberId, Money)>, Money);

fn allocate_exact(
    total: Decimal,
    total_units: Money,
    currency: &Currency,
    entries: &[(MemberId, Decimal)],
    context: &SettlementContext,
) -> Result<Shares, AllocationError> {
    check_non_negative(entries)?;

    let allocated = checked_total(entries, currency)?;
    if allocated > total + context.minor_unit(currency) {
        tracing::warn!(
            reject_reason = "amount_mismatch",
            currency = %currency,
            total = %total,
            allocated = %allocated,
            "Exact split exceeds the expense total"
        );
        return Err(AmountMismatchError {
            currency: currency.clone(),
            total,
            allocated,
            excess: allocated - total,
        }
        .into());
    }

    let participants = entries
        .iter()
        .map(|(member, amount)| Ok((member.clone(), to_units(*amount, currency, context)?)))
        .collect::<Result<Vec<_>, AllocationError>>()?;

    Ok(initiator_remainder(total_units, participants))
}

fn allocate_percentage(
    total: Decimal,
    total_units: Money,
    currency: &Currency,
    entries: &[(MemberId, Decimal)],
    context: &SettlementContext,
) -> Result<Shares, AllocationError> {
    check_non_negative(entries)?;

    let total_percentage = checked_total(entries, currency)?;
    if total_percentage > ONE_HUNDRED.saturating_add(context.percentage_tolerance) {
        tracing::warn!(
            reject_reason = "percentage_mismatch",
            currency = %currency,
            total_percentage = %total_percentage,
            tolerance = %context.percentage_tolerance,
            "Percentage split exceeds 100%"
        );
        return Err(PercentageMismatchError {
            total_percentage,
            tolerance: context.percentage_tolerance,
        }
        .into());
    }

    let mut participants = entries
        .iter()
        .map(|(member, percentage)| {
            let amount = percentage
                .checked_mul(total)
                .and_then(|product| product.checked_div(ONE_HUNDRED))
                .ok_or_else(|| AllocationError::UnrepresentableAmount {
                    currency: currency.clone(),
                    amount: total,
                })?;
            Ok((member.clone(), to_units(amount, currency, context)?))
        })
        .collect::<Result<Vec<_>, AllocationError>>()?;

    take_back_overshoot(total_units, &mut participants);
    Ok(initiator_remainder(total_units, participants))
}

/// Rounding, or percentages within the tolerance above 100, can hand the
/// participants more than the total. The overshoot is taken back from the
/// last participants in input order.
fn take_back_overshoot(total_units: Money, participants: &mut [(MemberId, Money)]) {
    let allocated: i128 = participants
        .iter()
        .map(|(_, amount)| i128::from(amount.minor_units()))
        .sum();
    let mut overshoot = allocated - i128::from(total_units.minor_units());
    if overshoot <= 0 {
        return;
    }

    tracing::debug!(
        total_units = total_units.minor_units(),
        overshoot = %overshoot,
        "Taking percentage overshoot back from participants"
    );
    for (_, amount) in participants.iter_mut().rev() {
        if overshoot <= 0 {
            break;
        }
        let units = amount.minor_units();
        let taken = i64::try_from(overshoot).map_or(units, |wanted| wanted.min(units));
        *amount = Money::from_minor(units - taken);
        overshoot -= i128::from(taken);
    }
}

/// The initiator keeps what the participants leave over. Overshoot within
/// tolerance leaves the initiator with nothing rather than a negative share.
fn initiator_remainder(total_units: Money, participants: Vec<(MemberId, Money)>) -> Shares {
    let allocated: Money = participants.iter().map(|(_, amount)| *amount).sum();
    let initiator_share = (total_units - allocated).max(Money::ZERO);
    (participants, initiator_share)
}

fn validate_participants(
    initiator: &MemberId,
    participants: &[&MemberId],
) -> Result<(), AllocationError> {
    if participants.is_empty() {
        return Err(AllocationError::NoParticipants);
    }

    let mut seen = FxHashSet::default();
    for &member in participants {
        if member.is_blank() {
            return Err(AllocationError::MissingParticipant);
        }
        if member == initiator {
            return Err(AllocationError::InitiatorAsParticipant(member.clone()));
        }
        if !seen.insert(member) {
            return Err(AllocationError::DuplicateParticipant(member.clone()));
        }
    }
    Ok(())
}

/// Sum of the entry values, rejecting the first value that overflows it.
fn checked_total(
    entries: &[(MemberId, Decimal)],
    currency: &Currency,
) -> Result<Decimal, AllocationError> {
    entries.iter().try_fold(Decimal::ZERO, |total, (_, value)| {
        total
            .checked_add(*value)
            .ok_or_else(|| AllocationError::UnrepresentableAmount {
                currency: currency.clone(),
                amount: *value,
            })
    })
}

fn check_non_negative(entries: &[(MemberId, Decimal)]) -> Result<(), AllocationError> {
    match entries.iter().find(|(_, value)| value.is_sign_negative() && !value.is_zero()) {
        Some((member, value)) => Err(AllocationError::NegativeValue {
            member: member.clone(),
            value: *value,
        }),
        None => Ok(()),
    }
}

fn to_units(
    amount: Decimal,
    currency: &Currency,
    context: &SettlementContext,
) -> Result<Money, AllocationError> {
    context
        .to_minor_units(amount, currency)
        .map_err(|_| AllocationError::UnrepresentableAmount {
            currency: currency.clone(),
            amount,
        })
}

fn method_name(method: &SplitMethod) -> &'static str {
    match method {
        SplitMethod::Equal(_) => "equal",
        SplitMethod::Exact(_) => "exact",
        SplitMethod::Percentage(_) => "percentage",
    }
}
