use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{error::ValidationError, services::SettlementContext};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub SmolStr);

        impl $name {
            pub fn new(id: impl Into<SmolStr>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// `true` when the id is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(
    /// Opaque member identifier, unique within a group.
    MemberId
);
opaque_id!(
    /// Currency code. Amounts in different currencies are never combined.
    Currency
);
opaque_id!(GroupId);
opaque_id!(ExpenseId);
opaque_id!(SplitId);

/// Signed amount in integer minor currency units (e.g. cents).
///
/// The scale that turns units back into a decimal amount belongs to the
/// currency and is looked up through [`SettlementContext`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(units: i64) -> Self {
        Self(units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Narrows a wide accumulator total back to minor units.
    pub fn try_from_wide(units: i128) -> Option<Self> {
        i64::try_from(units).ok().map(Self)
    }

    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn signum(self) -> i64 {
        self.0.signum()
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn to_decimal(self, scale: u32) -> Decimal {
        Decimal::new(self.0, scale)
    }

    /// Splits a non-negative amount into `parts` shares that add back up to
    /// the amount exactly. Every share gets the truncated quotient and the
    /// first share also takes the remainder.
    pub fn split_even(self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let divisor = parts as i64;
        let base = self.0 / divisor;
        let remainder = self.0 % divisor;

        let mut shares = vec![Money(base); parts];
        shares[0] += Money(remainder);
        shares
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Money a member personally paid on behalf of the group.
///
/// Informational only: balances come from the splits attached to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub payer: MemberId,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitParticipant {
    pub member: MemberId,
    pub amount_owed: Decimal,
    #[serde(default)]
    pub settled: bool,
}

impl SplitParticipant {
    pub fn new(member: impl Into<MemberId>, amount_owed: Decimal) -> Self {
        Self {
            member: member.into(),
            amount_owed,
            settled: false,
        }
    }

    pub fn settled(mut self) -> Self {
        self.settled = true;
        self
    }
}

/// Explicit assignment of debt: every participant owes `amount_owed` to the
/// initiator in `currency`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    #[serde(default)]
    pub id: Option<SplitId>,
    pub initiator: MemberId,
    pub participants: Vec<SplitParticipant>,
    pub currency: Currency,
    #[serde(default)]
    pub expense_id: Option<ExpenseId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

impl Split {
    pub fn new(
        initiator: impl Into<MemberId>,
        currency: impl Into<Currency>,
        participants: Vec<SplitParticipant>,
    ) -> Self {
        Self {
            id: None,
            initiator: initiator.into(),
            participants,
            currency: currency.into(),
            expense_id: None,
            group_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<SplitId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_expense(mut self, expense_id: impl Into<ExpenseId>) -> Self {
        self.expense_id = Some(expense_id.into());
        self
    }

    pub fn with_group(mut self, group_id: impl Into<GroupId>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn participant(&self, member: &MemberId) -> Option<&SplitParticipant> {
        self.participants
            .iter()
            .find(|participant| &participant.member == member)
    }

    pub fn involves(&self, member: &MemberId) -> bool {
        &self.initiator == member || self.participant(member).is_some()
    }

    /// Returns a copy of this split with one participant's settled flag
    /// replaced.
    pub fn with_participant_settled(
        &self,
        member: &MemberId,
        settled: bool,
    ) -> Result<Split, ValidationError> {
        if self.participant(member).is_none() {
            return Err(ValidationError::UnknownParticipant {
                split: SplitRef::from_split(self, None),
                member: member.clone(),
            });
        }

        let mut updated = self.clone();
        for participant in &mut updated.participants {
            if &participant.member == member {
                participant.settled = settled;
            }
        }
        Ok(updated)
    }
}

/// Identifies a split inside error and diagnostic messages.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SplitRef {
    Id(SplitId),
    Position(usize),
    Unidentified,
}

impl SplitRef {
    pub fn from_split(split: &Split, position: Option<usize>) -> Self {
        match (&split.id, position) {
            (Some(id), _) => SplitRef::Id(id.clone()),
            (None, Some(position)) => SplitRef::Position(position),
            (None, None) => SplitRef::Unidentified,
        }
    }
}

impl fmt::Display for SplitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitRef::Id(id) => write!(f, "{id}"),
            SplitRef::Position(position) => write!(f, "#{position}"),
            SplitRef::Unidentified => f.write_str("<unidentified>"),
        }
    }
}

/// One normalized debt edge: `debtor` owes `creditor` `amount`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Movement {
    pub creditor: MemberId,
    pub debtor: MemberId,
    pub currency: Currency,
    pub amount: Money,
}

/// Balances of a single currency keyed by member. Ordered for deterministic
/// iteration.
pub type MemberBalances = BTreeMap<MemberId, Money>;

/// Signed balance per `(member, currency)`. Positive: is owed. Negative: owes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetBalances {
    entries: BTreeMap<(Currency, MemberId), Money>,
}

impl NetBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, member: &MemberId, currency: &Currency) -> Option<Money> {
        self.entries
            .get(&(currency.clone(), member.clone()))
            .copied()
    }

    pub fn add(&mut self, member: &MemberId, currency: &Currency, amount: Money) {
        *self
            .entries
            .entry((currency.clone(), member.clone()))
            .or_insert(Money::ZERO) += amount;
    }

    pub fn currencies(&self) -> BTreeSet<Currency> {
        self.entries
            .keys()
            .map(|(currency, _)| currency.clone())
            .collect()
    }

    pub fn for_currency(&self, currency: &Currency) -> MemberBalances {
        self.iter()
            .filter(|(_, entry_currency, _)| *entry_currency == currency)
            .map(|(member, _, amount)| (member.clone(), amount))
            .collect()
    }

    pub fn total(&self, currency: &Currency) -> Money {
        self.iter()
            .filter(|(_, entry_currency, _)| *entry_currency == currency)
            .map(|(_, _, amount)| amount)
            .sum()
    }

    /// Iterates in `(currency, member)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, &Currency, Money)> + '_ {
        self.entries
            .iter()
            .map(|((currency, member), amount)| (member, currency, *amount))
    }

    /// Display view without the pairs whose balance is exactly zero.
    pub fn non_zero(&self) -> NetBalances {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(|(key, amount)| (key.clone(), *amount))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_decimal_lines(&self, context: &SettlementContext) -> Vec<BalanceLine> {
        self.iter()
            .map(|(member, currency, amount)| BalanceLine {
                member: member.clone(),
                currency: currency.clone(),
                amount: context.to_decimal(amount, currency),
            })
            .collect()
    }
}

impl FromIterator<(MemberId, Currency, Money)> for NetBalances {
    fn from_iter<T: IntoIterator<Item = (MemberId, Currency, Money)>>(iter: T) -> Self {
        let mut balances = NetBalances::new();
        for (member, currency, amount) in iter {
            balances.add(&member, &currency, amount);
        }
        balances
    }
}

/// Decimal view of one net balance, for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub member: MemberId,
    pub currency: Currency,
    pub amount: Decimal,
}

/// Settlement instruction: `from` pays `to` a positive `amount`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub from: MemberId,
    pub to: MemberId,
    pub currency: Currency,
    pub amount: Money,
}

impl Transfer {
    pub fn to_line(&self, context: &SettlementContext) -> TransferLine {
        TransferLine {
            from: self.from.clone(),
            to: self.to.clone(),
            currency: self.currency.clone(),
            amount: context.to_decimal(self.amount, &self.currency),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub from: MemberId,
    pub to: MemberId,
    pub currency: Currency,
    pub amount: Decimal,
}

/// Applies transfers to a copy of `balances`: payers move up, receivers down.
pub fn apply_transfers(balances: &NetBalances, transfers: &[Transfer]) -> NetBalances {
    let mut settled = balances.clone();
    for transfer in transfers {
        settled.add(&transfer.from, &transfer.currency, transfer.amount);
        settled.add(&transfer.to, &transfer.currency, -transfer.amount);
    }
    settled
}
