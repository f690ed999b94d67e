/// Net balance of one person in integer atomic units (e.g. cents).
///
/// Positive: the person is owed money. Negative: the person owes money.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonBalance<MemberId = u64> {
    pub id: MemberId,
    pub balance: i64,
}

/// A directed payment from a debtor to a creditor, in atomic units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment<MemberId = u64> {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: i64,
}
