#![warn(clippy::uninlined_format_args)]

mod model;

use std::cmp::Ordering;
use thiserror::Error;

pub use model::{Payment, PersonBalance};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error(
        "Creditor and debtor totals must match (creditors={creditor_total}, debtors={debtor_total})"
    )]
    ImbalancedTotal {
        creditor_total: u128,
        debtor_total: u128,
    },
}

struct Party<MemberId> {
    id: MemberId,
    remaining: u64,
}

/// Builds the transfer list that settles every balance with at most
/// `non-zero members - 1` payments.
///
/// Creditors and debtors are each ordered by `(magnitude desc, id asc)` and
/// matched front to front; whenever a party's remaining magnitude reaches
/// zero the matching advances past it. Ids are expected to be unique.
///
/// # Errors
/// [`SettlementError::ImbalancedTotal`] when positive and negative balances do
/// not cancel out exactly.
pub fn construct_settlement_transfers<MemberId>(
    people: impl IntoIterator<Item = PersonBalance<MemberId>>,
) -> Result<Vec<Payment<MemberId>>, SettlementError>
where
    MemberId: Ord + Clone,
{
    let mut creditors: Vec<Party<MemberId>> = Vec::new();
    let mut debtors: Vec<Party<MemberId>> = Vec::new();
    let mut creditor_total = 0_u128;
    let mut debtor_total = 0_u128;

    for person in people {
        let magnitude = person.balance.unsigned_abs();
        match person.balance.cmp(&0) {
            Ordering::Greater => {
                creditor_total += u128::from(magnitude);
                creditors.push(Party {
                    id: person.id,
                    remaining: magnitude,
                });
            }
            Ordering::Less => {
                debtor_total += u128::from(magnitude);
                debtors.push(Party {
                    id: person.id,
                    remaining: magnitude,
                });
            }
            Ordering::Equal => {}
        }
    }

    if creditor_total != debtor_total {
        return Err(SettlementError::ImbalancedTotal {
            creditor_total,
            debtor_total,
        });
    }

    sort_parties(&mut creditors);
    sort_parties(&mut debtors);

    let mut transfers = Vec::with_capacity((creditors.len() + debtors.len()).saturating_sub(1));
    let mut creditor_idx = 0;
    let mut debtor_idx = 0;

    while creditor_idx < creditors.len() && debtor_idx < debtors.len() {
        let creditor = &mut creditors[creditor_idx];
        let debtor = &mut debtors[debtor_idx];
        let amount = creditor.remaining.min(debtor.remaining);

        // Bounded by a creditor's positive i64 balance.
        transfers.push(Payment {
            from: debtor.id.clone(),
            to: creditor.id.clone(),
            amount: amount as i64,
        });

        creditor.remaining -= amount;
        debtor.remaining -= amount;
        if creditor.remaining == 0 {
            creditor_idx += 1;
        }
        if debtor.remaining == 0 {
            debtor_idx += 1;
        }
    }

    Ok(transfers)
}

fn sort_parties<MemberId: Ord>(parties: &mut [Party<MemberId>]) {
    parties.sort_by(|a, b| {
        b.remaining
            .cmp(&a.remaining)
            .then_with(|| a.id.cmp(&b.id))
    });
}
