use std::collections::BTreeSet;

use divvy_domain::{
    Currency, DebtSimplifier, MemberId, Money, NetBalances, SettlementContext, Split,
    SplitAllocator, SplitMethod, SplitParticipant, apply_transfers, compute_net_balances,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const CURRENCIES: [&str; 2] = ["EUR", "USD"];

type RawSplit = (usize, Vec<(usize, i64)>, usize);

fn members(count: usize) -> Vec<MemberId> {
    (0..count)
        .map(|idx| MemberId::new(format!("m{idx}")))
        .collect()
}

fn build_splits(members: &[MemberId], raw: &[RawSplit]) -> Vec<Split> {
    raw.iter()
        .map(|(initiator, participants, currency)| {
            Split::new(
                members[initiator % members.len()].clone(),
                CURRENCIES[currency % CURRENCIES.len()],
                participants
                    .iter()
                    .map(|(member, cents)| {
                        SplitParticipant::new(
                            members[member % members.len()].clone(),
                            Decimal::new(*cents, 2),
                        )
                    })
                    .collect(),
            )
        })
        .collect()
}

fn raw_splits() -> impl Strategy<Value = Vec<RawSplit>> {
    prop::collection::vec(
        (
            0usize..6,
            prop::collection::vec((0usize..6, 0i64..=10_000), 1..=4),
            0usize..2,
        ),
        0..=20,
    )
}

fn non_zero_members(balances: &NetBalances, currency: &Currency) -> usize {
    balances
        .for_currency(currency)
        .values()
        .filter(|amount| !amount.is_zero())
        .count()
}

proptest! {
    #[test]
    fn balances_sum_to_zero_per_currency(
        member_count in 2usize..=6,
        raw in raw_splits(),
    ) {
        let members = members(member_count);
        let splits = build_splits(&members, &raw);
        let balances = compute_net_balances(&members, &splits, &SettlementContext::default())
            .expect("generated splits are valid")
            .balances;

        for currency in balances.currencies() {
            prop_assert_eq!(balances.total(&currency), Money::ZERO);
        }
    }

    #[test]
    fn transfers_settle_every_balance(
        member_count in 2usize..=6,
        raw in raw_splits(),
    ) {
        let context = SettlementContext::default();
        let members = members(member_count);
        let splits = build_splits(&members, &raw);
        let balances = compute_net_balances(&members, &splits, &context)
            .expect("generated splits are valid")
            .balances;

        let transfers = DebtSimplifier
            .simplify_all(&balances, &context)
            .expect("accumulated balances are balanced");

        for transfer in &transfers {
            prop_assert!(transfer.amount.is_positive());
            prop_assert_ne!(&transfer.from, &transfer.to);
        }
        prop_assert!(apply_transfers(&balances, &transfers).non_zero().is_empty());

        for currency in balances.currencies() {
            let count = transfers.iter().filter(|t| t.currency == currency).count();
            prop_assert!(count <= non_zero_members(&balances, &currency).saturating_sub(1));
        }
    }

    #[test]
    fn split_order_does_not_change_results(
        member_count in 2usize..=6,
        raw in raw_splits(),
        rotation in 0usize..20,
    ) {
        let context = SettlementContext::default();
        let members = members(member_count);
        let splits = build_splits(&members, &raw);
        let mut permuted = splits.clone();
        permuted.reverse();
        if !permuted.is_empty() {
            let len = permuted.len();
            permuted.rotate_left(rotation % len);
        }

        let expected = compute_net_balances(&members, &splits, &context)
            .expect("generated splits are valid")
            .balances;
        let actual = compute_net_balances(&members, &permuted, &context)
            .expect("generated splits are valid")
            .balances;
        prop_assert_eq!(&actual, &expected);

        prop_assert_eq!(
            DebtSimplifier.simplify_all(&actual, &context).expect("balanced"),
            DebtSimplifier.simplify_all(&expected, &context).expect("balanced")
        );
    }

    #[test]
    fn equal_split_reconstructs_total(
        cents in 1i64..=1_000_000,
        participant_count in 1usize..=10,
    ) {
        let context = SettlementContext::default();
        let participants: Vec<MemberId> = (0..participant_count)
            .map(|idx| MemberId::new(format!("p{idx}")))
            .collect();

        let allocation = SplitAllocator
            .allocate(
                Decimal::new(cents, 2),
                &Currency::from("USD"),
                &MemberId::from("initiator"),
                &SplitMethod::Equal(participants),
                &context,
            )
            .expect("valid equal split");

        prop_assert_eq!(
            allocation.participant_total() + allocation.initiator_share,
            Money::from_minor(cents)
        );
        let distinct: BTreeSet<i64> = allocation
            .participants
            .iter()
            .skip(1)
            .map(|(_, amount)| amount.minor_units())
            .chain([allocation.initiator_share.minor_units()])
            .collect();
        prop_assert_eq!(distinct.len(), 1);
    }

    #[test]
    fn single_expense_round_trip_pays_back_participant_shares(
        cents in 1i64..=1_000_000,
        participant_count in 1usize..=10,
    ) {
        let context = SettlementContext::default();
        let usd = Currency::from("USD");
        let initiator = MemberId::from("initiator");
        let participants: Vec<MemberId> = (0..participant_count)
            .map(|idx| MemberId::new(format!("p{idx}")))
            .collect();

        let allocation = SplitAllocator
            .allocate(
                Decimal::new(cents, 2),
                &usd,
                &initiator,
                &SplitMethod::Equal(participants.clone()),
                &context,
            )
            .expect("valid equal split");
        let owed = allocation.participant_total();
        let split = allocation.into_split(None, None, &context);

        let balances = compute_net_balances(&participants, &[split], &context)
            .expect("allocated split is valid")
            .balances;
        let transfers = DebtSimplifier
            .simplify(&usd, &balances.for_currency(&usd), &context)
            .expect("balanced");

        prop_assert!(transfers.iter().all(|t| t.to == initiator));
        prop_assert_eq!(transfers.iter().map(|t| t.amount).sum::<Money>(), owed);
    }
}
