use std::str::FromStr;

use divvy_application::{ApplicationError, GreedyOptimizer, GroupLedger, SettlementService};
use divvy_domain::{
    BalanceLine, Currency, MemberId, SettlementContext, SplitMethod, TransferLine,
    ValidationError,
    services::{Finding, IngestPolicy},
};
use rstest::{fixture, rstest};
use rust_decimal::Decimal;

static OPTIMIZER: GreedyOptimizer = GreedyOptimizer;

#[fixture]
fn ledger() -> GroupLedger {
    serde_json::from_str(
        r#"{
            "group_id": "trip",
            "members": ["ana", "ben", "cy", "dee"],
            "expenses": [
                { "id": "dinner", "payer": "ana", "amount": "100.00", "currency": "USD", "group_id": "trip" },
                { "id": "taxi", "payer": "ben", "amount": "30.00", "currency": "USD" }
            ],
            "splits": [
                {
                    "id": "s-dinner",
                    "initiator": "ana",
                    "currency": "USD",
                    "expense_id": "dinner",
                    "group_id": "trip",
                    "participants": [
                        { "member": "ben", "amount_owed": "25.00" },
                        { "member": "cy", "amount_owed": "25.00" },
                        { "member": "dee", "amount_owed": "25.00", "settled": true }
                    ]
                },
                {
                    "id": "s-taxi",
                    "initiator": "ben",
                    "currency": "USD",
                    "expense_id": "taxi",
                    "participants": [
                        { "member": "ana", "amount_owed": "10.00" },
                        { "member": "cy", "amount_owed": "10.00" }
                    ]
                },
                {
                    "id": "s-other-group",
                    "initiator": "cy",
                    "currency": "USD",
                    "group_id": "flat",
                    "participants": [{ "member": "ana", "amount_owed": "500.00" }]
                }
            ]
        }"#,
    )
    .expect("valid ledger document")
}

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid decimal")
}

fn balance(member: &str, amount: &str) -> BalanceLine {
    BalanceLine {
        member: MemberId::from(member),
        currency: Currency::from("USD"),
        amount: dec(amount),
    }
}

fn transfer(from: &str, to: &str, amount: &str) -> TransferLine {
    TransferLine {
        from: MemberId::from(from),
        to: MemberId::from(to),
        currency: Currency::from("USD"),
        amount: dec(amount),
    }
}

#[rstest]
fn overview_settles_the_group(ledger: GroupLedger) {
    let context = SettlementContext::default();
    let service = SettlementService::new(&OPTIMIZER, &context);

    let overview = service.group_overview(&ledger).expect("valid ledger");

    assert_eq!(
        overview.balance_lines,
        vec![
            balance("ana", "65.00"),
            balance("ben", "-5.00"),
            balance("cy", "-35.00"),
            balance("dee", "-25.00"),
        ]
    );
    assert_eq!(
        overview.transfer_lines,
        vec![
            transfer("cy", "ana", "35.00"),
            transfer("dee", "ana", "25.00"),
            transfer("ben", "ana", "5.00"),
        ]
    );
    assert_eq!(overview.paid.len(), 2);
    assert!(overview.findings.is_empty());
    assert!(overview.rejected.is_empty());
}

#[rstest]
fn outstanding_scope_leaves_settled_participants_out(ledger: GroupLedger) {
    let context = SettlementContext::default()
        .with_balance_scope(divvy_domain::services::BalanceScope::Outstanding);
    let service = SettlementService::new(&OPTIMIZER, &context);

    let overview = service.group_overview(&ledger).expect("valid ledger");

    assert!(
        overview
            .balance_lines
            .iter()
            .all(|line| line.member != MemberId::from("dee"))
    );
    assert_eq!(overview.transfers.len(), 2);
}

#[rstest]
fn malformed_split_aborts_or_is_reported(mut ledger: GroupLedger) {
    ledger.splits[1].participants[0].amount_owed = dec("-10.00");

    let context = SettlementContext::default();
    let service = SettlementService::new(&OPTIMIZER, &context);
    assert!(matches!(
        service.group_overview(&ledger),
        Err(ApplicationError::Validation(ValidationError::NegativeAmount { .. }))
    ));

    let context = SettlementContext::default().with_ingest_policy(IngestPolicy::SkipInvalid);
    let service = SettlementService::new(&OPTIMIZER, &context);
    let overview = service.group_overview(&ledger).expect("skip policy");
    assert_eq!(overview.rejected.len(), 1);
    assert_eq!(overview.transfers.len(), 3);
}

#[rstest]
fn oversized_split_is_flagged(mut ledger: GroupLedger) {
    ledger.splits[1].participants[1].amount_owed = dec("25.00");

    let context = SettlementContext::default();
    let service = SettlementService::new(&OPTIMIZER, &context);
    let overview = service.group_overview(&ledger).expect("valid ledger");

    assert!(matches!(
        overview.findings.as_slice(),
        [Finding::ExceedsExpense { excess, .. }] if *excess == dec("5.00")
    ));
}

#[rstest]
fn created_split_feeds_back_into_the_ledger(mut ledger: GroupLedger) {
    let context = SettlementContext::default();
    let service = SettlementService::new(&OPTIMIZER, &context);

    let taxi = ledger.expenses[1].clone();
    let split = service
        .create_split(
            &taxi,
            &MemberId::from("ben"),
            &SplitMethod::Percentage(vec![
                (MemberId::from("ana"), dec("50")),
                (MemberId::from("dee"), dec("50")),
            ]),
        )
        .expect("valid allocation");
    assert_eq!(split.participants[0].amount_owed, dec("15.00"));

    ledger.splits.truncate(1);
    ledger.splits.push(split);
    let overview = service.group_overview(&ledger).expect("valid ledger");

    assert_eq!(
        overview.balance_lines,
        vec![
            balance("ana", "60.00"),
            balance("ben", "5.00"),
            balance("cy", "-25.00"),
            balance("dee", "-40.00"),
        ]
    );
}

#[rstest]
fn debt_overview_and_settling_are_per_viewer(ledger: GroupLedger) {
    let context = SettlementContext::default();
    let service = SettlementService::new(&OPTIMIZER, &context);

    let overview = service
        .debt_overview(&MemberId::from("cy"), &ledger.splits[..2])
        .expect("valid splits");
    let amounts: Vec<(String, i64)> = overview
        .balances
        .iter()
        .map(|line| (line.counterparty.to_string(), line.amount.minor_units()))
        .collect();
    assert_eq!(
        amounts,
        vec![("ana".to_string(), -2500), ("ben".to_string(), -1000)]
    );

    let settled = service
        .mark_settled(&ledger.splits[0], &MemberId::from("cy"), true)
        .expect("cy is a participant");
    assert!(settled.participants[1].settled);
}

#[rstest]
fn host_held_decimal_balances_are_settled() {
    let context = SettlementContext::default();
    let service = SettlementService::new(&OPTIMIZER, &context);

    let transfers = service
        .settle_balances(
            &Currency::from("USD"),
            &[
                (MemberId::from("ana"), dec("20.005")),
                (MemberId::from("ben"), dec("-10.00")),
                (MemberId::from("cy"), dec("-10.00")),
            ],
        )
        .expect("slack below one cent");

    let lines: Vec<TransferLine> = transfers
        .iter()
        .map(|transfer| transfer.to_line(&context))
        .collect();
    assert_eq!(
        lines,
        vec![transfer("ben", "ana", "10.00"), transfer("cy", "ana", "10.00")]
    );
}
