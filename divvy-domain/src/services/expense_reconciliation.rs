use std::collections::BTreeMap;

use fxhash::FxHashMap;
use rust_decimal::Decimal;

use crate::{
    error::{ExpenseProblem, ValidationError},
    model::{Currency, Expense, ExpenseId, MemberId, Money, Split, SplitRef},
    services::{IngestPolicy, SettlementContext},
};

/// How much one member paid for the group in one currency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaidTotal {
    pub payer: MemberId,
    pub currency: Currency,
    pub amount: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaidTotals {
    /// Ordered by `(currency, payer)`.
    pub totals: Vec<PaidTotal>,
    pub rejected: Vec<ValidationError>,
}

/// Data-quality issue between a split and the expense it points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Finding {
    /// The participants owe more than the whole expense.
    ExceedsExpense {
        split: SplitRef,
        expense: ExpenseId,
        currency: Currency,
        expense_amount: Decimal,
        split_total: Decimal,
        excess: Decimal,
    },
    CurrencyMismatch {
        split: SplitRef,
        expense: ExpenseId,
        expense_currency: Currency,
        split_currency: Currency,
    },
    MissingExpense { split: SplitRef, expense: ExpenseId },
    /// The participant amounts cannot be added up.
    UnrepresentableTotal {
        split: SplitRef,
        expense: ExpenseId,
        currency: Currency,
    },
}

/// Cross-checks expenses against the splits derived from them. Neither
/// operation changes any balance.
pub struct ExpenseReconciler;

impl ExpenseReconciler {
    pub fn paid_totals(
        &self,
        expenses: &[Expense],
        context: &SettlementContext,
    ) -> Result<PaidTotals, ValidationError> {
        let mut totals: BTreeMap<(Currency, MemberId), i128> = BTreeMap::new();
        let mut rejected = Vec::new();

        for expense in expenses {
            match validate_expense(expense, context) {
                Ok(amount) => {
                    *totals
                        .entry((expense.currency.clone(), expense.payer.clone()))
                        .or_insert(0) += i128::from(amount.minor_units());
                }
                Err(err) => {
                    tracing::warn!(
                        expense = %expense.id,
                        policy = ?context.ingest_policy,
                        error = %err,
                        "Rejected malformed expense"
                    );
                    match context.ingest_policy {
                        IngestPolicy::Abort => return Err(err),
                        IngestPolicy::SkipInvalid => rejected.push(err),
                    }
                }
            }
        }

        let totals = totals
            .into_iter()
            .map(|((currency, payer), total)| match Money::try_from_wide(total) {
                Some(amount) => Ok(PaidTotal {
                    payer,
                    currency,
                    amount,
                }),
                None => Err(ValidationError::BalanceOverflow {
                    member: payer,
                    currency,
                }),
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(PaidTotals { totals, rejected })
    }

    /// Reports splits whose linked expense is absent, in another currency, or
    /// smaller than what the participants owe. A split total below the
    /// expense amount is normal: the initiator's own share is implicit.
    pub fn reconcile(
        &self,
        expenses: &[Expense],
        splits: &[Split],
        context: &SettlementContext,
    ) -> Vec<Finding> {
        let by_id: FxHashMap<&ExpenseId, &Expense> =
            expenses.iter().map(|expense| (&expense.id, expense)).collect();

        let mut findings = Vec::new();
        for (position, split) in splits.iter().enumerate() {
            let Some(expense_id) = &split.expense_id else {
                continue;
            };
            let split_ref = SplitRef::from_split(split, Some(position));

            let Some(expense) = by_id.get(expense_id) else {
                findings.push(Finding::MissingExpense {
                    split: split_ref,
                    expense: expense_id.clone(),
                });
                continue;
            };

            if expense.currency != split.currency {
                findings.push(Finding::CurrencyMismatch {
                    split: split_ref,
                    expense: expense_id.clone(),
                    expense_currency: expense.currency.clone(),
                    split_currency: split.currency.clone(),
                });
                continue;
            }

            let Some(split_total) = participant_total(split) else {
                findings.push(Finding::UnrepresentableTotal {
                    split: split_ref,
                    expense: expense_id.clone(),
                    currency: split.currency.clone(),
                });
                continue;
            };
            let limit = expense
                .amount
                .saturating_add(context.minor_unit(&split.currency));
            if split_total > limit {
                findings.push(Finding::ExceedsExpense {
                    split: split_ref,
                    expense: expense_id.clone(),
                    currency: split.currency.clone(),
                    expense_amount: expense.amount,
                    split_total,
                    excess: split_total.saturating_sub(expense.amount),
                });
            }
        }

        for finding in &findings {
            tracing::warn!(finding = ?finding, "Split does not reconcile with its expense");
        }

        findings
    }
}

/// What the listed participants owe, or `None` when the sum overflows.
fn participant_total(split: &Split) -> Option<Decimal> {
    split
        .participants
        .iter()
        .filter(|participant| participant.member != split.initiator)
        .try_fold(Decimal::ZERO, |total, participant| {
            total.checked_add(participant.amount_owed)
        })
}

fn validate_expense(
    expense: &Expense,
    context: &SettlementContext,
) -> Result<Money, ValidationError> {
    let invalid = |problem: ExpenseProblem| ValidationError::InvalidExpense {
        expense: expense.id.clone(),
        problem,
    };

    if expense.payer.is_blank() {
        return Err(invalid(ExpenseProblem::MissingPayer));
    }
    if expense.currency.is_blank() {
        return Err(invalid(ExpenseProblem::MissingCurrency));
    }
    if expense.amount <= Decimal::ZERO {
        return Err(invalid(ExpenseProblem::NonPositiveAmount(expense.amount)));
    }
    context
        .to_minor_units(expense.amount, &expense.currency)
        .map_err(|_| invalid(ExpenseProblem::UnrepresentableAmount(expense.amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SplitParticipant;
    use rstest::{fixture, rstest};

    #[fixture]
    fn reconciler() -> ExpenseReconciler {
        ExpenseReconciler
    }

    fn expense(id: &str, payer: &str, cents: i64, currency: &str) -> Expense {
        Expense {
            id: ExpenseId::from(id),
            payer: MemberId::from(payer),
            amount: Decimal::new(cents, 2),
            currency: Currency::from(currency),
            group_id: None,
        }
    }

    fn owes(member: &str, cents: i64) -> SplitParticipant {
        SplitParticipant::new(member, Decimal::new(cents, 2))
    }

    #[rstest]
    fn sums_paid_amounts_per_payer_and_currency(reconciler: ExpenseReconciler) {
        let expenses = [
            expense("e1", "A", 1000, "USD"),
            expense("e2", "A", 250, "USD"),
            expense("e3", "B", 400, "EUR"),
        ];

        let paid = reconciler
            .paid_totals(&expenses, &SettlementContext::default())
            .expect("valid expenses");

        assert_eq!(
            paid.totals,
            vec![
                PaidTotal {
                    payer: MemberId::from("B"),
                    currency: Currency::from("EUR"),
                    amount: Money::from_minor(400),
                },
                PaidTotal {
                    payer: MemberId::from("A"),
                    currency: Currency::from("USD"),
                    amount: Money::from_minor(1250),
                },
            ]
        );
    }

    #[rstest]
    #[case::missing_payer(expense("e1", "", 100, "USD"), ExpenseProblem::MissingPayer)]
    #[case::missing_currency(expense("e1", "A", 100, ""), ExpenseProblem::MissingCurrency)]
    #[case::zero_amount(expense("e1", "A", 0, "USD"), ExpenseProblem::NonPositiveAmount(Decimal::ZERO))]
    fn rejects_malformed_expense(
        reconciler: ExpenseReconciler,
        #[case] expense: Expense,
        #[case] problem: ExpenseProblem,
    ) {
        let result = reconciler.paid_totals(&[expense], &SettlementContext::default());

        assert_eq!(
            result,
            Err(ValidationError::InvalidExpense {
                expense: ExpenseId::from("e1"),
                problem,
            })
        );
    }

    #[rstest]
    fn skips_malformed_expense_when_configured(reconciler: ExpenseReconciler) {
        let context = SettlementContext::default().with_ingest_policy(IngestPolicy::SkipInvalid);
        let expenses = [expense("e1", "A", -5, "USD"), expense("e2", "A", 500, "USD")];

        let paid = reconciler
            .paid_totals(&expenses, &context)
            .expect("skip policy never fails");

        assert_eq!(paid.totals.len(), 1);
        assert_eq!(paid.totals[0].amount, Money::from_minor(500));
        assert_eq!(paid.rejected.len(), 1);
    }

    #[rstest]
    fn consistent_splits_produce_no_findings(reconciler: ExpenseReconciler) {
        let expenses = [expense("e1", "I", 10000, "USD")];
        let splits = [
            Split::new("I", "USD", vec![owes("A", 2500), owes("B", 2500), owes("C", 2500)])
                .with_expense("e1"),
            Split::new("I", "USD", vec![owes("A", 100)]),
        ];

        let findings = reconciler.reconcile(&expenses, &splits, &SettlementContext::default());

        assert!(findings.is_empty());
    }

    #[rstest]
    fn reports_inconsistent_splits(reconciler: ExpenseReconciler) {
        let expenses = [
            expense("e1", "I", 3000, "USD"),
            expense("e2", "I", 3000, "EUR"),
        ];
        let splits = [
            Split::new("I", "USD", vec![owes("A", 2000), owes("B", 1500)])
                .with_id("s1")
                .with_expense("e1"),
            Split::new("I", "USD", vec![owes("A", 1000)])
                .with_id("s2")
                .with_expense("e2"),
            Split::new("I", "USD", vec![owes("A", 1000)]).with_expense("gone"),
        ];

        let findings = reconciler.reconcile(&expenses, &splits, &SettlementContext::default());

        assert_eq!(
            findings,
            vec![
                Finding::ExceedsExpense {
                    split: SplitRef::Id("s1".into()),
                    expense: ExpenseId::from("e1"),
                    currency: Currency::from("USD"),
                    expense_amount: Decimal::new(3000, 2),
                    split_total: Decimal::new(3500, 2),
                    excess: Decimal::new(500, 2),
                },
                Finding::CurrencyMismatch {
                    split: SplitRef::Id("s2".into()),
                    expense: ExpenseId::from("e2"),
                    expense_currency: Currency::from("EUR"),
                    split_currency: Currency::from("USD"),
                },
                Finding::MissingExpense {
                    split: SplitRef::Position(2),
                    expense: ExpenseId::from("gone"),
                },
            ]
        );
    }

    #[rstest]
    fn paid_total_overflow_is_rejected(reconciler: ExpenseReconciler) {
        let expenses = [
            expense("e1", "A", 5_000_000_000_000_000_000, "USD"),
            expense("e2", "A", 5_000_000_000_000_000_000, "USD"),
        ];

        let result = reconciler.paid_totals(&expenses, &SettlementContext::default());

        assert_eq!(
            result,
            Err(ValidationError::BalanceOverflow {
                member: MemberId::from("A"),
                currency: Currency::from("USD"),
            })
        );
    }

    #[rstest]
    fn split_total_beyond_decimal_range_is_reported(reconciler: ExpenseReconciler) {
        let expenses = [expense("e1", "I", 3000, "USD")];
        let splits = [Split::new(
            "I",
            "USD",
            vec![
                SplitParticipant::new("A", Decimal::MAX),
                SplitParticipant::new("B", Decimal::MAX),
            ],
        )
        .with_expense("e1")];

        let findings = reconciler.reconcile(&expenses, &splits, &SettlementContext::default());

        assert_eq!(
            findings,
            vec![Finding::UnrepresentableTotal {
                split: SplitRef::Position(0),
                expense: ExpenseId::from("e1"),
                currency: Currency::from("USD"),
            }]
        );
    }
}
