use divvy_domain::{
    Currency, Expense, LedgerBalances, MemberId, SettlementContext, Split, SplitAllocator,
    SplitMethod, Transfer, compute_net_balances,
    services::{DebtOverview, DebtOverviewBuilder, ExpenseReconciler, quantize_balances},
};
use rust_decimal::Decimal;

use crate::{
    error::ApplicationError,
    model::{GroupLedger, GroupOverview},
    ports::SettlementOptimizer,
};

/// Entry point for hosts: every operation is a pure function of its inputs
/// and the configured [`SettlementContext`].
#[derive(Clone, Copy)]
pub struct SettlementService<'a> {
    optimizer: &'a dyn SettlementOptimizer,
    context: &'a SettlementContext,
}

impl<'a> SettlementService<'a> {
    pub fn new(optimizer: &'a dyn SettlementOptimizer, context: &'a SettlementContext) -> Self {
        Self { optimizer, context }
    }

    pub fn context(&self) -> &SettlementContext {
        self.context
    }

    /// Balances, settlement transfers and bookkeeping checks for one group.
    pub fn group_overview(
        &self,
        ledger: &GroupLedger,
    ) -> Result<GroupOverview, ApplicationError> {
        let splits: Vec<Split> = ledger
            .splits
            .iter()
            .filter(|split| ledger.owns(split.group_id.as_ref()))
            .cloned()
            .collect();
        let expenses: Vec<Expense> = ledger
            .expenses
            .iter()
            .filter(|expense| ledger.owns(expense.group_id.as_ref()))
            .cloned()
            .collect();

        let LedgerBalances {
            balances,
            mut rejected,
        } = compute_net_balances(&ledger.members, &splits, self.context)?;

        let mut transfers = Vec::new();
        for currency in balances.currencies() {
            let per_currency = balances.for_currency(&currency);
            transfers.extend(self.optimizer.optimize(&currency, &per_currency, self.context)?);
        }

        let paid = ExpenseReconciler.paid_totals(&expenses, self.context)?;
        let findings = ExpenseReconciler.reconcile(&expenses, &splits, self.context);

        let balances = balances.non_zero();
        rejected.extend(paid.rejected);

        tracing::info!(
            group = ?ledger.group_id,
            split_count = splits.len(),
            expense_count = expenses.len(),
            transfer_count = transfers.len(),
            finding_count = findings.len(),
            rejected_count = rejected.len(),
            "Built group overview"
        );

        Ok(GroupOverview {
            balance_lines: balances.to_decimal_lines(self.context),
            transfer_lines: transfers
                .iter()
                .map(|transfer| transfer.to_line(self.context))
                .collect(),
            balances,
            transfers,
            paid: paid.totals,
            findings,
            rejected,
        })
    }

    /// What `viewer` owes and is owed by each counterparty, unsimplified.
    pub fn debt_overview(
        &self,
        viewer: &MemberId,
        splits: &[Split],
    ) -> Result<DebtOverview, ApplicationError> {
        Ok(DebtOverviewBuilder.build(viewer, splits, self.context)?)
    }

    /// Allocates an expense and returns the split that records it. The split
    /// takes its currency, group and expense link from the expense.
    pub fn create_split(
        &self,
        expense: &Expense,
        initiator: &MemberId,
        method: &SplitMethod,
    ) -> Result<Split, ApplicationError> {
        let allocation = SplitAllocator.allocate(
            expense.amount,
            &expense.currency,
            initiator,
            method,
            self.context,
        )?;

        tracing::info!(
            expense = %expense.id,
            initiator = %initiator,
            participant_count = allocation.participants.len(),
            "Created split"
        );

        Ok(allocation.into_split(
            Some(expense.id.clone()),
            expense.group_id.clone(),
            self.context,
        ))
    }

    /// Settles decimal balances a host already holds for one currency.
    /// Slack below one minor unit is repaired before the optimizer runs.
    pub fn settle_balances(
        &self,
        currency: &Currency,
        balances: &[(MemberId, Decimal)],
    ) -> Result<Vec<Transfer>, ApplicationError> {
        let quantized = quantize_balances(currency, balances, self.context)?;
        let transfers = self.optimizer.optimize(currency, &quantized, self.context)?;

        tracing::info!(
            currency = %currency,
            member_count = quantized.len(),
            transfer_count = transfers.len(),
            "Settled decimal balances"
        );

        Ok(transfers)
    }

    pub fn mark_settled(
        &self,
        split: &Split,
        member: &MemberId,
        settled: bool,
    ) -> Result<Split, ApplicationError> {
        Ok(split.with_participant_settled(member, settled)?)
    }
}
