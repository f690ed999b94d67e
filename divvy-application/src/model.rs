use divvy_domain::{
    BalanceLine, Expense, GroupId, MemberId, NetBalances, Split, Transfer, TransferLine,
    ValidationError,
    services::{Finding, PaidTotal},
};
use serde::{Deserialize, Serialize};

/// Everything recorded for one group, as loaded by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLedger {
    /// Records tagged with a different group are ignored. Untagged records
    /// always belong to the ledger.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub members: Vec<MemberId>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub splits: Vec<Split>,
}

impl GroupLedger {
    pub fn owns(&self, group_id: Option<&GroupId>) -> bool {
        match (&self.group_id, group_id) {
            (Some(own), Some(tagged)) => own == tagged,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOverview {
    /// Non-zero balances in minor units.
    pub balances: NetBalances,
    pub balance_lines: Vec<BalanceLine>,
    pub transfers: Vec<Transfer>,
    pub transfer_lines: Vec<TransferLine>,
    pub paid: Vec<PaidTotal>,
    pub findings: Vec<Finding>,
    /// Records skipped under the skip-invalid ingest policy.
    pub rejected: Vec<ValidationError>,
}

impl GroupOverview {
    pub fn is_settled(&self) -> bool {
        self.transfers.is_empty()
    }
}
