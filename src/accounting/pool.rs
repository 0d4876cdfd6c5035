use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::ledger::{LedgerStore, LoanStatus};
use crate::types::amount::Amount;
use crate::types::ids::{GroupId, LoanId, MemberId};

/// Group-level solvency figures. `pool` is the store's server-side
/// aggregate, reported for display; the locally computed figures are
/// authoritative for approval decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PoolBreakdown {
    pub pool: Amount,
    pub total_contributions: Amount,
    pub total_repayments: Amount,
    pub outstanding_principal: Amount,
}

impl PoolBreakdown {
    /// The amount the group can still lend out.
    pub fn lendable(&self) -> Amount {
        self.total_contributions + self.total_repayments - self.outstanding_principal
    }
}

/// Pure reader over the ledger. Holds no state of its own, so every call
/// reflects the store at the moment of the query; nothing is cached across
/// computations.
pub struct Accountant {
    store: Arc<dyn LedgerStore>,
}

impl Accountant {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Accountant { store }
    }

    /// Contributions minus outstanding (pending + approved) principal.
    /// Negative results are surfaced as-is; a deficit is not the same
    /// thing as breaking even.
    pub async fn available_loanable_amount(&self, member: &MemberId) -> Result<Amount> {
        let contributed: Amount = self
            .store
            .contributions_for_member(member)
            .await?
            .iter()
            .map(|c| c.amount)
            .sum();
        let outstanding: Amount = self
            .store
            .loans_for_member(member)
            .await?
            .iter()
            .filter(|l| l.status.is_outstanding())
            .map(|l| l.amount)
            .sum();
        Ok(contributed - outstanding)
    }

    /// Loanable amount additionally reduced by guarantees the member has
    /// given on loans that are not yet repaid. The guaranteed loan's status
    /// is re-read on every computation; it can change after the guarantee
    /// was recorded.
    pub async fn guarantor_capacity(&self, member: &MemberId) -> Result<Amount> {
        let base = self.available_loanable_amount(member).await?;
        let mut reserved = Amount::zero();
        for guarantee in self.store.guarantees_by_member(member).await? {
            let loan = self.store.loan(&guarantee.loan_id).await?;
            if loan.status != LoanStatus::Repaid {
                reserved = reserved + guarantee.amount_guaranteed;
            }
        }
        Ok(base - reserved)
    }

    pub async fn group_loan_pool_breakdown(&self, group: &GroupId) -> Result<PoolBreakdown> {
        let total_contributions: Amount = self
            .store
            .contributions_for_group(group)
            .await?
            .iter()
            .map(|c| c.amount)
            .sum();

        let loans = self.store.loans_for_group(group).await?;
        let outstanding_principal: Amount = loans
            .iter()
            .filter(|l| l.status.is_outstanding())
            .map(|l| l.amount)
            .sum();

        // A group with no loans has no repayments; querying with an empty
        // in-list would be rejected by the store.
        let total_repayments = if loans.is_empty() {
            Amount::zero()
        } else {
            let ids: Vec<LoanId> = loans.iter().map(|l| l.id.clone()).collect();
            self.store
                .payments_for_loans(&ids)
                .await?
                .iter()
                .map(|p| p.amount)
                .sum()
        };

        let pool = self.store.group_pool(group).await?;

        Ok(PoolBreakdown {
            pool,
            total_contributions,
            total_repayments,
            outstanding_principal,
        })
    }
}
