use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::ledger::{
    Contribution, Guarantee, LedgerStore, Loan, LoanPayment, LoanStatus, Member, NewContribution,
    NewLoanPayment, WriteOutcome,
};
use crate::types::amount::Amount;
use crate::types::ids::{GroupId, LoanId, MemberId};

#[derive(Default)]
struct Tables {
    members: HashMap<MemberId, GroupId>,
    contributions: Vec<Contribution>,
    loans: Vec<Loan>,
    loan_payments: Vec<LoanPayment>,
    guarantees: Vec<Guarantee>,
    receipts: HashSet<String>,
}

/// Vec-backed ledger used by tests and the self-contained dev mode.
/// Mirrors the hosted store's observable behavior: per-row atomic inserts,
/// a uniqueness constraint on the gateway receipt, and rejection of an
/// empty in-list filter.
#[derive(Default)]
pub struct InMemoryLedger {
    tables: RwLock<Tables>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, member: Member) {
        self.tables
            .write()
            .await
            .members
            .insert(member.id, member.group_id);
    }

    pub async fn add_contribution(&self, member: &MemberId, group: &GroupId, amount: Amount) {
        self.tables.write().await.contributions.push(Contribution {
            group_member_id: member.clone(),
            group_id: group.clone(),
            amount,
            kind: crate::DEFAULT_CONTRIBUTION_KIND.to_string(),
            date_contributed: Utc::now().date_naive(),
            gateway_ref: None,
        });
    }

    pub async fn add_loan(&self, loan: Loan) {
        self.tables.write().await.loans.push(loan);
    }

    pub async fn add_guarantee(&self, guarantee: Guarantee) {
        self.tables.write().await.guarantees.push(guarantee);
    }

    pub async fn contribution_count(&self) -> usize {
        self.tables.read().await.contributions.len()
    }

    pub async fn loan_payment_count(&self) -> usize {
        self.tables.read().await.loan_payments.len()
    }

    pub async fn loan_payments(&self) -> Vec<LoanPayment> {
        self.tables.read().await.loan_payments.clone()
    }

    pub async fn contributions(&self) -> Vec<Contribution> {
        self.tables.read().await.contributions.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn contributions_for_member(&self, member: &MemberId) -> Result<Vec<Contribution>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contributions
            .iter()
            .filter(|c| &c.group_member_id == member)
            .cloned()
            .collect())
    }

    async fn contributions_for_group(&self, group: &GroupId) -> Result<Vec<Contribution>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contributions
            .iter()
            .filter(|c| &c.group_id == group)
            .cloned()
            .collect())
    }

    async fn loans_for_member(&self, member: &MemberId) -> Result<Vec<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables
            .loans
            .iter()
            .filter(|l| &l.group_member_id == member)
            .cloned()
            .collect())
    }

    async fn loans_for_group(&self, group: &GroupId) -> Result<Vec<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables
            .loans
            .iter()
            .filter(|l| &l.group_id == group)
            .cloned()
            .collect())
    }

    async fn loan(&self, id: &LoanId) -> Result<Loan> {
        let tables = self.tables.read().await;
        tables
            .loans
            .iter()
            .find(|l| &l.id == id)
            .cloned()
            .ok_or_else(|| Error::LoanNotFound(id.clone()))
    }

    async fn payments_for_loans(&self, loan_ids: &[LoanId]) -> Result<Vec<LoanPayment>> {
        if loan_ids.is_empty() {
            return Err(Error::EmptyFilterSet);
        }
        let tables = self.tables.read().await;
        Ok(tables
            .loan_payments
            .iter()
            .filter(|p| loan_ids.contains(&p.loan_id))
            .cloned()
            .collect())
    }

    async fn guarantees_by_member(&self, member: &MemberId) -> Result<Vec<Guarantee>> {
        let tables = self.tables.read().await;
        Ok(tables
            .guarantees
            .iter()
            .filter(|g| &g.guarantor_id == member)
            .cloned()
            .collect())
    }

    async fn group_pool(&self, group: &GroupId) -> Result<Amount> {
        let tables = self.tables.read().await;
        let contributions: Amount = tables
            .contributions
            .iter()
            .filter(|c| &c.group_id == group)
            .map(|c| c.amount)
            .sum();
        let group_loans: Vec<&Loan> =
            tables.loans.iter().filter(|l| &l.group_id == group).collect();
        let outstanding: Amount = group_loans
            .iter()
            .filter(|l| l.status.is_outstanding())
            .map(|l| l.amount)
            .sum();
        let repayments: Amount = tables
            .loan_payments
            .iter()
            .filter(|p| group_loans.iter().any(|l| l.id == p.loan_id))
            .map(|p| p.amount)
            .sum();
        Ok(contributions + repayments - outstanding)
    }

    async fn insert_contribution(&self, row: NewContribution) -> Result<WriteOutcome> {
        let mut tables = self.tables.write().await;
        // Resolve the member before claiming the receipt, so a rejected
        // insert does not burn the dedup key.
        let group_id = tables
            .members
            .get(&row.group_member_id)
            .cloned()
            .ok_or_else(|| {
                Error::LedgerUnavailable(format!(
                    "insert rejected: unknown group_member {}",
                    row.group_member_id
                ))
            })?;
        if let Some(receipt) = &row.gateway_ref {
            if !tables.receipts.insert(receipt.clone()) {
                return Ok(WriteOutcome::Duplicate);
            }
        }
        tables.contributions.push(Contribution {
            group_member_id: row.group_member_id,
            group_id,
            amount: row.amount,
            kind: row.kind,
            date_contributed: row.date_contributed,
            gateway_ref: row.gateway_ref,
        });
        Ok(WriteOutcome::Inserted)
    }

    async fn insert_loan_payment(&self, row: NewLoanPayment) -> Result<WriteOutcome> {
        let mut tables = self.tables.write().await;
        if let Some(receipt) = &row.gateway_ref {
            if !tables.receipts.insert(receipt.clone()) {
                return Ok(WriteOutcome::Duplicate);
            }
        }
        tables.loan_payments.push(LoanPayment {
            loan_id: row.loan_id,
            amount: row.amount,
            kind: row.kind,
            payment_date: row.payment_date,
            gateway_ref: row.gateway_ref,
        });
        Ok(WriteOutcome::Inserted)
    }

    async fn set_loan_status(&self, id: &LoanId, status: LoanStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let loan = tables
            .loans
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| Error::LoanNotFound(id.clone()))?;
        loan.status = status;
        Ok(())
    }
}
