use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::types::amount::Amount;
use crate::types::ids::{GroupId, LoanId, MemberId};

pub mod memory;
pub mod rest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Declined,
    Repaid,
}

impl LoanStatus {
    /// Pending and approved principal both count against the pool.
    pub fn is_outstanding(self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Declined => "declined",
            LoanStatus::Repaid => "repaid",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Principal,
    Interest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub group_id: GroupId,
}

/// Append-only once written; the relay never updates a contribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contribution {
    pub group_member_id: MemberId,
    pub group_id: GroupId,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: String,
    pub date_contributed: NaiveDate,
    pub gateway_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub group_member_id: MemberId,
    pub group_id: GroupId,
    /// Principal; immutable after creation.
    pub amount: Amount,
    pub purpose: String,
    pub status: LoanStatus,
    pub requested_at: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoanPayment {
    pub loan_id: LoanId,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    pub payment_date: NaiveDate,
    pub gateway_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Guarantee {
    pub loan_id: LoanId,
    pub guarantor_id: MemberId,
    pub amount_guaranteed: Amount,
}

/// Insert payload for a contribution row. `gateway_ref` carries the gateway
/// receipt and is the uniqueness key that turns a redelivered callback into
/// a no-op instead of a double credit.
#[derive(Clone, Debug, Serialize)]
pub struct NewContribution {
    pub group_member_id: MemberId,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: String,
    pub date_contributed: NaiveDate,
    pub gateway_ref: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewLoanPayment {
    pub loan_id: LoanId,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: PaymentKind,
    pub payment_date: NaiveDate,
    pub gateway_ref: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// The row's gateway receipt was already recorded; nothing was written.
    Duplicate,
}

/// Query/command surface of the hosted relational store.
///
/// Reads are plain filters; a read failure must surface as
/// `Error::LedgerUnavailable`, never as an empty result, so callers can
/// distinguish "unknown" from "zero". `payments_for_loans` rejects an empty
/// id set, mirroring the hosted store's in-list behavior.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn contributions_for_member(&self, member: &MemberId) -> Result<Vec<Contribution>>;
    async fn contributions_for_group(&self, group: &GroupId) -> Result<Vec<Contribution>>;
    async fn loans_for_member(&self, member: &MemberId) -> Result<Vec<Loan>>;
    async fn loans_for_group(&self, group: &GroupId) -> Result<Vec<Loan>>;
    async fn loan(&self, id: &LoanId) -> Result<Loan>;
    async fn payments_for_loans(&self, loan_ids: &[LoanId]) -> Result<Vec<LoanPayment>>;
    async fn guarantees_by_member(&self, member: &MemberId) -> Result<Vec<Guarantee>>;
    /// Opaque server-side pool aggregate, reported alongside the locally
    /// computed breakdown for display.
    async fn group_pool(&self, group: &GroupId) -> Result<Amount>;
    async fn insert_contribution(&self, row: NewContribution) -> Result<WriteOutcome>;
    async fn insert_loan_payment(&self, row: NewLoanPayment) -> Result<WriteOutcome>;
    async fn set_loan_status(&self, id: &LoanId, status: LoanStatus) -> Result<()>;
}
