use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LedgerConfig;
use crate::error::{Error, Result};
use crate::ledger::{
    Contribution, Guarantee, LedgerStore, Loan, LoanPayment, LoanStatus, NewContribution,
    NewLoanPayment, WriteOutcome,
};
use crate::types::amount::Amount;
use crate::types::ids::{GroupId, LoanId, MemberId};

/// PostgREST-style client for the hosted ledger store.
///
/// Every request authenticates with the service credential. Transport and
/// non-2xx failures map to `Error::LedgerUnavailable`; a unique-violation
/// conflict on insert maps to `WriteOutcome::Duplicate`.
pub struct RestLedger {
    http: reqwest::Client,
    base: String,
    service_key: String,
}

impl RestLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        RestLedger {
            http,
            base: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base, path)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::LedgerUnavailable(format!(
                "store returned {status} for {path}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("undecodable store payload: {e}")))
    }

    async fn insert<T: Serialize>(&self, table: &str, row: &T) -> Result<WriteOutcome> {
        let response = self
            .http
            .post(self.url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(WriteOutcome::Inserted),
            StatusCode::CONFLICT => Ok(WriteOutcome::Duplicate),
            status => Err(Error::LedgerUnavailable(format!(
                "insert into {table} returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl LedgerStore for RestLedger {
    async fn contributions_for_member(&self, member: &MemberId) -> Result<Vec<Contribution>> {
        self.fetch(&format!("contributions?group_member_id=eq.{member}&select=*"))
            .await
    }

    async fn contributions_for_group(&self, group: &GroupId) -> Result<Vec<Contribution>> {
        self.fetch(&format!("contributions?group_id=eq.{group}&select=*"))
            .await
    }

    async fn loans_for_member(&self, member: &MemberId) -> Result<Vec<Loan>> {
        self.fetch(&format!("loans?group_member_id=eq.{member}&select=*"))
            .await
    }

    async fn loans_for_group(&self, group: &GroupId) -> Result<Vec<Loan>> {
        self.fetch(&format!("loans?group_id=eq.{group}&select=*")).await
    }

    async fn loan(&self, id: &LoanId) -> Result<Loan> {
        let rows: Vec<Loan> = self.fetch(&format!("loans?id=eq.{id}&select=*")).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::LoanNotFound(id.clone()))
    }

    async fn payments_for_loans(&self, loan_ids: &[LoanId]) -> Result<Vec<LoanPayment>> {
        // The store mis-handles `in.()`; callers must short-circuit instead.
        if loan_ids.is_empty() {
            return Err(Error::EmptyFilterSet);
        }
        let ids = loan_ids
            .iter()
            .map(LoanId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.fetch(&format!("loan_payments?loan_id=in.({ids})&select=*"))
            .await
    }

    async fn guarantees_by_member(&self, member: &MemberId) -> Result<Vec<Guarantee>> {
        self.fetch(&format!("loan_guarantors?guarantor_id=eq.{member}&select=*"))
            .await
    }

    async fn group_pool(&self, group: &GroupId) -> Result<Amount> {
        let response = self
            .http
            .post(self.url("rpc/group_loan_pool"))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "gid": group.as_str() }))
            .send()
            .await
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::LedgerUnavailable(format!(
                "pool aggregate returned {status}"
            )));
        }
        let value: f64 = response
            .json()
            .await
            .map_err(|e| Error::LedgerUnavailable(format!("undecodable pool aggregate: {e}")))?;
        Ok(Amount::from_f64(value))
    }

    async fn insert_contribution(&self, row: NewContribution) -> Result<WriteOutcome> {
        self.insert("contributions", &row).await
    }

    async fn insert_loan_payment(&self, row: NewLoanPayment) -> Result<WriteOutcome> {
        self.insert("loan_payments", &row).await
    }

    async fn set_loan_status(&self, id: &LoanId, status: LoanStatus) -> Result<()> {
        let response = self
            .http
            .patch(self.url(&format!("loans?id=eq.{id}")))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "status": status.as_str() }))
            .send()
            .await
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;
        let status_code = response.status();
        if !status_code.is_success() {
            return Err(Error::LedgerUnavailable(format!(
                "status update returned {status_code}"
            )));
        }
        Ok(())
    }
}
