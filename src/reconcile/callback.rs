use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::ledger::{NewContribution, NewLoanPayment, PaymentKind, WriteOutcome};
use crate::observability;
use crate::reconcile::reference::{PaymentPurpose, PaymentReference};
use crate::reconcile::PaymentRelay;
use crate::types::amount::Amount;
use crate::types::ids::{LoanId, MemberId};

/// Gateway result payload, as POSTed to the callback endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<i64>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    pub metadata: Option<CallbackMetadata>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallback {
    fn metadata_value(&self, name: &str) -> Option<&Value> {
        self.metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    fn amount(&self) -> Option<Amount> {
        match self.metadata_value("Amount")? {
            Value::Number(n) => n.as_f64().map(Amount::from_f64),
            Value::String(s) => s.parse::<f64>().ok().map(Amount::from_f64),
            _ => None,
        }
    }

    fn string_value(&self, name: &str) -> Option<String> {
        match self.metadata_value(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Gateway receipt for the completed transaction; the dedup key.
    fn receipt(&self) -> Option<String> {
        self.string_value("MpesaReceiptNumber")
    }

    fn account_reference(&self) -> Option<String> {
        self.string_value("AccountReference")
    }
}

/// Terminal state of one callback invocation:
/// received → validated → (rejected | dispatched) → (write-failed | recorded).
/// Rejection and write failure surface as errors; these are the Ok ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Non-zero or absent result code. A normal negative outcome, not an
    /// error; nothing is written and the gateway gets its acknowledgement.
    Declined { result_code: Option<i64> },
    /// The receipt was already recorded; redelivery of a result the
    /// gateway already reported. Nothing written.
    AlreadyRecorded { receipt: String },
    Recorded {
        purpose: PaymentPurpose,
        entity_id: String,
        amount: Amount,
    },
}

impl CallbackOutcome {
    pub fn describe(&self) -> String {
        match self {
            CallbackOutcome::Declined { result_code: Some(code) } => {
                format!("declined (result code {code}); nothing recorded")
            }
            CallbackOutcome::Declined { result_code: None } => {
                "ignored: no result code; nothing recorded".to_string()
            }
            CallbackOutcome::AlreadyRecorded { receipt } => {
                format!("receipt {receipt} already recorded; nothing written")
            }
            CallbackOutcome::Recorded {
                purpose,
                entity_id,
                amount,
            } => format!("recorded {} of {amount} for {entity_id}", purpose.as_str()),
        }
    }
}

impl PaymentRelay {
    /// Converts a gateway result callback into at most one ledger write.
    ///
    /// Declines are acknowledged without error so the gateway never sees a
    /// failure for a normal negative outcome. Malformed callbacks (missing
    /// reference, entity id or amount, unknown purpose) are rejected without
    /// writing and logged with the full payload: the gateway treats the
    /// result as terminal and will not resend it, so those need manual
    /// follow-up. A failed write after a confirmed payment is the serious
    /// case; it is logged at error level and surfaced to the caller.
    pub async fn handle_callback(&self, envelope: &CallbackEnvelope) -> Result<CallbackOutcome> {
        let callback = &envelope.body.stk_callback;
        let span = observability::tracing::trace_callback(
            callback.checkout_request_id.as_deref().unwrap_or("unknown"),
        );
        // Instrument rather than enter: a held span guard would mislabel
        // events from interleaved tasks while the ledger write is pending.
        self.apply_callback(envelope, callback).instrument(span).await
    }

    async fn apply_callback(
        &self,
        envelope: &CallbackEnvelope,
        callback: &StkCallback,
    ) -> Result<CallbackOutcome> {
        match callback.result_code {
            Some(0) => {}
            result_code => {
                tracing::info!(
                    ?result_code,
                    desc = callback.result_desc.as_deref().unwrap_or(""),
                    "payment not completed; nothing recorded"
                );
                return Ok(CallbackOutcome::Declined { result_code });
            }
        }

        let reference = match callback.account_reference() {
            Some(raw) => PaymentReference::decode(&raw).map_err(|e| {
                tracing::error!(payload = ?envelope, error = %e, "malformed callback reference; manual follow-up required");
                e
            })?,
            None => {
                tracing::error!(payload = ?envelope, "success callback without account reference; manual follow-up required");
                return Err(Error::MissingField("AccountReference"));
            }
        };
        let amount = match callback.amount() {
            Some(amount) => amount,
            None => {
                tracing::error!(payload = ?envelope, "success callback without amount metadata; manual follow-up required");
                return Err(Error::MissingField("Amount"));
            }
        };
        let receipt = callback.receipt();

        let today = Utc::now().date_naive();
        let write = match reference.purpose {
            PaymentPurpose::LoanRepayment => {
                self.store
                    .insert_loan_payment(NewLoanPayment {
                        loan_id: LoanId::new(reference.entity_id.clone()),
                        amount,
                        kind: PaymentKind::Principal,
                        payment_date: today,
                        gateway_ref: receipt.clone(),
                    })
                    .await
            }
            PaymentPurpose::Contribution => {
                self.store
                    .insert_contribution(NewContribution {
                        group_member_id: MemberId::new(reference.entity_id.clone()),
                        amount,
                        kind: crate::DEFAULT_CONTRIBUTION_KIND.to_string(),
                        date_contributed: today,
                        gateway_ref: receipt.clone(),
                    })
                    .await
            }
        };

        match write {
            Ok(WriteOutcome::Inserted) => {
                tracing::info!(
                    reference = %reference,
                    amount = %amount,
                    receipt = receipt.as_deref().unwrap_or(""),
                    "payment recorded"
                );
                Ok(CallbackOutcome::Recorded {
                    purpose: reference.purpose,
                    entity_id: reference.entity_id,
                    amount,
                })
            }
            Ok(WriteOutcome::Duplicate) => {
                let receipt = receipt.unwrap_or_default();
                tracing::warn!(reference = %reference, receipt = %receipt, "duplicate delivery; nothing written");
                Ok(CallbackOutcome::AlreadyRecorded { receipt })
            }
            Err(err) => {
                // Money moved in the real world but the ledger disagrees.
                tracing::error!(
                    reference = %reference,
                    amount = %amount,
                    payload = ?envelope,
                    error = %err,
                    "reconciliation failure: payment confirmed but ledger write failed"
                );
                Err(Error::ReconciliationFailed {
                    reference: reference.to_string(),
                    detail: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::Error;
    use crate::gateway::MockPaymentGateway;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::Member;
    use crate::types::ids::GroupId;

    fn envelope(result_code: Option<i64>, items: Vec<(&str, Value)>) -> CallbackEnvelope {
        CallbackEnvelope {
            body: CallbackBody {
                stk_callback: StkCallback {
                    merchant_request_id: Some("mr-1".to_string()),
                    checkout_request_id: Some("co-1".to_string()),
                    result_code,
                    result_desc: None,
                    metadata: Some(CallbackMetadata {
                        items: items
                            .into_iter()
                            .map(|(name, value)| MetadataItem {
                                name: name.to_string(),
                                value: Some(value),
                            })
                            .collect(),
                    }),
                },
            },
        }
    }

    fn success_envelope(reference: &str, amount: f64, receipt: &str) -> CallbackEnvelope {
        envelope(
            Some(0),
            vec![
                ("Amount", Value::from(amount)),
                ("MpesaReceiptNumber", Value::from(receipt)),
                ("PhoneNumber", Value::from(254712345678u64)),
                ("AccountReference", Value::from(reference)),
            ],
        )
    }

    async fn relay_with_store() -> (PaymentRelay, Arc<InMemoryLedger>) {
        let store = Arc::new(InMemoryLedger::new());
        store
            .add_member(Member {
                id: MemberId::new("m1"),
                group_id: GroupId::new("g1"),
            })
            .await;
        let relay = PaymentRelay::new(store.clone(), Arc::new(MockPaymentGateway::new()));
        (relay, store)
    }

    #[tokio::test]
    async fn success_repayment_writes_exactly_one_principal_row() {
        let (relay, store) = relay_with_store().await;
        let outcome = relay
            .handle_callback(&success_envelope("LoanRepayment-42", 500.0, "QK12XYZ"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CallbackOutcome::Recorded {
                purpose: PaymentPurpose::LoanRepayment,
                entity_id: "42".to_string(),
                amount: Amount::from_major(500),
            }
        );
        let payments = store.loan_payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].loan_id, LoanId::new("42"));
        assert_eq!(payments[0].amount, Amount::from_major(500));
        assert_eq!(payments[0].kind, PaymentKind::Principal);
        assert_eq!(payments[0].gateway_ref.as_deref(), Some("QK12XYZ"));
        assert_eq!(store.contribution_count().await, 0);
    }

    #[tokio::test]
    async fn success_contribution_writes_monthly_row_for_member() {
        let (relay, store) = relay_with_store().await;
        relay
            .handle_callback(&success_envelope("Contribution-m1", 1200.0, "QK13AAA"))
            .await
            .unwrap();

        let contributions = store.contributions().await;
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].group_member_id, MemberId::new("m1"));
        assert_eq!(contributions[0].amount, Amount::from_major(1200));
        assert_eq!(contributions[0].kind, crate::DEFAULT_CONTRIBUTION_KIND);
    }

    #[tokio::test]
    async fn recorded_payment_shows_up_in_next_balance_read() {
        let (relay, store) = relay_with_store().await;
        relay
            .handle_callback(&success_envelope("Contribution-m1", 1000.0, "QK14BBB"))
            .await
            .unwrap();

        let accountant = crate::accounting::Accountant::new(store);
        let available = accountant
            .available_loanable_amount(&MemberId::new("m1"))
            .await
            .unwrap();
        assert_eq!(available, Amount::from_major(1000));
    }

    #[tokio::test]
    async fn declined_callback_is_a_no_op() {
        let (relay, store) = relay_with_store().await;
        let outcome = relay
            .handle_callback(&envelope(Some(1032), vec![]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CallbackOutcome::Declined {
                result_code: Some(1032)
            }
        );
        assert_eq!(store.contribution_count().await, 0);
        assert_eq!(store.loan_payment_count().await, 0);
    }

    #[tokio::test]
    async fn absent_result_code_is_treated_as_not_completed() {
        let (relay, store) = relay_with_store().await;
        let outcome = relay.handle_callback(&envelope(None, vec![])).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Declined { result_code: None });
        assert_eq!(store.loan_payment_count().await, 0);
    }

    #[tokio::test]
    async fn reference_without_entity_id_is_rejected_and_writes_nothing() {
        let (relay, store) = relay_with_store().await;
        let result = relay
            .handle_callback(&success_envelope("Contribution", 800.0, "QK15CCC"))
            .await;

        assert!(matches!(result, Err(Error::MalformedReference(_))));
        assert_eq!(store.contribution_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_purpose_is_rejected_not_credited_as_contribution() {
        let (relay, store) = relay_with_store().await;
        let result = relay
            .handle_callback(&success_envelope("Fee-m1", 800.0, "QK16DDD"))
            .await;

        assert!(matches!(result, Err(Error::UnknownPurpose(_))));
        assert_eq!(store.contribution_count().await, 0);
    }

    #[tokio::test]
    async fn missing_amount_metadata_is_rejected() {
        let (relay, store) = relay_with_store().await;
        let result = relay
            .handle_callback(&envelope(
                Some(0),
                vec![("AccountReference", Value::from("Contribution-m1"))],
            ))
            .await;

        assert!(matches!(result, Err(Error::MissingField("Amount"))));
        assert_eq!(store.contribution_count().await, 0);
    }

    #[tokio::test]
    async fn redelivered_receipt_is_a_no_op_not_a_double_credit() {
        let (relay, store) = relay_with_store().await;
        let payload = success_envelope("Contribution-m1", 1000.0, "QK17EEE");

        relay.handle_callback(&payload).await.unwrap();
        let outcome = relay.handle_callback(&payload).await.unwrap();

        assert_eq!(
            outcome,
            CallbackOutcome::AlreadyRecorded {
                receipt: "QK17EEE".to_string()
            }
        );
        assert_eq!(store.contribution_count().await, 1);
    }

    #[tokio::test]
    async fn write_failure_after_confirmed_payment_is_reconciliation_failure() {
        let (relay, _store) = relay_with_store().await;
        // Unknown member makes the store reject the insert, standing in for
        // any write failure after the payment already went through.
        let result = relay
            .handle_callback(&success_envelope("Contribution-ghost", 1000.0, "QK18FFF"))
            .await;

        match result {
            Err(Error::ReconciliationFailed { reference, .. }) => {
                assert_eq!(reference, "Contribution-ghost");
            }
            other => panic!("expected ReconciliationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn amount_may_arrive_as_a_string() {
        let (relay, store) = relay_with_store().await;
        relay
            .handle_callback(&envelope(
                Some(0),
                vec![
                    ("Amount", Value::from("750.50")),
                    ("AccountReference", Value::from("Contribution-m1")),
                    ("MpesaReceiptNumber", Value::from("QK19GGG")),
                ],
            ))
            .await
            .unwrap();

        let contributions = store.contributions().await;
        assert_eq!(contributions[0].amount, Amount::from_cents(75050));
    }
}
