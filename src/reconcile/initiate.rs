use tracing::Instrument;

use crate::error::{Error, Result};
use crate::gateway::{StkPushAck, StkPushRequest};
use crate::observability;
use crate::reconcile::reference::{PaymentPurpose, PaymentReference};
use crate::reconcile::PaymentRelay;
use crate::types::amount::Amount;
use crate::types::phone::Msisdn;

/// A user's request to push a payment to their phone. The phone is still in
/// whatever local form the client sent; validation happens here, before any
/// gateway traffic.
#[derive(Clone, Debug)]
pub struct PaymentIntent {
    pub phone: String,
    pub amount: Amount,
    pub purpose: PaymentPurpose,
    pub entity_id: String,
    pub description: Option<String>,
}

impl PaymentRelay {
    /// Validates the intent, builds the account reference and submits the
    /// push request.
    ///
    /// A returned ack means only that the gateway accepted the request for
    /// asynchronous processing; the business outcome arrives later on the
    /// callback. A synchronous failure here is "initiation failed", which
    /// is a different thing from "payment declined".
    pub async fn initiate(&self, intent: PaymentIntent) -> Result<StkPushAck> {
        let phone = Msisdn::normalize(&intent.phone)?;
        if !intent.amount.is_positive() {
            return Err(Error::NonPositiveAmount(intent.amount));
        }
        // The gateway only takes whole currency units; refuse fractional
        // intents here instead of rounding money on the way out.
        if intent.amount.as_whole_units().is_none() {
            return Err(Error::FractionalAmount(intent.amount));
        }
        let reference = PaymentReference::new(intent.purpose, intent.entity_id)?;

        let description = intent
            .description
            .unwrap_or_else(|| match reference.purpose {
                PaymentPurpose::Contribution => "Group contribution".to_string(),
                PaymentPurpose::LoanRepayment => "Loan repayment".to_string(),
            });

        let encoded = reference.encode();
        let span = observability::tracing::trace_initiation(&encoded);

        let request = StkPushRequest {
            phone,
            amount: intent.amount,
            account_reference: encoded,
            description,
        };
        async {
            let ack = self.gateway.stk_push(&request).await?;
            tracing::info!(
                checkout = %ack.checkout_request_id,
                amount = %intent.amount,
                "push request accepted by gateway"
            );
            Ok(ack)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::gateway::MockPaymentGateway;
    use crate::ledger::memory::InMemoryLedger;

    fn ack() -> StkPushAck {
        StkPushAck {
            merchant_request_id: "mr-1".to_string(),
            checkout_request_id: "co-1".to_string(),
            response_code: "0".to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: None,
        }
    }

    fn relay(gateway: MockPaymentGateway) -> PaymentRelay {
        PaymentRelay::new(Arc::new(InMemoryLedger::new()), Arc::new(gateway))
    }

    #[tokio::test]
    async fn builds_reference_and_normalizes_phone() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_stk_push()
            .withf(|request| {
                request.phone.as_str() == "254712345678"
                    && request.account_reference == "Contribution-m1"
            })
            .times(1)
            .returning(|_| Ok(ack()));

        let outcome = relay(gateway)
            .initiate(PaymentIntent {
                phone: "0712345678".to_string(),
                amount: Amount::from_major(500),
                purpose: PaymentPurpose::Contribution,
                entity_id: "m1".to_string(),
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.checkout_request_id, "co-1");
    }

    #[tokio::test]
    async fn invalid_phone_never_reaches_the_gateway() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_stk_push().times(0);

        let result = relay(gateway)
            .initiate(PaymentIntent {
                phone: "12345".to_string(),
                amount: Amount::from_major(500),
                purpose: PaymentPurpose::Contribution,
                entity_id: "m1".to_string(),
                description: None,
            })
            .await;
        assert!(matches!(result, Err(Error::InvalidPhone(_))));
    }

    #[tokio::test]
    async fn fractional_amount_never_reaches_the_gateway() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_stk_push().times(0);

        let result = relay(gateway)
            .initiate(PaymentIntent {
                phone: "0712345678".to_string(),
                amount: Amount::from_cents(75050),
                purpose: PaymentPurpose::LoanRepayment,
                entity_id: "l1".to_string(),
                description: None,
            })
            .await;
        assert!(matches!(result, Err(Error::FractionalAmount(_))));
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_stk_push().times(0);

        let result = relay(gateway)
            .initiate(PaymentIntent {
                phone: "0712345678".to_string(),
                amount: Amount::zero(),
                purpose: PaymentPurpose::LoanRepayment,
                entity_id: "l1".to_string(),
                description: None,
            })
            .await;
        assert!(matches!(result, Err(Error::NonPositiveAmount(_))));
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_as_initiation_failure() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_stk_push()
            .times(1)
            .returning(|_| Err(Error::GatewayUnavailable("timeout".into())));

        let result = relay(gateway)
            .initiate(PaymentIntent {
                phone: "0712345678".to_string(),
                amount: Amount::from_major(100),
                purpose: PaymentPurpose::LoanRepayment,
                entity_id: "l1".to_string(),
                description: Some("Loan repayment".to_string()),
            })
            .await;
        assert!(matches!(result, Err(Error::GatewayUnavailable(_))));
    }
}
