use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::amount::Amount;
use crate::types::phone::Msisdn;

pub mod daraja;

/// Fully validated push request: the phone is already normalized and the
/// account reference already encoded by the relay.
#[derive(Clone, Debug)]
pub struct StkPushRequest {
    pub phone: Msisdn,
    pub amount: Amount,
    pub account_reference: String,
    pub description: String,
}

/// Immediate acknowledgement that the gateway accepted the request for
/// asynchronous processing. Says nothing about whether the payer will
/// confirm; that arrives later on the callback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StkPushAck {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAck>;
}
