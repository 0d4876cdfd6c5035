use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::gateway::{PaymentGateway, StkPushAck, StkPushRequest};

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Daraja STK-push client: client-credentials token exchange followed by
/// the push submission. Tokens are short-lived and fetched per push rather
/// than cached.
pub struct DarajaGateway {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl DarajaGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        DarajaGateway { http, config }
    }

    async fn access_token(&self) -> Result<String> {
        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));
        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.base_url
            ))
            .header("Authorization", format!("Basic {credentials}"))
            .send()
            .await
            .map_err(|e| Error::GatewayUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::GatewayUnavailable(format!(
                "token endpoint returned {status}"
            )));
        }
        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::GatewayUnavailable(format!("undecodable token response: {e}")))?;
        Ok(token.access_token)
    }

    /// `base64(shortcode + passkey + timestamp)` per the gateway contract.
    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }
}

#[async_trait]
impl PaymentGateway for DarajaGateway {
    async fn stk_push(&self, request: &StkPushRequest) -> Result<StkPushAck> {
        // The push API takes whole currency units; a fractional amount
        // here is a caller bug, not something to round away.
        let amount = request
            .amount
            .as_whole_units()
            .ok_or(Error::FractionalAmount(request.amount))?;
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();

        let body = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": crate::STK_TRANSACTION_TYPE,
            "Amount": amount,
            "PartyA": request.phone.as_str(),
            "PartyB": self.config.shortcode,
            "PhoneNumber": request.phone.as_str(),
            "CallBackURL": self.config.callback_url,
            "AccountReference": request.account_reference,
            "TransactionDesc": request.description,
        });

        let response = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::GatewayUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::GatewayUnavailable(format!(
                "push endpoint returned {status}"
            )));
        }

        let ack: StkPushAck = response
            .json()
            .await
            .map_err(|e| Error::GatewayUnavailable(format!("undecodable push response: {e}")))?;
        if ack.response_code != "0" {
            return Err(Error::GatewayRejected {
                code: ack.response_code,
                description: ack.response_description,
            });
        }
        Ok(ack)
    }
}
