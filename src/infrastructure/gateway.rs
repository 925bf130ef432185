//! REST client for a Paystack-style fiat payment gateway.
//!
//! All amounts cross the wire in kobo. Responses use the gateway's
//! `{status, message, data}` envelope; `status: false` is surfaced as
//! [`PlatformError::Gateway`].

use crate::domain::money::{Amount, KOBO_PER_NAIRA};
use crate::domain::ports::{
    CheckoutRequest, CheckoutSession, GatewayPaymentStatus, PaymentGateway, PaymentVerification,
    RefundReceipt, TransferReceipt, TransferRequest,
};
use crate::error::{PlatformError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    reference: String,
    status: String,
    amount: i64,
    paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RefundData {
    status: String,
}

pub struct PaystackGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl PaystackGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("proptoken/0.1")
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let http_status = response.status();
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            PlatformError::Gateway(format!("Unreadable response ({}): {}", http_status, e))
        })?;
        if !envelope.status {
            return Err(PlatformError::Gateway(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| PlatformError::Gateway(format!("Empty response: {}", envelope.message)))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .http_client
            .post(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await?;
        Self::unwrap_envelope(response).await
    }
}

fn payment_status(raw: &str) -> GatewayPaymentStatus {
    match raw {
        "success" => GatewayPaymentStatus::Success,
        "failed" | "reversed" => GatewayPaymentStatus::Failed,
        "abandoned" => GatewayPaymentStatus::Abandoned,
        _ => GatewayPaymentStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        debug!(reference = %request.reference, amount = %request.amount, "initializing checkout");
        let kobo = request.amount.to_kobo()?;
        self.post(
            "/transaction/initialize",
            json!({
                "email": request.email,
                "amount": kobo,
                "reference": request.reference,
                "callback_url": request.callback_url,
                "metadata": request.metadata,
            }),
        )
        .await
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification> {
        let response = self
            .http_client
            .get(self.url(&format!("/transaction/verify/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        let data: VerifyData = Self::unwrap_envelope(response).await?;
        Ok(PaymentVerification {
            reference: data.reference,
            status: payment_status(&data.status),
            amount: Decimal::from(data.amount) / KOBO_PER_NAIRA,
            paid_at: data.paid_at,
        })
    }

    async fn refund(&self, reference: &str, amount: Amount) -> Result<RefundReceipt> {
        let kobo = amount.to_kobo()?;
        let data: RefundData = self
            .post("/refund", json!({ "transaction": reference, "amount": kobo }))
            .await?;
        Ok(RefundReceipt {
            reference: reference.to_string(),
            status: data.status,
        })
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let kobo = request.amount.to_kobo()?;
        self.post(
            "/transfer",
            json!({
                "source": "balance",
                "amount": kobo,
                "recipient": request.recipient_code,
                "reference": request.reference,
                "reason": request.reason,
            }),
        )
        .await
    }
}
