//! Payment gateway clients.
//!
//! [`PaymentGateway`] is the seam: the settlement coordinator only ever
//! talks to the trait. [`HttpGateway`] speaks to the real provider,
//! [`DemoGateway`] settles through explicit staff confirmation when the
//! provider is unreachable. Which path a payment took is carried by
//! [`IntentMode`] on the intent itself, never inferred from the shape of
//! the reference string.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{AppError, AppResult};
use std::time::Duration;

/// How an intent settles: through the provider, or through on-site staff
/// confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentMode {
    Live,
    Demo,
}

/// Payment status as reported by a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Pending,
    Failed,
    Expired,
    Unknown,
}

/// What the kiosk needs to start collecting a payment.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub merchant_order_id: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub expiry_minutes: i64,
}

/// A created payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Gateway-issued reference, the key for all later status calls.
    pub reference: String,
    pub mode: IntentMode,
    pub payment_url: Option<String>,
    pub qr_payload: Option<String>,
    pub amount: Decimal,
    pub payment_method: String,
    pub expires_at: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent>;
    async fn check_status(&self, reference: &str) -> AppResult<GatewayStatus>;
    /// Tell the gateway the funds were applied. Advisory; failures are the
    /// caller's to tolerate.
    async fn complete(&self, reference: &str) -> AppResult<()>;
}

/// HTTP client for the hosted payment provider.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    merchant_code: String,
    intent_timeout: Duration,
    poll_timeout: Duration,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        merchant_code: impl Into<String>,
        intent_timeout_ms: u64,
        poll_timeout_ms: u64,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            merchant_code: merchant_code.into(),
            intent_timeout: Duration::from_millis(intent_timeout_ms),
            poll_timeout: Duration::from_millis(poll_timeout_ms),
        })
    }

    fn unreachable(e: reqwest::Error) -> AppError {
        AppError::gateway(format!("Payment gateway request failed: {e}"))
    }
}

#[derive(Deserialize)]
struct IntentResponse {
    reference: String,
    #[serde(rename = "paymentUrl")]
    payment_url: Option<String>,
    #[serde(rename = "qrString")]
    qr_payload: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "statusCode")]
    status_code: String,
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent> {
        let body = json!({
            "merchantCode": self.merchant_code,
            "merchantOrderId": request.merchant_order_id,
            "paymentAmount": request.amount,
            "paymentMethod": request.payment_method,
            "productDetails": "Locker rental",
            "customerVaName": request.customer_name,
            "email": request.customer_email,
            "phoneNumber": request.customer_phone,
            "expiryPeriod": request.expiry_minutes,
        });

        let response = self
            .client
            .post(format!("{}/transactions", self.base_url))
            .timeout(self.intent_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::gateway(format!(
                "Payment gateway rejected intent: {status}"
            )));
        }

        let parsed: IntentResponse = response
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Unreadable gateway response: {e}")))?;

        let expires_at = (Utc::now() + ChronoDuration::minutes(request.expiry_minutes))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        Ok(PaymentIntent {
            reference: parsed.reference,
            mode: IntentMode::Live,
            payment_url: parsed.payment_url,
            qr_payload: parsed.qr_payload,
            amount: request.amount,
            payment_method: request.payment_method.clone(),
            expires_at,
        })
    }

    async fn check_status(&self, reference: &str) -> AppResult<GatewayStatus> {
        let body = json!({
            "merchantCode": self.merchant_code,
            "reference": reference,
        });
        let response = self
            .client
            .post(format!("{}/transactions/status", self.base_url))
            .timeout(self.poll_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::unreachable)?;

        if !response.status().is_success() {
            return Ok(GatewayStatus::Unknown);
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Unreadable status response: {e}")))?;

        Ok(match parsed.status_code.as_str() {
            "00" => GatewayStatus::Success,
            "01" => GatewayStatus::Pending,
            "02" => GatewayStatus::Failed,
            "03" => GatewayStatus::Expired,
            _ => GatewayStatus::Unknown,
        })
    }

    async fn complete(&self, reference: &str) -> AppResult<()> {
        let body = json!({ "reference": reference });
        let response = self
            .client
            .post(format!("{}/payments/complete", self.base_url))
            .timeout(self.poll_timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::unreachable)?;

        if !response.status().is_success() {
            return Err(AppError::gateway(format!(
                "Payment completion rejected: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Offline fallback gateway.
///
/// Issues intents locally and settles only when on-site staff explicitly
/// confirm cash was taken ([`DemoGateway::confirm`]). Never auto-succeeds.
/// The `DEMO-` reference prefix exists purely so humans can tell these
/// receipts apart; code must use [`IntentMode::Demo`] instead.
#[derive(Default)]
pub struct DemoGateway {
    /// reference -> (confirmed, expires_at)
    intents: DashMap<String, (bool, String)>,
}

impl DemoGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Staff confirmation that payment was collected by hand.
    pub fn confirm(&self, reference: &str) -> AppResult<()> {
        let mut entry = self
            .intents
            .get_mut(reference)
            .ok_or_else(|| AppError::not_found(format!("Demo intent {reference}")))?;
        entry.0 = true;
        tracing::info!(reference, "Demo payment confirmed by staff");
        Ok(())
    }

    fn is_past(expires_at: &str) -> bool {
        DateTime::parse_from_rfc3339(expires_at)
            .map(|t| t.with_timezone(&Utc) < Utc::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl PaymentGateway for DemoGateway {
    async fn create_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent> {
        let reference = format!("DEMO-{}", request.merchant_order_id);
        let expires_at = (Utc::now() + ChronoDuration::minutes(request.expiry_minutes))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.intents
            .insert(reference.clone(), (false, expires_at.clone()));
        tracing::warn!(reference, "Issued demo payment intent (gateway offline)");
        Ok(PaymentIntent {
            reference,
            mode: IntentMode::Demo,
            payment_url: None,
            qr_payload: None,
            amount: request.amount,
            payment_method: request.payment_method.clone(),
            expires_at,
        })
    }

    async fn check_status(&self, reference: &str) -> AppResult<GatewayStatus> {
        let Some(entry) = self.intents.get(reference) else {
            return Ok(GatewayStatus::Unknown);
        };
        let (confirmed, expires_at) = entry.value();
        if *confirmed {
            Ok(GatewayStatus::Success)
        } else if Self::is_past(expires_at) {
            Ok(GatewayStatus::Expired)
        } else {
            Ok(GatewayStatus::Pending)
        }
    }

    async fn complete(&self, _reference: &str) -> AppResult<()> {
        Ok(())
    }
}
