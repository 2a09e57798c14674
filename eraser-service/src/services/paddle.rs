//! Paddle billing provider client.
//!
//! Customer and transaction management through the Paddle API, plus webhook
//! signature verification and event parsing for the billing ledger.

use crate::config::{PaddleConfig, PaddleEnvironment};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::verify_payload;

#[derive(Clone)]
pub struct PaddleClient {
    http: reqwest::Client,
    config: PaddleConfig,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

/// Paddle customer record.
#[derive(Debug, Clone, Deserialize)]
pub struct PaddleCustomer {
    pub id: String,
    pub email: String,
}

/// A freshly opened checkout transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutTransaction {
    pub id: String,
    pub status: String,
    pub checkout: Option<PaddleCheckout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaddleCheckout {
    pub url: Option<String>,
}

/// Webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct PaddleWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub data: PaddleTransactionData,
}

#[derive(Debug, Deserialize)]
pub struct PaddleTransactionData {
    pub id: String,
    pub status: String,
    pub customer_id: Option<String>,
    pub currency_code: String,
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
    #[serde(default)]
    pub items: Vec<PaddleItem>,
    #[serde(default)]
    pub details: Option<PaddleDetails>,
    #[serde(default)]
    pub payments: Vec<PaddlePayment>,
    #[serde(default)]
    pub checkout: Option<PaddleCheckout>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PaddleItem {
    pub price: PaddlePrice,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PaddlePrice {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub unit_price: PaddleMoney,
    #[serde(default)]
    pub custom_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PaddleMoney {
    /// Smallest currency unit, as a decimal string.
    pub amount: String,
    pub currency_code: String,
}

#[derive(Debug, Deserialize)]
pub struct PaddleDetails {
    #[serde(default)]
    pub totals: Option<PaddleTotals>,
}

#[derive(Debug, Deserialize)]
pub struct PaddleTotals {
    pub subtotal: String,
    pub tax: String,
    pub total: String,
}

#[derive(Debug, Deserialize)]
pub struct PaddlePayment {
    #[serde(default)]
    pub method_details: Option<PaddleMethodDetails>,
}

#[derive(Debug, Deserialize)]
pub struct PaddleMethodDetails {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Extract an integer credits value from price custom data; both the
/// `credits` and legacy `credit` keys are honored. Absent or malformed
/// values count as 0.
pub fn credits_from_custom_data(custom_data: &Option<serde_json::Value>) -> i64 {
    let value = custom_data
        .as_ref()
        .and_then(|v| v.get("credits").or_else(|| v.get("credit")));
    match value {
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

/// Parse a decimal-string money amount; malformed values count as 0.
pub fn parse_amount(amount: &str) -> i64 {
    amount.parse().unwrap_or(0)
}

impl PaddleClient {
    pub fn new(config: PaddleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn api_base(&self) -> &'static str {
        match self.config.environment {
            PaddleEnvironment::Sandbox => "https://sandbox-api.paddle.com",
            PaddleEnvironment::Production => "https://api.paddle.com",
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.expose_secret().is_empty()
    }

    /// The `platform` custom-data tag this product filters webhook events
    /// on. The endpoint is shared across products; events tagged for a
    /// different platform are acknowledged but ignored.
    pub fn platform_matches(&self, custom_data: &Option<serde_json::Value>) -> bool {
        match custom_data
            .as_ref()
            .and_then(|v| v.get("platform"))
            .and_then(|v| v.as_str())
        {
            Some(tag) => tag == self.config.platform_tag,
            None => true,
        }
    }

    /// Look up a customer by email, creating one when none exists.
    pub async fn find_or_create_customer(
        &self,
        email: &str,
        name: &str,
    ) -> Result<PaddleCustomer> {
        if !self.is_configured() {
            return Err(anyhow!("Paddle credentials not configured"));
        }

        let url = format!("{}/customers", self.api_base());
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .query(&[("email", email)])
            .send()
            .await?;

        if response.status().is_success() {
            let envelope: ApiEnvelope<Vec<PaddleCustomer>> = response.json().await?;
            if let Some(customer) = envelope.data.into_iter().next() {
                tracing::debug!(customer_id = %customer.id, "Reusing existing Paddle customer");
                return Ok(customer);
            }
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&serde_json::json!({ "email": email, "name": name }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Paddle customer creation failed");
            return Err(anyhow!("Paddle customer creation failed: {}", status));
        }

        let envelope: ApiEnvelope<PaddleCustomer> = serde_json::from_str(&body)?;
        tracing::info!(customer_id = %envelope.data.id, "Paddle customer created");
        Ok(envelope.data)
    }

    /// Open a checkout transaction for one price.
    pub async fn create_transaction(
        &self,
        customer_id: &str,
        price_id: &str,
    ) -> Result<CheckoutTransaction> {
        if !self.is_configured() {
            return Err(anyhow!("Paddle credentials not configured"));
        }

        let url = format!("{}/transactions", self.api_base());
        let payload = serde_json::json!({
            "customer_id": customer_id,
            "items": [{ "price_id": price_id, "quantity": 1 }],
            "custom_data": { "platform": self.config.platform_tag },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Paddle transaction creation failed");
            return Err(anyhow!("Paddle transaction creation failed: {}", status));
        }

        let envelope: ApiEnvelope<CheckoutTransaction> = serde_json::from_str(&body)?;
        tracing::info!(
            transaction_id = %envelope.data.id,
            "Paddle transaction created"
        );
        Ok(envelope.data)
    }

    /// Verify a `Paddle-Signature` header (`ts=...;h1=...`) against the raw
    /// request body: HMAC-SHA256 over `"{ts}:{body}"` with the webhook
    /// secret, compared in constant time.
    pub fn verify_webhook_signature(&self, signature_header: &str, body: &str) -> Result<bool> {
        let mut ts = None;
        let mut h1 = None;
        for part in signature_header.split(';') {
            match part.split_once('=') {
                Some(("ts", value)) => ts = Some(value),
                Some(("h1", value)) => h1 = Some(value),
                _ => {}
            }
        }

        let (ts, h1) = match (ts, h1) {
            (Some(ts), Some(h1)) => (ts, h1),
            _ => return Ok(false),
        };

        let payload = format!("{}:{}", ts, body);
        verify_payload(self.config.webhook_secret.expose_secret(), &payload, h1)
    }

    pub fn parse_webhook_event(&self, body: &str) -> Result<PaddleWebhookEvent> {
        let event: PaddleWebhookEvent = serde_json::from_str(body)?;
        Ok(event)
    }
}
