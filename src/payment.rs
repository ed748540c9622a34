use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Creates payment intents on behalf of the premium checkout.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the client secret of a new intent for `amount` in the smallest
    /// currency unit.
    async fn create_payment_intent(&self, amount: i64) -> Result<String>;

    /// Whether the intent `intent_id` has been paid.
    async fn payment_succeeded(&self, intent_id: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    client_secret: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: Option<String>,
}

pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
    currency: String,
}

impl StripeClient {
    pub fn new(secret_key: String, api_base: String, currency: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            currency,
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_payment_intent(&self, amount: i64) -> Result<String> {
        let amount = amount.to_string();
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", self.currency.as_str()),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await
            .context("Failed to reach the payment provider")?;

        parse_intent(response)
            .await?
            .client_secret
            .context("Payment intent has no client secret")
    }

    async fn payment_succeeded(&self, intent_id: &str) -> Result<bool> {
        let well_formed = !intent_id.is_empty()
            && intent_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !well_formed {
            bail!("Malformed payment intent id {:?}", intent_id);
        }
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .context("Failed to reach the payment provider")?;

        let intent = parse_intent(response).await?;
        Ok(intent.status.as_deref() == Some("succeeded"))
    }
}

async fn parse_intent(response: reqwest::Response) -> Result<PaymentIntent> {
    if !response.status().is_success() {
        let status = response.status();
        let message = response
            .json::<StripeErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| "no error message".to_string());
        bail!("Payment provider answered {}: {}", status, message);
    }
    response
        .json()
        .await
        .context("Failed to parse payment intent")
}

/// Used when no provider key is configured.
pub struct DisabledPayments;

#[async_trait]
impl PaymentProvider for DisabledPayments {
    async fn create_payment_intent(&self, _amount: i64) -> Result<String> {
        bail!("Payments are not configured (STRIPE_SECRET_KEY is unset)")
    }

    async fn payment_succeeded(&self, _intent_id: &str) -> Result<bool> {
        bail!("Payments are not configured (STRIPE_SECRET_KEY is unset)")
    }
}
