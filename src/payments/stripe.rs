use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{
    BillingCustomer, CheckoutSession, CheckoutSessionRequest, PaymentProcessor,
    PaymentProcessorError, SessionLineItem,
};
use crate::config::AppConfig;

/// Stripe configuration
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// API origin without the `/v1` suffix
    pub api_base: String,
    pub timeout: Duration,
}

impl StripeConfig {
    /// `None` when no secret key is configured.
    pub fn from_app_config(cfg: &AppConfig) -> Option<Self> {
        let secret_key = cfg
            .stripe_secret_key
            .as_ref()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())?;

        Some(Self {
            secret_key: secret_key.to_string(),
            api_base: cfg.stripe_api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.payment_timeout_secs),
        })
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe REST client for hosted checkout
#[derive(Clone, Debug)]
pub struct StripeClient {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentProcessorError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base, path)
    }

    async fn read_response<T: DeserializeOwned>(
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T, PaymentProcessorError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PaymentProcessorError::NotFound(resource.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Stripe API error: {}", message);
            return Err(PaymentProcessorError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentProcessorError::Decode(e.to_string()))
    }
}

/// Stripe object ids are `prefix_` plus alphanumerics; anything else never reaches the URL path.
fn is_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Form parameters for `POST /v1/checkout/sessions`, in Stripe's bracket notation.
pub fn checkout_session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("payment_method_types[]".to_string(), "card".to_string()),
    ];

    for (index, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", index);
        match item {
            SessionLineItem::Priced {
                name,
                currency,
                unit_amount,
                quantity,
            } => {
                params.push((format!("{}[price_data][currency]", prefix), currency.clone()));
                params.push((
                    format!("{}[price_data][product_data][name]", prefix),
                    name.clone(),
                ));
                params.push((
                    format!("{}[price_data][unit_amount]", prefix),
                    unit_amount.to_string(),
                ));
                params.push((format!("{}[quantity]", prefix), quantity.to_string()));
            }
            SessionLineItem::Price { price_id, quantity } => {
                params.push((format!("{}[price]", prefix), price_id.clone()));
                params.push((format!("{}[quantity]", prefix), quantity.to_string()));
            }
        }
    }

    if let Some(customer) = &request.customer {
        params.push(("customer".to_string(), customer.clone()));
    }
    params.push(("success_url".to_string(), request.success_url.clone()));
    params.push(("cancel_url".to_string(), request.cancel_url.clone()));

    let metadata: BTreeMap<_, _> = request.metadata.iter().collect();
    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }

    params
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, request), fields(mode = request.mode.as_str()))]
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentProcessorError> {
        let response = self
            .client
            .post(self.endpoint("checkout/sessions"))
            .basic_auth(&self.config.secret_key, Some(""))
            .form(&checkout_session_form(&request))
            .send()
            .await?;

        let session: CheckoutSession = Self::read_response(response, "checkout session").await?;
        info!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentProcessorError> {
        if !is_session_id(session_id) {
            warn!("Refused to look up a malformed checkout session id");
            return Err(PaymentProcessorError::NotFound(session_id.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint(&format!("checkout/sessions/{}", session_id)))
            .basic_auth(&self.config.secret_key, Some(""))
            .send()
            .await?;

        Self::read_response(response, session_id).await
    }

    #[instrument(skip(self, email, metadata))]
    async fn create_customer(
        &self,
        email: &str,
        metadata: HashMap<String, String>,
    ) -> Result<BillingCustomer, PaymentProcessorError> {
        let mut params = vec![("email".to_string(), email.to_string())];
        let metadata: BTreeMap<_, _> = metadata.into_iter().collect();
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value));
        }

        let response = self
            .client
            .post(self.endpoint("customers"))
            .basic_auth(&self.config.secret_key, Some(""))
            .form(&params)
            .send()
            .await?;

        let customer: BillingCustomer = Self::read_response(response, "customer").await?;
        info!(customer_id = %customer.id, "Billing customer created");
        Ok(customer)
    }
}
