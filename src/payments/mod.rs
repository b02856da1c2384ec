//! Payment processor seam: hosted checkout sessions and billing customers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use utoipa::ToSchema;

use crate::errors::ServiceError;

pub mod stripe;

pub use stripe::{StripeClient, StripeConfig};

/// Metadata key linking a payment session back to the public order id
pub const ORDER_ID_METADATA_KEY: &str = "orderID";
/// Metadata key linking a billing customer to the storefront user
pub const USER_ID_METADATA_KEY: &str = "userId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Payment,
    Subscription,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLineItem {
    /// Ad-hoc price in minor units
    Priced {
        name: String,
        currency: String,
        unit_amount: i64,
        quantity: u32,
    },
    /// A recurring price already defined at the processor
    Price { price_id: String, quantity: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub mode: SessionMode,
    pub line_items: Vec<SessionLineItem>,
    pub customer: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

/// Hosted checkout session as reported by the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub customer: Option<String>,
}

impl CheckoutSession {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata
            .get(ORDER_ID_METADATA_KEY)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// True once the processor reports the payment as collected or not required.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum PaymentProcessorError {
    #[error("Payment resource not found: {0}")]
    NotFound(String),

    #[error("Payment processor is not configured")]
    NotConfigured,

    #[error("Payment processor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment processor transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected payment processor response: {0}")]
    Decode(String),
}

impl From<PaymentProcessorError> for ServiceError {
    fn from(err: PaymentProcessorError) -> Self {
        match err {
            PaymentProcessorError::NotFound(resource) => {
                ServiceError::NotFound(format!("Payment session {} not found", resource))
            }
            PaymentProcessorError::NotConfigured => {
                ServiceError::ConfigurationMissing("Payment processor credentials".to_string())
            }
            other => ServiceError::UpstreamFailure(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentProcessorError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentProcessorError>;

    async fn create_customer(
        &self,
        email: &str,
        metadata: HashMap<String, String>,
    ) -> Result<BillingCustomer, PaymentProcessorError>;
}

/// Used when no processor credentials are configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct DisabledPaymentProcessor;

#[async_trait]
impl PaymentProcessor for DisabledPaymentProcessor {
    async fn create_checkout_session(
        &self,
        _request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentProcessorError> {
        Err(PaymentProcessorError::NotConfigured)
    }

    async fn retrieve_checkout_session(
        &self,
        _session_id: &str,
    ) -> Result<CheckoutSession, PaymentProcessorError> {
        Err(PaymentProcessorError::NotConfigured)
    }

    async fn create_customer(
        &self,
        _email: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<BillingCustomer, PaymentProcessorError> {
        Err(PaymentProcessorError::NotConfigured)
    }
}
