use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::order,
    errors::ServiceError,
    payments::{
        CheckoutSession, CheckoutSessionRequest, PaymentProcessor, SessionLineItem, SessionMode,
        ORDER_ID_METADATA_KEY, USER_ID_METADATA_KEY,
    },
    repositories::{ChargeRepository, OrderRepository, SubscriptionRepository},
    services::pricing::{price_checkout, CheckoutBreakdown, PricingInput},
};

/// Placeholder the processor replaces with the real session id on redirect
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderSessionRequest {
    /// Public order id returned when the order was placed
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubscriptionSessionRequest {
    /// Recurring price defined at the payment processor
    #[validate(length(min = 1, message = "price_id is required"))]
    pub price_id: String,
}

/// Handle to a hosted checkout page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionHandle {
    pub id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for SessionHandle {
    fn from(session: CheckoutSession) -> Self {
        Self {
            id: session.id,
            url: session.url,
        }
    }
}

/// Creates hosted checkout sessions and resolves them back to payment outcomes
#[derive(Clone)]
pub struct PaymentSessionGateway {
    processor: Arc<dyn PaymentProcessor>,
    orders: OrderRepository,
    charges: ChargeRepository,
    subscriptions: SubscriptionRepository,
    currency: String,
    base_url: String,
}

impl PaymentSessionGateway {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        orders: OrderRepository,
        charges: ChargeRepository,
        subscriptions: SubscriptionRepository,
        currency: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            orders,
            charges,
            subscriptions,
            currency: currency.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn success_url(&self) -> String {
        format!(
            "{}/payment/success?session_id={}",
            self.base_url, SESSION_ID_PLACEHOLDER
        )
    }

    fn cancel_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    /// Prices the stored order snapshot against the current charge schedule.
    pub async fn price_order(&self, order: &order::Model) -> Result<CheckoutBreakdown, ServiceError> {
        let schedule = self.charges.load_schedule().await?;
        let items: Vec<PricingInput> = order
            .products
            .0
            .iter()
            .map(|line| PricingInput {
                name: line.name.clone(),
                unit_price: line.price,
                quantity: line.quantity,
            })
            .collect();

        price_checkout(&items, order.total_amount, &schedule)
    }

    /// One-time payment session for an order; the order id rides in the metadata.
    #[instrument(skip(self, requester, request), fields(order_id = %request.order_id))]
    pub async fn create_order_session(
        &self,
        requester: &AuthUser,
        request: OrderSessionRequest,
    ) -> Result<SessionHandle, ServiceError> {
        request.validate()?;

        let order = self
            .orders
            .find_by_order_id(&request.order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", request.order_id)))?;

        if !requester.can_access(order.user_id) {
            return Err(ServiceError::Unauthorized(
                "You can only pay for your own orders".to_string(),
            ));
        }

        let breakdown = self.price_order(&order).await?;
        let line_items = breakdown
            .lines
            .into_iter()
            .map(|line| SessionLineItem::Priced {
                name: line.name,
                currency: self.currency.clone(),
                unit_amount: line.unit_amount,
                quantity: line.quantity,
            })
            .collect();

        let session = self
            .processor
            .create_checkout_session(CheckoutSessionRequest {
                mode: SessionMode::Payment,
                line_items,
                customer: None,
                success_url: self.success_url(),
                cancel_url: self.cancel_url(),
                metadata: HashMap::from([(
                    ORDER_ID_METADATA_KEY.to_string(),
                    order.order_id.clone(),
                )]),
            })
            .await?;

        counter!("payments.sessions_created", 1);
        info!(order_id = %order.order_id, session_id = %session.id, "Order checkout session created");
        Ok(session.into())
    }

    /// Recurring session for the requester, creating their billing customer on first use.
    #[instrument(skip(self, requester, request), fields(user_id = %requester.user_id))]
    pub async fn create_subscription_session(
        &self,
        requester: &AuthUser,
        request: SubscriptionSessionRequest,
    ) -> Result<SessionHandle, ServiceError> {
        request.validate()?;

        let customer_id = match self.subscriptions.find_by_user(requester.user_id).await? {
            Some(subscription) => subscription.customer_id,
            None => {
                let email = requester
                    .email
                    .as_deref()
                    .filter(|email| !email.trim().is_empty())
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "An email address is required to start a subscription".to_string(),
                        )
                    })?;
                let customer = self
                    .processor
                    .create_customer(
                        email,
                        HashMap::from([(
                            USER_ID_METADATA_KEY.to_string(),
                            requester.user_id.to_string(),
                        )]),
                    )
                    .await?;

                self.subscriptions
                    .insert_or_existing(requester.user_id, &customer.id)
                    .await?
                    .customer_id
            }
        };

        let session = self
            .processor
            .create_checkout_session(CheckoutSessionRequest {
                mode: SessionMode::Subscription,
                line_items: vec![SessionLineItem::Price {
                    price_id: request.price_id,
                    quantity: 1,
                }],
                customer: Some(customer_id),
                success_url: self.success_url(),
                cancel_url: self.cancel_url(),
                metadata: HashMap::new(),
            })
            .await?;

        counter!("payments.sessions_created", 1);
        info!(session_id = %session.id, "Subscription checkout session created");
        Ok(session.into())
    }

    /// Passthrough fetch of the session; no local state changes.
    #[instrument(skip(self))]
    pub async fn resolve_session(&self, session_id: &str) -> Result<CheckoutSession, ServiceError> {
        if session_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "session_id is required".to_string(),
            ));
        }

        Ok(self.processor.retrieve_checkout_session(session_id).await?)
    }
}
