use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::AuthUser,
    entities::order::{
        self, OrderProducts, OrderStatus, PaymentMode, PaymentStatus, ProductLine,
    },
    errors::ServiceError,
    notifications::{templates, NotificationDispatcher, NotificationJob, NotificationOutcome},
    repositories::{
        order_repository::{DailyOrderCount, MonthlyOrderSummary, StatusOrderCount},
        CartStore, OrderChanges, OrderRepository,
    },
    services::payment_sessions::PaymentSessionGateway,
};

pub const ORDER_PLACED_MESSAGE: &str = "Order placed successfully.";
pub const ORDER_DELIVERED_MESSAGE: &str = "Order Delivered.";
pub const STATUS_CHANGED_MESSAGE: &str = "Status changed successfully.";
pub const PAYMENT_CONFIRMED_MESSAGE: &str = "Payment confirmed.";
pub const INVOICE_SENT_MESSAGE: &str = "Email sent successfully.";

/// Passthrough token accepted by the status filter
pub const ALL_STATUSES: &str = "All";

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Amount cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductLineInput {
    #[validate(length(min = 1, message = "product_id is required"))]
    pub product_id: String,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[validate(custom = "validate_non_negative")]
    #[schema(value_type = String, example = "499.00")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Owner of the order; must be the caller
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "An order needs at least one product"))]
    pub products: Vec<ProductLineInput>,
    /// Subtotal before taxes and charges
    #[validate(custom = "validate_non_negative")]
    #[schema(value_type = String, example = "1000.00")]
    pub total_amount: Decimal,
    pub address: AddressInput,
    pub payment_mode: PaymentMode,
}

impl CreateOrderRequest {
    fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        self.address.validate()?;
        for product in &self.products {
            product.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Display label or route token, e.g. "Out for Delivery" or "Out-for-Delivery"
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
}

/// A committed state change and the email that followed it
#[derive(Debug, Clone)]
pub struct OrderMutation {
    pub message: &'static str,
    pub order: order::Model,
    pub notification: NotificationOutcome,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub payment_status: Option<String>,
    pub metadata: HashMap<String, String>,
    pub order: order::Model,
    pub notification: NotificationOutcome,
}

/// Lookback windows for the per-status breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWindow {
    FifteenDays,
    OneMonth,
    ThreeMonths,
    Unbounded,
}

impl StatusWindow {
    /// Unrecognized tokens mean no lower bound.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "15days" => Self::FifteenDays,
            "1month" => Self::OneMonth,
            "3months" => Self::ThreeMonths,
            _ => Self::Unbounded,
        }
    }

    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::FifteenDays => Some(now - Duration::days(15)),
            Self::OneMonth => now.checked_sub_months(Months::new(1)),
            Self::ThreeMonths => now.checked_sub_months(Months::new(3)),
            Self::Unbounded => None,
        }
    }
}

/// Midnight UTC on the first day of `now`'s month
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Orchestrates order placement, status changes, payment confirmation and
/// invoice mail. Store writes always complete before any email is attempted.
#[derive(Clone)]
pub struct OrderLifecycleService {
    orders: OrderRepository,
    carts: Arc<dyn CartStore>,
    gateway: Arc<PaymentSessionGateway>,
    notifier: NotificationDispatcher,
    base_url: String,
}

impl OrderLifecycleService {
    pub fn new(
        orders: OrderRepository,
        carts: Arc<dyn CartStore>,
        gateway: Arc<PaymentSessionGateway>,
        notifier: NotificationDispatcher,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            carts,
            gateway,
            notifier,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self, requester, request), fields(user_id = %request.user_id))]
    pub async fn create(
        &self,
        requester: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderMutation, ServiceError> {
        if requester.user_id != request.user_id {
            warn!(requester = %requester.user_id, "Rejected order placed for another user");
            return Err(ServiceError::Unauthorized(
                "You can only place orders for your own account".to_string(),
            ));
        }
        request.validate_all()?;

        let customer_email = requester
            .email
            .clone()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "An email address is required to place an order".to_string(),
                )
            })?;

        let now = Utc::now();
        let address = request.address;
        let products = request
            .products
            .into_iter()
            .map(|line| ProductLine {
                product_id: line.product_id,
                name: line.name,
                quantity: line.quantity,
                price: line.price,
            })
            .collect();

        let order = self
            .orders
            .insert(order::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(Uuid::new_v4().to_string()),
                user_id: Set(request.user_id),
                customer_email: Set(customer_email.clone()),
                products: Set(OrderProducts(products)),
                total_amount: Set(request.total_amount),
                ship_first_name: Set(address.first_name),
                ship_last_name: Set(address.last_name),
                ship_phone: Set(address.phone),
                ship_street: Set(address.street),
                ship_city: Set(address.city),
                ship_state: Set(address.state),
                ship_postal_code: Set(address.postal_code),
                payment_mode: Set(request.payment_mode),
                payment_id: Set(None),
                payment_status: Set(request.payment_mode.initial_payment_status()),
                order_status: Set(OrderStatus::Placed),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await?;

        counter!("orders.created", 1);
        info!(order_id = %order.order_id, "Order placed");

        // The order stands even if the cart cannot be emptied.
        if let Err(e) = self.carts.clear_for_user(order.user_id).await {
            error!(error = %e, order_id = %order.order_id, "Failed to clear cart after order");
        }

        let notification = match order.payment_mode {
            PaymentMode::CashOnDelivery => {
                self.notifier
                    .dispatch(
                        NotificationJob::new(
                            customer_email,
                            templates::order_placed(&order.order_id, &self.base_url),
                        )
                        .with_invoice(order.clone()),
                    )
                    .await
            }
            PaymentMode::Online => {
                NotificationOutcome::skipped("invoice is sent once payment is confirmed")
            }
        };

        Ok(OrderMutation {
            message: ORDER_PLACED_MESSAGE,
            order,
            notification,
        })
    }

    /// Staff status change. Delivered also settles payment and mails the invoice.
    #[instrument(skip(self))]
    pub async fn transition(&self, id: Uuid, status: &str) -> Result<OrderMutation, ServiceError> {
        let status = OrderStatus::parse(status)
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown order status: {}", status)))?;

        if self.orders.find_by_key(id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("Order {} not found", id)));
        }

        let delivered = status == OrderStatus::Delivered;
        let order = self
            .orders
            .update(
                id,
                OrderChanges {
                    order_status: Some(status),
                    payment_status: delivered.then_some(PaymentStatus::Success),
                    payment_id: None,
                },
            )
            .await?;

        counter!("orders.status_changed", 1);
        info!(order_id = %order.order_id, status = %status, "Order status changed");

        let job = if delivered {
            NotificationJob::new(
                order.customer_email.clone(),
                templates::order_delivered(&order.order_id, &self.base_url),
            )
            .with_invoice(order.clone())
        } else {
            NotificationJob::new(
                order.customer_email.clone(),
                templates::status_updated(&order.order_id, status, &self.base_url),
            )
        };
        let notification = self.notifier.dispatch(job).await;

        Ok(OrderMutation {
            message: if delivered {
                ORDER_DELIVERED_MESSAGE
            } else {
                STATUS_CHANGED_MESSAGE
            },
            order,
            notification,
        })
    }

    /// Marks the order linked to a paid session as settled and mails the invoice.
    /// Safe to repeat; every call re-sends the invoice.
    #[instrument(skip(self, requester))]
    pub async fn confirm(
        &self,
        requester: &AuthUser,
        session_id: &str,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let session = self.gateway.resolve_session(session_id).await?;

        if !session.is_settled() {
            warn!(
                session_id = %session.id,
                payment_status = ?session.payment_status,
                "Rejected confirmation of an unpaid session"
            );
            return Err(ServiceError::ValidationError(format!(
                "Payment session {} has not been paid",
                session.id
            )));
        }

        let order_id = session.order_id().ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Payment session {} is not linked to an order",
                session_id
            ))
        })?;

        let existing = self
            .orders
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let order = self
            .orders
            .update(
                existing.id,
                OrderChanges {
                    order_status: None,
                    payment_status: Some(PaymentStatus::Success),
                    payment_id: Some(session.id.clone()),
                },
            )
            .await?;

        counter!("orders.payment_confirmed", 1);
        info!(order_id = %order.order_id, session_id = %session.id, "Payment confirmed");

        let notification = self
            .notifier
            .dispatch(
                NotificationJob::new(
                    recipient_for(requester, &order),
                    templates::payment_invoice(),
                )
                .with_invoice(order.clone()),
            )
            .await;

        Ok(PaymentConfirmation {
            payment_status: session.payment_status,
            metadata: session.metadata,
            order,
            notification,
        })
    }

    /// Re-sends the invoice of an order to the caller without changing it.
    #[instrument(skip(self, requester))]
    pub async fn mail_invoice(
        &self,
        requester: &AuthUser,
        id: Uuid,
    ) -> Result<OrderMutation, ServiceError> {
        let order = self.get(requester, id).await?;

        let notification = self
            .notifier
            .dispatch(
                NotificationJob::new(
                    recipient_for(requester, &order),
                    templates::requested_invoice(),
                )
                .with_invoice(order.clone()),
            )
            .await;

        Ok(OrderMutation {
            message: INVOICE_SENT_MESSAGE,
            order,
            notification,
        })
    }

    /// Owner or staff only.
    pub async fn get(&self, requester: &AuthUser, id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self
            .orders
            .find_by_key(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        if !requester.can_access(order.user_id) {
            return Err(ServiceError::Unauthorized(
                "You do not have access to this order".to_string(),
            ));
        }
        Ok(order)
    }

    pub async fn list_all(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        self.orders.list(page.max(1), limit.max(1)).await
    }

    pub async fn list_mine(&self, requester: &AuthUser) -> Result<Vec<order::Model>, ServiceError> {
        self.orders.list_by_user(requester.user_id).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<order::Model>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::ValidationError(
                "Search query cannot be empty".to_string(),
            ));
        }
        self.orders.search(query).await
    }

    /// Accepts "All", display labels and route tokens, ignoring case.
    pub async fn filter(&self, status: &str) -> Result<Vec<order::Model>, ServiceError> {
        let status = status.trim();
        if status.eq_ignore_ascii_case(ALL_STATUSES) {
            return self.orders.filter_by_status(None).await;
        }

        let status = OrderStatus::parse(status)
            .ok_or_else(|| ServiceError::ValidationError(format!("Unknown order status: {}", status)))?;
        self.orders.filter_by_status(Some(status)).await
    }

    pub async fn daily_counts(&self) -> Result<Vec<DailyOrderCount>, ServiceError> {
        self.orders.daily_counts(month_start(Utc::now())).await
    }

    pub async fn status_counts(&self, window: &str) -> Result<Vec<StatusOrderCount>, ServiceError> {
        let since = StatusWindow::from_token(window).since(Utc::now());
        self.orders.status_counts(since).await
    }

    pub async fn monthly_summary(&self) -> Result<MonthlyOrderSummary, ServiceError> {
        self.orders.monthly_summary(month_start(Utc::now())).await
    }
}

/// The caller's address, falling back to the owner's snapshot.
fn recipient_for(requester: &AuthUser, order: &order::Model) -> String {
    requester
        .email
        .clone()
        .filter(|email| !email.trim().is_empty())
        .unwrap_or_else(|| order.customer_email.clone())
}
