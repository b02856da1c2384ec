use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{total_pages, PaginationParams};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{
    auth::AuthUser,
    entities::order::{self, OrderStatus, PaymentMode, PaymentStatus, ProductLine, ShippingAddress},
    errors::ServiceError,
    notifications::NotificationOutcome,
    services::orders::{CreateOrderRequest, OrderMutation, PaymentConfirmation, UpdateOrderStatusRequest},
    ApiResponse, AppState, PaginatedResponse,
};

/// Order representation returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    /// Public order identifier
    pub order_id: String,
    pub user_id: Uuid,
    pub customer_email: String,
    pub products: Vec<ProductLine>,
    #[schema(value_type = String, example = "1000.00")]
    pub total_amount: Decimal,
    pub address: ShippingAddress,
    pub payment_mode: PaymentMode,
    pub payment_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        let address = model.shipping_address();
        Self {
            id: model.id,
            order_id: model.order_id,
            user_id: model.user_id,
            customer_email: model.customer_email,
            products: model.products.0,
            total_amount: model.total_amount,
            address,
            payment_mode: model.payment_mode,
            payment_id: model.payment_id,
            payment_status: model.payment_status,
            order_status: model.order_status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Order after a state change, with the outcome of the follow-up email
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderMutationResponse {
    pub order: OrderResponse,
    pub notification: NotificationOutcome,
    /// True when the email could not be sent or queued
    pub notification_degraded: bool,
}

impl From<OrderMutation> for OrderMutationResponse {
    fn from(mutation: OrderMutation) -> Self {
        Self {
            notification_degraded: mutation.notification.is_degraded(),
            order: mutation.order.into(),
            notification: mutation.notification,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentConfirmationResponse {
    /// Payment status reported by the processor
    pub payment_status: Option<String>,
    pub metadata: HashMap<String, String>,
    pub order: OrderResponse,
    pub notification: NotificationOutcome,
    pub notification_degraded: bool,
}

impl From<PaymentConfirmation> for PaymentConfirmationResponse {
    fn from(confirmation: PaymentConfirmation) -> Self {
        Self {
            payment_status: confirmation.payment_status,
            metadata: confirmation.metadata,
            notification_degraded: confirmation.notification.is_degraded(),
            order: confirmation.order.into(),
            notification: confirmation.notification,
        }
    }
}

fn with_message<T>(message: &str, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data).with_message(message))
}

fn order_list(orders: Vec<order::Model>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

/// Place an order for the authenticated customer
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderMutationResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderMutationResponse>>), ServiceError> {
    let mutation = state.services.orders.create(&auth_user, request).await?;
    let message = mutation.message;
    Ok((
        StatusCode::CREATED,
        with_message(message, OrderMutationResponse::from(mutation)),
    ))
}

/// Paginated list of every order, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let (page, limit) = params.resolve(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    );
    let (orders, total) = state.services.orders.list_all(page, limit).await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: order_list(orders),
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })))
}

/// Orders placed by the caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    tag = "orders",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.list_mine(&auth_user).await?;
    Ok(Json(ApiResponse::success(order_list(orders))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order key")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get(&auth_user, id).await?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// Staff status change
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order key")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<OrderMutationResponse>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderMutationResponse>>, ServiceError> {
    let mutation = state.services.orders.transition(id, &request.status).await?;
    let message = mutation.message;
    Ok(with_message(message, OrderMutationResponse::from(mutation)))
}

/// Email the invoice of an order to the caller
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/invoice",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order key")),
    responses(
        (status = 200, description = "Invoice sent", body = ApiResponse<OrderMutationResponse>),
        (status = 401, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn mail_invoice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<OrderMutationResponse>>, ServiceError> {
    let mutation = state.services.orders.mail_invoice(&auth_user, id).await?;
    let message = mutation.message;
    Ok(with_message(message, OrderMutationResponse::from(mutation)))
}

/// Settle the order linked to a completed checkout session
#[utoipa::path(
    get,
    path = "/api/v1/orders/confirm/{session_id}",
    tag = "orders",
    params(("session_id" = String, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Payment confirmed", body = ApiResponse<PaymentConfirmationResponse>),
        (status = 404, description = "Session or order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiPath(session_id): ApiPath<String>,
) -> Result<Json<ApiResponse<PaymentConfirmationResponse>>, ServiceError> {
    let confirmation = state.services.orders.confirm(&auth_user, &session_id).await?;
    Ok(with_message(
        crate::services::orders::PAYMENT_CONFIRMED_MESSAGE,
        PaymentConfirmationResponse::from(confirmation),
    ))
}

/// Prefix search over order id, recipient name, state and city
#[utoipa::path(
    get,
    path = "/api/v1/orders/search/{query}",
    tag = "orders",
    params(("query" = String, Path, description = "Search prefix")),
    responses(
        (status = 200, description = "Matching orders", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "Empty query", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn search_orders(
    State(state): State<AppState>,
    ApiPath(query): ApiPath<String>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.search(&query).await?;
    Ok(Json(ApiResponse::success(order_list(orders))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/filter/{status}",
    tag = "orders",
    params(("status" = String, Path, description = "`All`, a status label or its route token")),
    responses(
        (status = 200, description = "Matching orders", body = ApiResponse<Vec<OrderResponse>>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn filter_orders(
    State(state): State<AppState>,
    ApiPath(status): ApiPath<String>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.filter(&status).await?;
    Ok(Json(ApiResponse::success(order_list(orders))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OrderProducts;
    use rust_decimal_macros::dec;

    fn model() -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            order_id: "ord-1".into(),
            user_id: Uuid::new_v4(),
            customer_email: "asha@example.com".into(),
            products: OrderProducts(vec![ProductLine {
                product_id: "p-1".into(),
                name: "Kettle".into(),
                quantity: 1,
                price: dec!(1000),
            }]),
            total_amount: dec!(1000),
            ship_first_name: "Asha".into(),
            ship_last_name: "Rao".into(),
            ship_phone: "9999999999".into(),
            ship_street: "1 MG Road".into(),
            ship_city: "Pune".into(),
            ship_state: "MH".into(),
            ship_postal_code: "411001".into(),
            payment_mode: PaymentMode::CashOnDelivery,
            payment_id: None,
            payment_status: PaymentStatus::Cod,
            order_status: OrderStatus::Placed,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn degraded_flag_follows_notification_outcome() {
        let response = OrderMutationResponse::from(OrderMutation {
            message: "ok",
            order: model(),
            notification: NotificationOutcome::failed("relay down"),
        });
        assert!(response.notification_degraded);

        let response = OrderMutationResponse::from(OrderMutation {
            message: "ok",
            order: model(),
            notification: NotificationOutcome::queued(),
        });
        assert!(!response.notification_degraded);
    }

    #[test]
    fn order_response_nests_the_address() {
        let json = serde_json::to_value(OrderResponse::from(model())).unwrap();
        assert_eq!(json["address"]["city"], "Pune");
        assert_eq!(json["order_status"], "Placed");
        assert_eq!(json["payment_mode"], "COD");
    }
}
