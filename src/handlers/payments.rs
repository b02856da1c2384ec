use axum::{
    extract::State,
    response::Json,
};

use super::extract::{ApiJson, ApiPath};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    payments::CheckoutSession,
    services::payment_sessions::{OrderSessionRequest, SessionHandle, SubscriptionSessionRequest},
    ApiResponse, AppState,
};

/// Open a hosted checkout page for an order
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-session",
    tag = "payments",
    request_body = OrderSessionRequest,
    responses(
        (status = 200, description = "Checkout session created", body = ApiResponse<SessionHandle>),
        (status = 401, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Charges or processor not configured", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(request): ApiJson<OrderSessionRequest>,
) -> Result<Json<ApiResponse<SessionHandle>>, ServiceError> {
    let handle = state
        .services
        .payments
        .create_order_session(&auth_user, request)
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/subscription-session",
    tag = "payments",
    request_body = SubscriptionSessionRequest,
    responses(
        (status = 200, description = "Subscription session created", body = ApiResponse<SessionHandle>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_subscription_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(request): ApiJson<SubscriptionSessionRequest>,
) -> Result<Json<ApiResponse<SessionHandle>>, ServiceError> {
    let handle = state
        .services
        .payments
        .create_subscription_session(&auth_user, request)
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}

/// Session state as reported by the payment processor
#[utoipa::path(
    get,
    path = "/api/v1/payments/sessions/{session_id}",
    tag = "payments",
    params(("session_id" = String, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Session retrieved", body = ApiResponse<CheckoutSession>),
        (status = 404, description = "Session not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_session(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<String>,
) -> Result<Json<ApiResponse<CheckoutSession>>, ServiceError> {
    let session = state.services.payments.resolve_session(&session_id).await?;
    Ok(Json(ApiResponse::success(session)))
}
