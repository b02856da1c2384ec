use axum::{
    extract::State,
    response::Json,
};

use super::extract::ApiPath;
use crate::{
    errors::ServiceError,
    repositories::order_repository::{DailyOrderCount, MonthlyOrderSummary, StatusOrderCount},
    ApiResponse, AppState,
};

/// Orders placed per day since the start of the current month
#[utoipa::path(
    get,
    path = "/api/v1/orders/stats/daily",
    tag = "analytics",
    responses(
        (status = 200, description = "Daily order counts", body = ApiResponse<Vec<DailyOrderCount>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn daily_order_counts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DailyOrderCount>>>, ServiceError> {
    let counts = state.services.orders.daily_counts().await?;
    Ok(Json(ApiResponse::success(counts)))
}

/// Orders per status within a lookback window (`15days`, `1month`, `3months`, anything else means all time)
#[utoipa::path(
    get,
    path = "/api/v1/orders/stats/status/{window}",
    tag = "analytics",
    params(("window" = String, Path, description = "Lookback window token")),
    responses(
        (status = 200, description = "Order counts per status", body = ApiResponse<Vec<StatusOrderCount>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn status_order_counts(
    State(state): State<AppState>,
    ApiPath(window): ApiPath<String>,
) -> Result<Json<ApiResponse<Vec<StatusOrderCount>>>, ServiceError> {
    let counts = state.services.orders.status_counts(&window).await?;
    Ok(Json(ApiResponse::success(counts)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/stats/month",
    tag = "analytics",
    responses(
        (status = 200, description = "Delivered, pending and total orders this month", body = ApiResponse<MonthlyOrderSummary>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn monthly_order_summary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MonthlyOrderSummary>>, ServiceError> {
    let summary = state.services.orders.monthly_summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}
