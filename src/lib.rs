//! Storefront Orders Library
//!
//! Order lifecycle, checkout pricing and hosted payment sessions for the storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod invoices;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService, ADMIN_ROLE};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    // Any signed-in customer
    let customer = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/mine", get(handlers::orders::list_my_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/invoice", post(handlers::orders::mail_invoice))
        .route(
            "/orders/confirm/:session_id",
            get(handlers::orders::confirm_payment),
        )
        .route(
            "/payments/checkout-session",
            post(handlers::payments::create_checkout_session),
        )
        .route(
            "/payments/subscription-session",
            post(handlers::payments::create_subscription_session),
        )
        .route(
            "/payments/sessions/:session_id",
            get(handlers::payments::get_session),
        )
        .with_auth();

    // Staff only
    let admin = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/orders/search/:query", get(handlers::orders::search_orders))
        .route("/orders/filter/:status", get(handlers::orders::filter_orders))
        .route(
            "/orders/stats/daily",
            get(handlers::analytics::daily_order_counts),
        )
        .route(
            "/orders/stats/status/:window",
            get(handlers::analytics::status_order_counts),
        )
        .route(
            "/orders/stats/month",
            get(handlers::analytics::monthly_order_summary),
        )
        .with_role(ADMIN_ROLE);

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(customer)
        .merge(admin)
}

/// Full application router: the v1 API, Swagger UI, request ids and the
/// auth service handed to the auth middleware.
pub fn app_router(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/", get(|| async { "storefront-orders up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            inject_auth_service,
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "storefront-orders",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
