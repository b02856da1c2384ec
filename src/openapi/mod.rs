use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Orders API",
        version = "1.0.0",
        description = r#"
# Storefront Orders API

Order placement, fulfilment status, checkout pricing and payment sessions for the storefront.

## Authentication

Every endpoint except `/status` and `/health` requires a bearer JWT issued by the identity service:

```
Authorization: Bearer <your-jwt-token>
```

Staff endpoints additionally require the `admin` role.

## Notifications

Mutating order endpoints report the follow-up email as `notification` (`sent`, `queued`, `failed` or `skipped`).
`notification_degraded` is true when the email could not be delivered; the order change itself is already committed.

## Error Handling

Failures use a single body shape with a stable `kind`:

```json
{
  "error": "Not Found",
  "kind": "not_found",
  "message": "Not found: Order ... not found",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Order lifecycle endpoints"),
        (name = "analytics", description = "Order aggregates for staff dashboards"),
        (name = "payments", description = "Hosted checkout sessions")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::mail_invoice,
        crate::handlers::orders::confirm_payment,
        crate::handlers::orders::search_orders,
        crate::handlers::orders::filter_orders,

        // Analytics
        crate::handlers::analytics::daily_order_counts,
        crate::handlers::analytics::status_order_counts,
        crate::handlers::analytics::monthly_order_summary,

        // Payments
        crate::handlers::payments::create_checkout_session,
        crate::handlers::payments::create_subscription_session,
        crate::handlers::payments::get_session,
    ),
    components(
        schemas(
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderMutationResponse,
            crate::handlers::orders::PaymentConfirmationResponse,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::ProductLineInput,
            crate::services::orders::AddressInput,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::payment_sessions::OrderSessionRequest,
            crate::services::payment_sessions::SubscriptionSessionRequest,
            crate::services::payment_sessions::SessionHandle,
            crate::payments::CheckoutSession,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::PaymentMode,
            crate::entities::order::ProductLine,
            crate::entities::order::ShippingAddress,
            crate::notifications::NotificationOutcome,
            crate::notifications::NotificationStatus,
            crate::repositories::order_repository::DailyOrderCount,
            crate::repositories::order_repository::StatusOrderCount,
            crate::repositories::order_repository::MonthlyOrderSummary,

            // Error types
            crate::errors::ErrorResponse,
            crate::errors::ErrorKind
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}
