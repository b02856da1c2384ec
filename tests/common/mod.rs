#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::Set;
use serde_json::Value;
use storefront_orders::{
    auth::{AuthConfig, AuthService, AuthUser, ADMIN_ROLE},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        cart_item,
        charge::{DELIVERY_CHARGE, PLATFORM_CHARGE},
        order::{self, OrderProducts, OrderStatus, PaymentMode, ProductLine},
    },
    handlers::AppServices,
    invoices::{InvoiceError, InvoiceRenderer, RenderedInvoice},
    notifications::{EmailMessage, Mailer, NotificationDispatcher, NotificationError},
    payments::{
        BillingCustomer, CheckoutSession, CheckoutSessionRequest, PaymentProcessor,
        PaymentProcessorError, ORDER_ID_METADATA_KEY,
    },
    repositories::{
        CartStore, ChargeRepository, OrderRepository, SeaOrmCartStore, SubscriptionRepository,
    },
    services::{
        orders::{AddressInput, CreateOrderRequest, ProductLineInput},
        OrderLifecycleService, PaymentSessionGateway,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-with-enough-length";
pub const BASE_URL: &str = "http://shop.test";

/// Mailer that keeps every message in memory.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: Mutex<bool>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next_sends(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if *self.fail.lock().unwrap() {
            return Err(NotificationError::Rejected {
                status: 503,
                message: "relay unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Renders a tiny marker document per order.
pub struct StubInvoiceRenderer;

#[async_trait]
impl InvoiceRenderer for StubInvoiceRenderer {
    async fn render(&self, order: &order::Model) -> Result<RenderedInvoice, InvoiceError> {
        Ok(RenderedInvoice {
            filename: format!("invoice-{}.html", order.order_id),
            content_type: "text/html; charset=utf-8".into(),
            bytes: format!("invoice for {}", order.order_id).into_bytes(),
        })
    }
}

/// In-memory stand-in for the hosted checkout provider.
#[derive(Default)]
pub struct FakePaymentProcessor {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    customers: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl FakePaymentProcessor {
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn customers_created(&self) -> usize {
        self.customers.lock().unwrap().len()
    }

    /// Registers a paid session as if the customer completed checkout.
    pub fn insert_paid_session(&self, session_id: &str, order_id: Option<&str>) {
        let mut metadata = HashMap::new();
        if let Some(order_id) = order_id {
            metadata.insert(ORDER_ID_METADATA_KEY.to_string(), order_id.to_string());
        }
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            CheckoutSession {
                id: session_id.to_string(),
                url: None,
                payment_status: Some("paid".into()),
                status: Some("complete".into()),
                metadata,
                customer: None,
            },
        );
    }
}

#[async_trait]
impl PaymentProcessor for FakePaymentProcessor {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, PaymentProcessorError> {
        let mut requests = self.requests.lock().unwrap();
        let id = format!("cs_test_{}", requests.len() + 1);
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/pay/{}", id)),
            payment_status: Some("unpaid".into()),
            status: Some("open".into()),
            metadata: request.metadata.clone(),
            customer: request.customer.clone(),
        };
        requests.push(request);
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentProcessorError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentProcessorError::NotFound(session_id.to_string()))
    }

    async fn create_customer(
        &self,
        email: &str,
        metadata: HashMap<String, String>,
    ) -> Result<BillingCustomer, PaymentProcessorError> {
        let mut customers = self.customers.lock().unwrap();
        customers.push((email.to_string(), metadata));
        Ok(BillingCustomer {
            id: format!("cus_test_{}", customers.len()),
            email: Some(email.to_string()),
        })
    }
}

/// Application wired against an in-memory SQLite database and recording fakes.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub mailer: Arc<RecordingMailer>,
    pub processor: Arc<FakePaymentProcessor>,
    pub auth: Arc<AuthService>,
    pub orders: Arc<OrderLifecycleService>,
    pub gateway: Arc<PaymentSessionGateway>,
}

impl TestApp {
    /// Inline delivery so tests can assert on sent mail right after the call.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Uses the given cart store instead of the database-backed one.
    pub async fn with_cart_store(carts: Arc<dyn CartStore>) -> Self {
        Self::build(Some(carts)).await
    }

    async fn build(carts: Option<Arc<dyn CartStore>>) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.base_url = BASE_URL.to_string();
        cfg.cors_allow_any_origin = true;

        // A single connection keeps every query on the same in-memory database.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let mailer = Arc::new(RecordingMailer::default());
        let processor = Arc::new(FakePaymentProcessor::default());
        let notifier = NotificationDispatcher::inline(mailer.clone(), Arc::new(StubInvoiceRenderer));

        let order_repo = OrderRepository::new(db_arc.clone());
        let gateway = Arc::new(PaymentSessionGateway::new(
            processor.clone(),
            order_repo.clone(),
            ChargeRepository::new(db_arc.clone()),
            SubscriptionRepository::new(db_arc.clone()),
            cfg.currency.clone(),
            cfg.storefront_base_url(),
        ));
        let carts = carts.unwrap_or_else(|| Arc::new(SeaOrmCartStore::new(db_arc.clone())));
        let orders = Arc::new(OrderLifecycleService::new(
            order_repo,
            carts,
            gateway.clone(),
            notifier,
            cfg.storefront_base_url(),
        ));

        let auth = Arc::new(AuthService::new(AuthConfig::new(
            JWT_SECRET.to_string(),
            Duration::from_secs(3600),
        )));

        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            services: AppServices::new(orders.clone(), gateway.clone()),
            auth: auth.clone(),
        };
        let router = storefront_orders::app_router(state.clone());

        Self {
            router,
            state,
            db: db_arc,
            mailer,
            processor,
            auth,
            orders,
            gateway,
        }
    }

    /// Seeds the default surcharges: 2% platform and 5% delivery.
    pub async fn seed_charges(&self) {
        self.seed_charge(PLATFORM_CHARGE, dec!(2)).await;
        self.seed_charge(DELIVERY_CHARGE, dec!(5)).await;
    }

    pub async fn seed_charge(&self, name: &str, percent: Decimal) {
        ChargeRepository::new(self.db.clone())
            .set_percent(name, percent)
            .await
            .expect("seed charge");
    }

    pub async fn seed_cart_item(&self, user_id: Uuid, product_id: &str) {
        use sea_orm::ActiveModelTrait;

        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id.to_string()),
            quantity: Set(1),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(self.db.as_ref())
        .await
        .expect("seed cart item");
    }

    /// Inserts an order directly, bypassing the lifecycle service.
    pub async fn insert_order(
        &self,
        owner: &AuthUser,
        status: OrderStatus,
        created_at: chrono::DateTime<chrono::Utc>,
        city: &str,
    ) -> order::Model {
        OrderRepository::new(self.db.clone())
            .insert(order::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(Uuid::new_v4().to_string()),
                user_id: Set(owner.user_id),
                customer_email: Set(owner.email.clone().unwrap_or_default()),
                products: Set(OrderProducts(vec![ProductLine {
                    product_id: "sku-1".into(),
                    name: "Kettle".into(),
                    quantity: 1,
                    price: dec!(1000),
                }])),
                total_amount: Set(dec!(1000)),
                ship_first_name: Set("Asha".into()),
                ship_last_name: Set("Rao".into()),
                ship_phone: Set("9999999999".into()),
                ship_street: Set("1 MG Road".into()),
                ship_city: Set(city.to_string()),
                ship_state: Set("Maharashtra".into()),
                ship_postal_code: Set("411001".into()),
                payment_mode: Set(PaymentMode::Online),
                payment_id: Set(None),
                payment_status: Set(PaymentMode::Online.initial_payment_status()),
                order_status: Set(status),
                created_at: Set(created_at),
                updated_at: Set(created_at),
            })
            .await
            .expect("insert order")
    }

    pub fn token_for(&self, user: &AuthUser) -> String {
        self.auth.generate_token(user).expect("sign test token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub fn customer(email: &str) -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        name: Some("Asha Rao".into()),
        email: Some(email.to_string()),
        roles: vec!["customer".into()],
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        name: Some("Store Admin".into()),
        email: Some("admin@shop.test".into()),
        roles: vec![ADMIN_ROLE.into()],
    }
}

pub fn order_request(owner: &AuthUser, payment_mode: PaymentMode) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: owner.user_id,
        products: vec![ProductLineInput {
            product_id: "sku-kettle".into(),
            name: "Kettle".into(),
            quantity: 2,
            price: dec!(500),
        }],
        total_amount: dec!(1000),
        address: AddressInput {
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            phone: "9999999999".into(),
            street: "1 MG Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            postal_code: "411001".into(),
        },
        payment_mode,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
