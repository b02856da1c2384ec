pub mod analytics;
pub mod common;
pub mod extract;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::services::{OrderLifecycleService, PaymentSessionGateway};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderLifecycleService>,
    pub payments: Arc<PaymentSessionGateway>,
}

impl AppServices {
    pub fn new(orders: Arc<OrderLifecycleService>, payments: Arc<PaymentSessionGateway>) -> Self {
        Self { orders, payments }
    }
}
