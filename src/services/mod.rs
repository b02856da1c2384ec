pub mod orders;
pub mod payment_sessions;
pub mod pricing;

pub use orders::OrderLifecycleService;
pub use payment_sessions::PaymentSessionGateway;
