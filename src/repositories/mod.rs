use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod cart_store;
pub mod charge_repository;
pub mod order_repository;
pub mod subscription_repository;

pub use cart_store::{CartStore, SeaOrmCartStore};
pub use charge_repository::ChargeRepository;
pub use order_repository::{OrderChanges, OrderRepository};
pub use subscription_repository::SubscriptionRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Escapes LIKE metacharacters so user input only matches literally.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
